use std::sync::{Arc, Mutex};

use approx::assert_relative_eq;
use emio_calibration::{
    BoardDimensions, CalibrationCfg, CalibrationError, CalibrationMode, FrameConvention,
    GeometryCfg, MarkerCalibration, ReferenceGeometry, RigidTransform, ValidationReason, WorldFrameMapper,
};
use emio_core::{
    ColorImage, CorrespondencePoint, DepthImage, DetectedMarker, Intrinsics, MarkerDetector,
    PixelCoordinates, PointCoordinates, Real,
};
use emio_sensor::PinholeCamera;
use emio_store::CalibrationStore;
use sophus::nalgebra::Rotation3;

const INTRINSICS: Intrinsics = Intrinsics {
    ppx: 320.0,
    ppy: 240.0,
    fx: 600.0,
    fy: 600.0,
    width: 640,
    height: 480,
};

#[derive(Default)]
struct Script {
    markers: Vec<DetectedMarker>,
    failure: Option<String>,
}

/// Reports whatever the test last put in the script.
#[derive(Clone, Default)]
struct ScriptedDetector {
    script: Arc<Mutex<Script>>,
}

impl ScriptedDetector {
    fn show(&self, markers: Vec<DetectedMarker>) {
        *self.script.lock().unwrap() = Script {
            markers,
            failure: None,
        };
    }

    fn fail(&self, message: &str) {
        self.script.lock().unwrap().failure = Some(message.to_owned());
    }
}

impl MarkerDetector for ScriptedDetector {
    fn detect(&mut self, _frame: &ColorImage) -> anyhow::Result<Vec<DetectedMarker>> {
        let script = self.script.lock().unwrap();
        match &script.failure {
            Some(message) => Err(anyhow::anyhow!("{message}")),
            None => Ok(script.markers.clone()),
        }
    }
}

fn square(id: i32, cx: Real, cy: Real, half: Real) -> DetectedMarker {
    DetectedMarker::new(
        id,
        [
            PixelCoordinates::new(cx - half, cy - half),
            PixelCoordinates::new(cx + half, cy - half),
            PixelCoordinates::new(cx + half, cy + half),
            PixelCoordinates::new(cx - half, cy + half),
        ],
    )
}

fn blank_color() -> ColorImage {
    ColorImage::new(INTRINSICS.width as u32, INTRINSICS.height as u32)
}

fn blank_depth() -> DepthImage {
    DepthImage::new(INTRINSICS.width as u32, INTRINSICS.height as u32)
}

fn fill(depth: &mut DepthImage, cx: u32, cy: u32, half: u32, value: f32) {
    for y in cy - half..=cy + half {
        for x in cx - half..=cx + half {
            depth.put_pixel(x, y, image::Luma([value]));
        }
    }
}

/// Eight markers spread over the image with distinct depths.
const FIXTURE: [(u32, u32, f32); 8] = [
    (100, 100, 480.0),
    (220, 90, 510.0),
    (360, 110, 495.0),
    (520, 120, 540.0),
    (110, 360, 530.0),
    (250, 380, 470.0),
    (400, 350, 520.0),
    (540, 390, 505.0),
];

fn truth() -> RigidTransform {
    RigidTransform::new(
        Rotation3::from_euler_angles(-0.4, 0.3, 2.1).into_inner(),
        PointCoordinates::new(15.0, 420.0, -60.0),
    )
}

struct Rig {
    detector: ScriptedDetector,
    calibration: MarkerCalibration,
    mapper: WorldFrameMapper,
    _dir: tempfile::TempDir,
}

impl Rig {
    fn new(geometry: ReferenceGeometry) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let dir = tempfile::tempdir().unwrap();
        let detector = ScriptedDetector::default();
        let calibration = CalibrationCfg::default()
            .finalize(
                Box::new(detector.clone()),
                CalibrationStore::new(dir.path().join("camera_2d_points.csv")),
            )
            .unwrap();
        let mapper = WorldFrameMapper::new(
            PinholeCamera::from_intrinsics(&INTRINSICS),
            geometry,
            FrameConvention::default(),
        );
        Rig {
            detector,
            calibration,
            mapper,
            _dir: dir,
        }
    }

    fn fixture() -> Self {
        let camera = PinholeCamera::from_intrinsics(&INTRINSICS);
        let anchors = FIXTURE
            .iter()
            .map(|&(x, y, d)| {
                let point = camera
                    .deproject(&PixelCoordinates::new(x as Real, y as Real), d as Real)
                    .unwrap();
                truth().apply(&point)
            })
            .collect();
        Self::new(ReferenceGeometry::from_points(anchors))
    }

    fn run(
        &mut self,
        mode: CalibrationMode,
        depth: &DepthImage,
    ) -> Result<emio_calibration::CalibrationReport, CalibrationError> {
        self.calibration
            .calibrate(mode, &blank_color(), depth, &mut self.mapper)
    }

    fn stored(&self) -> Option<Vec<CorrespondencePoint>> {
        self.calibration.store().load().ok()
    }
}

fn fixture_markers() -> Vec<DetectedMarker> {
    FIXTURE
        .iter()
        .enumerate()
        .map(|(id, &(x, y, _))| square(id as i32, x as Real, y as Real, 8.0))
        .collect()
}

fn fixture_depth() -> DepthImage {
    let mut depth = blank_depth();
    for &(x, y, d) in &FIXTURE {
        fill(&mut depth, x, y, 10, d);
    }
    depth
}

fn validation(result: Result<impl std::fmt::Debug, CalibrationError>) -> ValidationReason {
    match result {
        Err(CalibrationError::Validation(reason)) => reason,
        other => panic!("expected a validation failure, got {other:?}"),
    }
}

#[test]
fn multi_marker_pass_recovers_the_fixture_pose() {
    let mut rig = Rig::fixture();
    let mut markers = fixture_markers();
    markers.reverse();
    markers.swap(1, 5);
    rig.detector.show(markers);

    let report = rig
        .run(CalibrationMode::MultiMarker, &fixture_depth())
        .unwrap();

    let ids: Vec<_> = report.records.iter().map(|r| r.marker_id).collect();
    assert_eq!(ids, (0..8).collect::<Vec<_>>());
    assert_eq!(
        report.records[3],
        CorrespondencePoint::new(520, 120, 540.0, 3)
    );
    assert_eq!(rig.stored().unwrap(), report.records);

    let transform = rig.mapper.transform().unwrap();
    assert_relative_eq!(transform.rotation(), truth().rotation(), epsilon = 1e-9);
    assert_relative_eq!(
        transform.translation(),
        truth().translation(),
        epsilon = 1e-6
    );
}

#[test]
fn multi_marker_pass_rejects_incomplete_or_inconsistent_sets() {
    let mut rig = Rig::fixture();
    let depth = fixture_depth();

    rig.detector.show(vec![]);
    assert_eq!(
        validation(rig.run(CalibrationMode::MultiMarker, &depth)),
        ValidationReason::NoMarkers
    );

    let mut markers = fixture_markers();
    markers.pop();
    rig.detector.show(markers);
    assert_eq!(
        validation(rig.run(CalibrationMode::MultiMarker, &depth)),
        ValidationReason::WrongMarkerCount {
            expected: 8,
            found: 7
        }
    );

    let mut markers = fixture_markers();
    markers.push(square(3, 600.0, 20.0, 8.0));
    rig.detector.show(markers);
    assert_eq!(
        validation(rig.run(CalibrationMode::MultiMarker, &depth)),
        ValidationReason::WrongMarkerCount {
            expected: 8,
            found: 9
        }
    );

    let mut markers = fixture_markers();
    markers[6].id = 2;
    rig.detector.show(markers);
    assert_eq!(
        validation(rig.run(CalibrationMode::MultiMarker, &depth)),
        ValidationReason::DuplicateMarkerId(2)
    );

    let mut markers = fixture_markers();
    markers[4].id = 8;
    rig.detector.show(markers);
    assert_eq!(
        validation(rig.run(CalibrationMode::MultiMarker, &depth)),
        ValidationReason::InvalidMarkerId(8)
    );

    rig.detector.show(fixture_markers());
    let mut holes = depth.clone();
    let (x, y, _) = FIXTURE[5];
    fill(&mut holes, x, y, 10, 0.0);
    assert_eq!(
        validation(rig.run(CalibrationMode::MultiMarker, &holes)),
        ValidationReason::UnknownDepth { index: 5 }
    );

    // closer than the minimum depth counts as unknown
    let mut near = depth;
    fill(&mut near, x, y, 10, 4.0);
    assert_eq!(
        validation(rig.run(CalibrationMode::MultiMarker, &near)),
        ValidationReason::UnknownDepth { index: 5 }
    );

    rig.detector.fail("camera unplugged");
    assert!(matches!(
        rig.run(CalibrationMode::MultiMarker, &fixture_depth()),
        Err(CalibrationError::Detector(_))
    ));

    assert!(rig.stored().is_none());
    assert!(!rig.mapper.is_initialized());
}

#[test]
fn failed_pass_keeps_the_previous_calibration() {
    let mut rig = Rig::fixture();
    rig.detector.show(fixture_markers());
    let first = rig
        .run(CalibrationMode::MultiMarker, &fixture_depth())
        .unwrap();

    let mut markers = fixture_markers();
    markers.truncate(6);
    rig.detector.show(markers);
    assert!(rig
        .run(CalibrationMode::MultiMarker, &fixture_depth())
        .is_err());

    assert_eq!(rig.stored().unwrap(), first.records);
    assert_eq!(rig.mapper.transform(), Some(&first.transform));
}

fn single_marker() -> DetectedMarker {
    square(672, 320.0, 220.0, 20.0)
}

fn flat_depth(value: f32) -> DepthImage {
    let mut depth = blank_depth();
    fill(&mut depth, 320, 220, 30, value);
    depth
}

fn diamond_rig() -> Rig {
    Rig::new(ReferenceGeometry::diamond_board(&BoardDimensions::default()))
}

#[test]
fn single_marker_pass_samples_nine_points() {
    let mut rig = diamond_rig();
    rig.detector.show(vec![single_marker()]);

    let report = rig
        .run(
            CalibrationMode::SingleMarker { aggregate: false },
            &flat_depth(500.0),
        )
        .unwrap();

    let expected: Vec<_> = [
        (300, 200),
        (340, 200),
        (340, 240),
        (300, 240),
        (320, 200),
        (340, 220),
        (320, 240),
        (300, 220),
        (320, 220),
    ]
    .iter()
    .map(|&(x, y)| CorrespondencePoint::new(x, y, 500.0, 672))
    .collect();
    assert_eq!(report.records, expected);
    assert_eq!(report.frames, 1);
    assert_eq!(rig.stored().unwrap(), expected);
    assert!(rig.mapper.is_initialized());

    let text = std::fs::read_to_string(rig.calibration.store().path()).unwrap();
    assert!(text.starts_with("X,Y,Depth,id\n300,200,500"));
}

#[test]
fn single_marker_passes_aggregate_into_an_average() {
    let mut rig = diamond_rig();
    rig.detector.show(vec![single_marker()]);
    let aggregate = CalibrationMode::SingleMarker { aggregate: true };

    rig.run(aggregate, &flat_depth(500.0)).unwrap();
    let report = rig.run(aggregate, &flat_depth(500.0)).unwrap();
    assert_eq!(report.frames, 2);
    assert!(report.records.iter().all(|r| r.depth == 500.0));

    let report = rig.run(aggregate, &flat_depth(530.0)).unwrap();
    assert_eq!(report.frames, 3);
    assert!(report.records.iter().all(|r| r.depth == 510.0));
    assert_eq!(report.records[8], CorrespondencePoint::new(320, 220, 510.0, 672));

    // a non-aggregating pass starts a new session
    let report = rig
        .run(
            CalibrationMode::SingleMarker { aggregate: false },
            &flat_depth(520.0),
        )
        .unwrap();
    assert_eq!(report.frames, 1);
    assert_eq!(rig.calibration.aggregated_frames(), 1);
    assert!(report.records.iter().all(|r| r.depth == 520.0));
}

#[test]
fn rejected_single_marker_frame_does_not_count() {
    let mut rig = diamond_rig();
    rig.detector.show(vec![single_marker()]);
    let aggregate = CalibrationMode::SingleMarker { aggregate: true };
    let first = rig.run(aggregate, &flat_depth(500.0)).unwrap();

    let mut hole = flat_depth(700.0);
    hole.put_pixel(340, 240, image::Luma([0.0]));
    assert_eq!(
        validation(rig.run(aggregate, &hole)),
        ValidationReason::UnknownDepth { index: 2 }
    );
    assert_eq!(rig.calibration.aggregated_frames(), 1);
    assert_eq!(rig.stored().unwrap(), first.records);

    rig.detector.show(vec![square(671, 320.0, 220.0, 20.0)]);
    assert_eq!(
        validation(rig.run(aggregate, &flat_depth(700.0))),
        ValidationReason::UnexpectedMarkerId {
            expected: 672,
            found: 671
        }
    );

    rig.detector
        .show(vec![single_marker(), square(672, 100.0, 100.0, 10.0)]);
    assert_eq!(
        validation(rig.run(aggregate, &flat_depth(700.0))),
        ValidationReason::WrongMarkerCount {
            expected: 1,
            found: 2
        }
    );

    assert_eq!(rig.calibration.aggregated_frames(), 1);
    assert_eq!(rig.mapper.transform(), Some(&first.transform));
}

#[test]
fn multi_marker_pass_ends_the_single_marker_session() {
    let mut rig = Rig::fixture();
    rig.detector.show(fixture_markers());
    rig.run(CalibrationMode::MultiMarker, &fixture_depth())
        .unwrap();
    assert_eq!(rig.calibration.aggregated_frames(), 0);

    // fixture geometry has eight anchors, a single-marker pass cannot fit it
    rig.detector.show(vec![single_marker()]);
    assert!(matches!(
        rig.run(
            CalibrationMode::SingleMarker { aggregate: true },
            &flat_depth(500.0)
        ),
        Err(CalibrationError::GeometryMismatch {
            expected: 8,
            found: 9
        })
    ));
    assert_eq!(rig.calibration.aggregated_frames(), 0);
    assert_eq!(rig.stored().unwrap().len(), 8);
}

#[test]
fn default_configuration_calibrates_the_diamond_board_from_eight_markers() {
    let geometry = GeometryCfg::default().build();
    let anchors = geometry.anchors().to_vec();
    let mut rig = Rig::new(geometry);

    // the board top faces the camera half a metre away
    let camera_from_world = RigidTransform::new(
        Rotation3::from_euler_angles(-1.45, 0.1, 0.2).into_inner(),
        PointCoordinates::new(10.0, -20.0, 500.0),
    );
    let camera = PinholeCamera::from_intrinsics(&INTRINSICS);
    let mut depth = blank_depth();
    let markers = anchors[..8]
        .iter()
        .enumerate()
        .map(|(id, anchor)| {
            let (pixel, z) = camera.project(&camera_from_world.apply(anchor)).unwrap();
            let (x, y) = (pixel.x.round(), pixel.y.round());
            fill(&mut depth, x as u32, y as u32, 10, z as f32);
            square(id as i32, x, y, 8.0)
        })
        .collect();
    rig.detector.show(markers);

    let report = rig.run(CalibrationMode::MultiMarker, &depth).unwrap();
    assert_eq!(report.records.len(), 9);
    assert_eq!(report.records[8].marker_id, 8);
    assert_eq!(rig.stored().unwrap(), report.records);

    // marker pixels are rounded, so anchors come back to within a few mm
    let transform = rig.mapper.transform().unwrap();
    for anchor in &anchors {
        assert_relative_eq!(
            transform.apply(&camera_from_world.apply(anchor)),
            *anchor,
            epsilon = 3.0
        );
    }
}

#[test]
fn reset_starts_a_new_aggregation_session() {
    let mut rig = diamond_rig();
    rig.detector.show(vec![single_marker()]);
    let aggregate = CalibrationMode::SingleMarker { aggregate: true };

    rig.run(aggregate, &flat_depth(500.0)).unwrap();
    rig.run(aggregate, &flat_depth(500.0)).unwrap();
    assert_eq!(rig.calibration.aggregated_frames(), 2);

    rig.calibration.reset();
    assert_eq!(rig.calibration.aggregated_frames(), 0);

    let report = rig.run(aggregate, &flat_depth(560.0)).unwrap();
    assert_eq!(report.frames, 1);
    assert!(report.records.iter().all(|r| r.depth == 560.0));
}
