use std::collections::BTreeSet;

use emio_core::{
    ColorImage, CorrespondencePoint, DepthImage, DetectedMarker, MarkerDetector, PixelCoordinates,
    PointCoordinates, Real,
};
use emio_sensor::{
    depth::{depth_at, median_depth_in_polygon},
    PinholeCamera,
};
use emio_store::CalibrationStore;
use serde::{Deserialize, Serialize};

use crate::{CalibrationError, RigidTransform, ValidationReason, WorldFrameMapper};

/// Corners, edge midpoints and centre of the single calibration marker.
pub const SINGLE_MARKER_POINTS: usize = 9;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationCfg {
    /// Smallest marker depth (mm) the multi-marker protocol accepts.
    pub min_depth: Real,
    /// Markers on the multi-marker fixture, carrying ids `0..marker_count`.
    pub marker_count: usize,
    /// The one id the single-marker protocol looks for.
    pub reserved_marker_id: i32,
    /// Number of ids in the marker dictionary.
    pub dictionary_size: i32,
}

impl Default for CalibrationCfg {
    fn default() -> Self {
        Self {
            min_depth: 5.0,
            marker_count: 8,
            reserved_marker_id: 672,
            dictionary_size: 1024,
        }
    }
}

impl CalibrationCfg {
    pub fn finalize(
        self,
        detector: Box<dyn MarkerDetector>,
        store: CalibrationStore,
    ) -> Result<MarkerCalibration, CalibrationError> {
        if self.marker_count < 3 || self.marker_count > self.dictionary_size.max(0) as usize {
            return Err(CalibrationError::Config(format!(
                "marker_count {} must lie in 3..={}",
                self.marker_count, self.dictionary_size
            )));
        }
        if !(0..self.dictionary_size).contains(&self.reserved_marker_id) {
            return Err(CalibrationError::Config(format!(
                "reserved marker id {} is outside the dictionary",
                self.reserved_marker_id
            )));
        }
        if !(self.min_depth >= 0.0) {
            return Err(CalibrationError::Config(format!(
                "min_depth {} must be non-negative",
                self.min_depth
            )));
        }

        log::info!(
            "calibration configured: {} markers, reserved id {}, calibration file {}",
            self.marker_count,
            self.reserved_marker_id,
            store.path().display()
        );
        Ok(MarkerCalibration {
            cfg: self,
            detector,
            store,
            accumulator: Accumulator::default(),
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CalibrationMode {
    /// One frame showing every fixture marker exactly once.
    MultiMarker,
    /// One frame showing the reserved marker; with `aggregate` the pass is
    /// averaged with the previous ones instead of replacing them.
    SingleMarker { aggregate: bool },
}

#[derive(Clone, Debug, PartialEq)]
pub struct CalibrationReport {
    pub transform: RigidTransform,
    pub records: Vec<CorrespondencePoint>,
    pub frames: usize,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct Sample {
    x: Real,
    y: Real,
    depth: Real,
}

#[derive(Clone, Debug, Default)]
struct Accumulator {
    sums: [Sample; SINGLE_MARKER_POINTS],
    frames: usize,
}

impl Accumulator {
    fn add(&mut self, samples: &[Sample; SINGLE_MARKER_POINTS]) {
        for (sum, s) in self.sums.iter_mut().zip(samples) {
            sum.x += s.x;
            sum.y += s.y;
            sum.depth += s.depth;
        }
        self.frames += 1;
    }

    fn average(&self, marker_id: i32) -> Vec<CorrespondencePoint> {
        let n = self.frames.max(1) as Real;
        self.sums
            .iter()
            .map(|s| {
                CorrespondencePoint::new(
                    (s.x / n).trunc() as i32,
                    (s.y / n).trunc() as i32,
                    s.depth / n,
                    marker_id,
                )
            })
            .collect()
    }
}

/// Runs calibration passes against a marker detector and commits the
/// result to the calibration file and a [`WorldFrameMapper`].
///
/// A pass either succeeds completely (file rewritten, transform replaced,
/// accumulator advanced) or leaves all three untouched.
pub struct MarkerCalibration {
    cfg: CalibrationCfg,
    detector: Box<dyn MarkerDetector>,
    store: CalibrationStore,
    accumulator: Accumulator,
}

impl MarkerCalibration {
    pub fn cfg(&self) -> &CalibrationCfg {
        &self.cfg
    }

    pub fn store(&self) -> &CalibrationStore {
        &self.store
    }

    /// Frames averaged into the single-marker accumulator so far.
    pub fn aggregated_frames(&self) -> usize {
        self.accumulator.frames
    }

    pub fn reset(&mut self) {
        self.accumulator = Accumulator::default();
    }

    pub fn calibrate(
        &mut self,
        mode: CalibrationMode,
        color: &ColorImage,
        depth: &DepthImage,
        mapper: &mut WorldFrameMapper,
    ) -> Result<CalibrationReport, CalibrationError> {
        let result = match mode {
            CalibrationMode::MultiMarker => self.calibrate_markers(color, depth, mapper),
            CalibrationMode::SingleMarker { aggregate } => {
                self.calibrate_single_marker(aggregate, color, depth, mapper)
            }
        };
        match &result {
            Ok(report) => log::info!(
                "calibration succeeded ({mode:?}, {} frame(s)): {:?}",
                report.frames,
                report.records
            ),
            Err(e) => log::error!("calibration failed ({mode:?}): {e}"),
        }
        result
    }

    fn detect(&mut self, color: &ColorImage) -> Result<Vec<DetectedMarker>, CalibrationError> {
        let markers = self
            .detector
            .detect(color)
            .map_err(CalibrationError::Detector)?;
        log::debug!(
            "detected ids: {:?}",
            markers.iter().map(|m| m.id).collect::<Vec<_>>()
        );
        if markers.is_empty() {
            return Err(ValidationReason::NoMarkers.into());
        }
        Ok(markers)
    }

    fn calibrate_markers(
        &mut self,
        color: &ColorImage,
        depth: &DepthImage,
        mapper: &mut WorldFrameMapper,
    ) -> Result<CalibrationReport, CalibrationError> {
        let markers = self.detect(color)?;
        self.validate_marker_set(&markers)?;
        let mut records = self.marker_records(&markers, depth)?;
        // boards whose centre is an anchor of its own get it derived from
        // the markers around it
        if mapper.geometry().len() == records.len() + 1 {
            records.push(centre_record(&records, mapper.camera())?);
        }

        let transform = mapper.solve(&records)?;
        self.store.save(&records)?;
        mapper.install(transform);
        // the file no longer holds a single-marker session
        self.accumulator = Accumulator::default();

        Ok(CalibrationReport {
            transform,
            records,
            frames: 1,
        })
    }

    fn validate_marker_set(&self, markers: &[DetectedMarker]) -> Result<(), ValidationReason> {
        if markers.len() != self.cfg.marker_count {
            return Err(ValidationReason::WrongMarkerCount {
                expected: self.cfg.marker_count,
                found: markers.len(),
            });
        }
        let mut seen = BTreeSet::new();
        for marker in markers {
            if marker.id < 0 || marker.id as usize >= self.cfg.marker_count {
                return Err(ValidationReason::InvalidMarkerId(marker.id));
            }
            if !seen.insert(marker.id) {
                return Err(ValidationReason::DuplicateMarkerId(marker.id));
            }
        }
        Ok(())
    }

    /// One record per marker, ordered by id: the truncated corner mean and
    /// the median depth under the marker.
    fn marker_records(
        &self,
        markers: &[DetectedMarker],
        depth: &DepthImage,
    ) -> Result<Vec<CorrespondencePoint>, ValidationReason> {
        let mut records = markers
            .iter()
            .map(|marker| -> Result<CorrespondencePoint, ValidationReason> {
                let index = marker.id as usize;
                let marker_depth = median_depth_in_polygon(depth, &marker.corners)
                    .filter(|d| *d >= self.cfg.min_depth)
                    .ok_or(ValidationReason::UnknownDepth { index })?;
                let centre = marker.centroid();
                Ok(CorrespondencePoint::new(
                    centre.x.trunc() as i32,
                    centre.y.trunc() as i32,
                    marker_depth,
                    marker.id,
                ))
            })
            .collect::<Result<Vec<_>, _>>()?;
        records.sort_by_key(|r| r.marker_id);
        Ok(records)
    }

    fn calibrate_single_marker(
        &mut self,
        aggregate: bool,
        color: &ColorImage,
        depth: &DepthImage,
        mapper: &mut WorldFrameMapper,
    ) -> Result<CalibrationReport, CalibrationError> {
        let markers = self.detect(color)?;
        let marker = self.validate_single_marker(&markers)?;
        let samples = single_marker_samples(marker, depth)?;

        let mut accumulator = if aggregate {
            self.accumulator.clone()
        } else {
            Accumulator::default()
        };
        accumulator.add(&samples);
        let records = accumulator.average(marker.id);

        let transform = mapper.solve(&records)?;
        self.store.save(&records)?;
        mapper.install(transform);
        self.accumulator = accumulator;
        log::debug!("number of calibration frames: {}", self.accumulator.frames);

        Ok(CalibrationReport {
            transform,
            records,
            frames: self.accumulator.frames,
        })
    }

    fn validate_single_marker<'a>(
        &self,
        markers: &'a [DetectedMarker],
    ) -> Result<&'a DetectedMarker, ValidationReason> {
        let [marker] = markers else {
            return Err(ValidationReason::WrongMarkerCount {
                expected: 1,
                found: markers.len(),
            });
        };
        if marker.id != self.cfg.reserved_marker_id {
            return Err(ValidationReason::UnexpectedMarkerId {
                expected: self.cfg.reserved_marker_id,
                found: marker.id,
            });
        }
        Ok(marker)
    }
}

/// Mean of the records in the camera frame, projected back to a record.
/// Its id is one past the last marker id.
fn centre_record(
    records: &[CorrespondencePoint],
    camera: &PinholeCamera,
) -> Result<CorrespondencePoint, ValidationReason> {
    let mut sum = PointCoordinates::zeros();
    for (index, r) in records.iter().enumerate() {
        let pixel = PixelCoordinates::new(r.pixel_x as Real, r.pixel_y as Real);
        sum += camera
            .deproject(&pixel, r.depth)
            .ok_or(ValidationReason::UnknownDepth { index })?;
    }
    let index = records.len();
    let (pixel, depth) = camera
        .project(&(sum / index.max(1) as Real))
        .ok_or(ValidationReason::UnknownDepth { index })?;
    Ok(CorrespondencePoint::new(
        pixel.x.trunc() as i32,
        pixel.y.trunc() as i32,
        depth,
        index as i32,
    ))
}

/// Corners 0..4, edge midpoints (0-1, 1-2, 2-3, 3-0), then the truncated
/// centre; each with the depth read at its pixel.
fn single_marker_samples(
    marker: &DetectedMarker,
    depth: &DepthImage,
) -> Result<[Sample; SINGLE_MARKER_POINTS], ValidationReason> {
    let corners = &marker.corners;
    let mut pixels = [PixelCoordinates::zeros(); SINGLE_MARKER_POINTS];
    pixels[..4].copy_from_slice(corners);
    for i in 0..4 {
        pixels[4 + i] = (corners[i] + corners[(i + 1) % 4]) / 2.0;
    }
    let centre = marker.centroid();
    pixels[8] = PixelCoordinates::new(centre.x.trunc(), centre.y.trunc());

    let mut samples = [Sample::default(); SINGLE_MARKER_POINTS];
    for (index, pixel) in pixels.iter().enumerate() {
        let d = depth_at(depth, pixel).ok_or(ValidationReason::UnknownDepth { index })?;
        samples[index] = Sample {
            x: pixel.x,
            y: pixel.y,
            depth: d,
        };
    }
    Ok(samples)
}
