use std::{fs, path::PathBuf, thread, time::Duration};

use anyhow::Context;
use clap::Parser;
use emio_calibration::{
    BoardDimensions, CalibrationCfg, CalibrationMode, GeometryCfg, RigidTransform,
};
use emio_camera::{
    synthetic::{SyntheticDetector, SyntheticFactory, SyntheticScene},
    CameraHarness, HarnessCfg, InProcessCamera, WorkerCamera,
};
use emio_core::{Intrinsics, PixelCoordinates, PointCoordinates};
use sophus::nalgebra::Rotation3;

/// Calibrates a simulated depth camera against a marker fixture, then
/// tracks a target with the acquisition worker.
#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// JSON harness configuration; defaults are used if omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Camera identifier passed to the device factory.
    #[arg(long)]
    camera: Option<String>,

    /// How long the worker runs after calibration.
    #[arg(long, default_value_t = 2)]
    seconds: u64,

    /// Also compute the point cloud.
    #[arg(long)]
    point_cloud: bool,
}

const INTRINSICS: Intrinsics = Intrinsics {
    ppx: 320.0,
    ppy: 240.0,
    fx: 600.0,
    fy: 600.0,
    width: 640,
    height: 480,
};

fn load_cfg(path: Option<&PathBuf>) -> anyhow::Result<HarnessCfg> {
    let Some(path) = path else {
        let mut cfg = HarnessCfg::default();
        cfg.calibration.geometry = GeometryCfg::IdEncoded {
            dimensions: BoardDimensions {
                width: 120.0,
                thickness: 80.0,
                depth: 120.0,
            },
        };
        return Ok(cfg);
    };
    let data = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(serde_json::from_str(&data)?)
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut cfg = load_cfg(args.config.as_ref())?;
    cfg.point_cloud |= args.point_cloud;
    log::debug!("harness configuration: {}", serde_json::to_string(&cfg)?);

    let camera_from_world = RigidTransform::new(
        Rotation3::from_euler_angles(0.5, 0.4, 0.1).into_inner(),
        PointCoordinates::new(0.0, 0.0, 600.0),
    );
    let geometry = cfg.calibration.geometry.build();
    let scene = SyntheticScene::new(INTRINSICS)
        .with_background_depth(1200.0)
        .with_target(PixelCoordinates::new(520.0, 400.0), 6.0, 700.0)
        .with_marker_fixture(geometry.anchors(), &camera_from_world, 5.0);
    let factory = SyntheticFactory::new(scene.clone()).into_shared();

    let mut calibration = CalibrationCfg {
        marker_count: geometry.len(),
        ..Default::default()
    }
    .finalize(Box::new(SyntheticDetector::new(&scene)), cfg.calibration.store())?;

    {
        let mut camera = InProcessCamera::new(cfg.clone(), factory.clone());
        camera.try_open(args.camera.as_deref())?;
        let report = camera.calibrate(&mut calibration, CalibrationMode::MultiMarker)?;
        log::info!(
            "camera to world transform:\n{}",
            report.transform.to_homogeneous()
        );
        log::info!(
            "true camera to world transform:\n{}",
            camera_from_world.inverse().to_homogeneous()
        );
    }

    let mut camera = WorkerCamera::new(cfg, factory);
    if !camera.open(args.camera.as_deref()) {
        anyhow::bail!("acquisition worker did not start");
    }
    let state = camera.state().clone();
    for _ in 0..args.seconds * 4 {
        thread::sleep(Duration::from_millis(250));
        log::info!(
            "frame {}: trackers {:?}, {} cloud points",
            state.frame_count(),
            state.trackers_pos(),
            state.point_cloud().len()
        );
    }
    camera.close();
    Ok(())
}
