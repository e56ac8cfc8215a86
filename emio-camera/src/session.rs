use emio_calibration::{CalibrationMode, CalibrationReport, MarkerCalibration};
use emio_core::{DepthDevice, DeviceFactory};

use crate::{
    DeviceLease, DeviceRegistry, FrameResults, HarnessCfg, HarnessError, Pipeline, Toggles,
    TrackingParameters,
};

/// An open device with its processing pipeline. The device is closed and
/// its registry lease released when the session is dropped.
pub(crate) struct Session {
    device: Box<dyn DepthDevice>,
    pipeline: Pipeline,
    _lease: Option<DeviceLease>,
}

impl Session {
    pub(crate) fn start(
        cfg: &HarnessCfg,
        factory: &dyn DeviceFactory,
        registry: Option<&DeviceRegistry>,
        camera: Option<&str>,
        parameters: TrackingParameters,
    ) -> Result<Self, HarnessError> {
        let mut device = factory
            .open(camera)
            .map_err(HarnessError::DeviceUnavailable)?;
        let name = device.name();
        let lease = match registry.map(|r| r.claim(&name)).transpose() {
            Ok(lease) => lease,
            Err(e) => {
                device.close();
                return Err(e);
            }
        };

        let intrinsics = device.intrinsics();
        let mapper = match cfg.calibration.load_mapper(&intrinsics) {
            Ok(mapper) => mapper,
            Err(e) => {
                log::warn!("no camera to world transform ({e}), reporting positions in the camera frame");
                cfg.calibration.mapper(&intrinsics)
            }
        };
        log::info!(
            "camera {name} opened at {}x{}",
            intrinsics.width,
            intrinsics.height
        );

        Ok(Self {
            device,
            pipeline: Pipeline::new(parameters, mapper, cfg.point_cloud_stride),
            _lease: lease,
        })
    }

    pub(crate) fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Waits for the next frameset and runs it through the pipeline.
    pub(crate) fn acquire(
        &mut self,
        toggles: Toggles,
        parameters: TrackingParameters,
    ) -> anyhow::Result<FrameResults> {
        self.device.refresh()?;
        self.pipeline.set_parameters(parameters);
        Ok(self.pipeline.process(
            self.device.read_color_frame(),
            self.device.read_depth_frame(),
            toggles,
        ))
    }

    /// Runs a calibration pass on a fresh frameset. A successful pass
    /// replaces the transform used for every later frame.
    pub(crate) fn calibrate(
        &mut self,
        calibration: &mut MarkerCalibration,
        mode: CalibrationMode,
    ) -> Result<CalibrationReport, HarnessError> {
        self.device
            .refresh()
            .map_err(HarnessError::DeviceUnavailable)?;
        let color = self.device.read_color_frame();
        let depth = self.device.read_depth_frame();
        Ok(calibration.calibrate(mode, &color, &depth, self.pipeline.mapper_mut())?)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.device.close();
    }
}
