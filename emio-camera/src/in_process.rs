use std::sync::Arc;

use emio_calibration::{CalibrationMode, CalibrationReport, MarkerCalibration, WorldFrameMapper};
use emio_core::DeviceFactory;

use crate::{session::Session, CameraHarness, DeviceRegistry, HarnessCfg, HarnessError, SharedCamera};

/// Acquisition driven by the caller: every [`InProcessCamera::update`]
/// reads one frameset and publishes its results.
pub struct InProcessCamera {
    cfg: HarnessCfg,
    factory: Arc<dyn DeviceFactory>,
    registry: Option<DeviceRegistry>,
    shared: SharedCamera,
    session: Option<Session>,
}

impl InProcessCamera {
    pub fn new(cfg: HarnessCfg, factory: Arc<dyn DeviceFactory>) -> Self {
        let shared = SharedCamera::new(cfg.toggles(), cfg.parameters);
        Self {
            cfg,
            factory,
            registry: None,
            shared,
            session: None,
        }
    }

    pub fn with_registry(mut self, registry: DeviceRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn try_open(&mut self, camera: Option<&str>) -> Result<(), HarnessError> {
        self.close();
        let camera = camera.or(self.cfg.camera.as_deref());
        let session = Session::start(
            &self.cfg,
            self.factory.as_ref(),
            self.registry.as_ref(),
            camera,
            self.shared.parameters(),
        )?;
        self.session = Some(session);
        self.shared.lock().running = true;
        Ok(())
    }

    /// Reads the next frameset and publishes the derived results.
    pub fn update(&mut self) -> Result<(), HarnessError> {
        let session = self.session.as_mut().ok_or(HarnessError::NotRunning)?;
        let (toggles, parameters) = {
            let state = self.shared.lock();
            (state.toggles, state.parameters)
        };
        let results = session
            .acquire(toggles, parameters)
            .map_err(HarnessError::DeviceUnavailable)?;
        self.shared.lock().publish(results);
        Ok(())
    }

    pub fn calibrate(
        &mut self,
        calibration: &mut MarkerCalibration,
        mode: CalibrationMode,
    ) -> Result<CalibrationReport, HarnessError> {
        self.session
            .as_mut()
            .ok_or(HarnessError::NotRunning)?
            .calibrate(calibration, mode)
    }

    pub fn mapper(&self) -> Option<&WorldFrameMapper> {
        self.session.as_ref().map(|s| s.pipeline().mapper())
    }
}

impl CameraHarness for InProcessCamera {
    fn open(&mut self, camera: Option<&str>) -> bool {
        match self.try_open(camera) {
            Ok(()) => true,
            Err(e) => {
                log::error!("failed to open camera: {e}");
                false
            }
        }
    }

    fn close(&mut self) {
        if self.session.take().is_some() {
            log::info!("camera closed");
        }
        self.shared.lock().running = false;
    }

    fn state(&self) -> &SharedCamera {
        &self.shared
    }
}

impl Drop for InProcessCamera {
    fn drop(&mut self) {
        self.close();
    }
}
