use std::time::Duration;

use emio_calibration::CalibrationError;

#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("acquisition worker did not signal ready within {0:?}")]
    StartupTimeout(Duration),
    #[error("camera could not be opened: {0:#}")]
    DeviceUnavailable(anyhow::Error),
    #[error("acquisition worker exited before signalling ready")]
    WorkerExited,
    #[error("camera {0} is already in use")]
    DeviceInUse(String),
    #[error("camera is not open")]
    NotRunning,
    #[error(transparent)]
    Calibration(#[from] CalibrationError),
}
