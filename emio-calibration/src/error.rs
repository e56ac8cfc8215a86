use emio_store::StoreError;

use crate::TransformError;

/// Why a calibration pass was turned down. Nothing is persisted or
/// replaced when a pass fails for any of these.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationReason {
    #[error("no markers detected")]
    NoMarkers,
    #[error("expected {expected} markers, detected {found}")]
    WrongMarkerCount { expected: usize, found: usize },
    #[error("marker id {0} is not valid for this fixture")]
    InvalidMarkerId(i32),
    #[error("marker id {0} detected more than once")]
    DuplicateMarkerId(i32),
    #[error("marker id {found} is not the calibration marker {expected}")]
    UnexpectedMarkerId { expected: i32, found: i32 },
    #[error("depth is not known for calibration point {index}")]
    UnknownDepth { index: usize },
}

#[derive(Debug, thiserror::Error)]
pub enum CalibrationError {
    #[error("calibration pass rejected: {0}")]
    Validation(#[from] ValidationReason),
    #[error("marker detection failed: {0:#}")]
    Detector(anyhow::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Transform(#[from] TransformError),
    #[error("{found} correspondences do not match the {expected} reference anchors")]
    GeometryMismatch { expected: usize, found: usize },
    #[error("no camera to world transform has been established")]
    NotInitialized,
    #[error("pixel has no valid depth")]
    UnknownDepth,
    #[error("invalid calibration configuration: {0}")]
    Config(String),
}
