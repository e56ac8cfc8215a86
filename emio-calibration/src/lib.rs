mod error;
pub use error::*;
mod marker_calibration;
pub use marker_calibration::*;
mod reference_geometry;
pub use reference_geometry::*;
mod rigid_transform;
pub use rigid_transform::*;
mod world_frame;
pub use world_frame::*;
