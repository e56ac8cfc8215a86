pub mod depth;
pub mod hsv;
pub mod pinhole_camera;

pub use pinhole_camera::{deproject, PinholeCamera};
