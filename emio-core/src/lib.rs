mod device;
pub use device::*;
mod marker;
pub use marker::*;
mod correspondence;
pub use correspondence::*;

use sophus::nalgebra::{Vector2, Vector3};

pub type Real = f64;
pub type PointCoordinates = Vector3<Real>;
pub type PixelCoordinates = Vector2<Real>;
