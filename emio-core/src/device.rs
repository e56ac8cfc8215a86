use image::{ImageBuffer, Luma, RgbImage};
use serde::{Deserialize, Serialize};

use crate::Real;

pub type ColorImage = RgbImage;

/// Depth in millimetres, `0.0` where the sensor has no return.
pub type DepthImage = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Pinhole intrinsics of the imager the depth frame is aligned to.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Intrinsics {
    pub ppx: Real,
    pub ppy: Real,
    pub fx: Real,
    pub fy: Real,
    pub width: usize,
    pub height: usize,
}

/// A depth camera as seen by the acquisition loop.
///
/// `refresh` blocks until the next frameset is delivered; the `read_*`
/// accessors return the frames of the last successful refresh.
pub trait DepthDevice: Send {
    fn name(&self) -> String;
    fn intrinsics(&self) -> Intrinsics;
    fn refresh(&mut self) -> anyhow::Result<()>;
    fn read_color_frame(&self) -> ColorImage;
    fn read_depth_frame(&self) -> DepthImage;
    fn close(&mut self);
}

/// Builds a device inside the acquisition context.
///
/// Device handles never cross into a worker; only the factory does.
pub trait DeviceFactory: Send + Sync {
    fn open(&self, camera: Option<&str>) -> anyhow::Result<Box<dyn DepthDevice>>;
}

impl<F> DeviceFactory for F
where
    F: Fn(Option<&str>) -> anyhow::Result<Box<dyn DepthDevice>> + Send + Sync,
{
    fn open(&self, camera: Option<&str>) -> anyhow::Result<Box<dyn DepthDevice>> {
        self(camera)
    }
}
