use emio_core::{Intrinsics, PixelCoordinates, PointCoordinates, Real};
use sophus::{
    core::linalg::VecF64, image::ImageSize,
    sensor::camera_enum::perspective_camera::PinholeCameraF64,
};

/// Back-projects a pixel with a known depth into the camera's optical frame.
///
/// Returns `None` for a non-positive depth: the sensor reports `0` where it
/// has no return and such a pixel has no metric position.
pub fn deproject(
    intrinsics: &Intrinsics,
    pixel: &PixelCoordinates,
    depth: Real,
) -> Option<PointCoordinates> {
    if !(depth > 0.0) {
        return None;
    }
    Some(PointCoordinates::new(
        (pixel.x - intrinsics.ppx) / intrinsics.fx * depth,
        (pixel.y - intrinsics.ppy) / intrinsics.fy * depth,
        depth,
    ))
}

#[derive(Clone, Debug)]
pub struct PinholeCamera {
    pub model: PinholeCameraF64,
}

impl PinholeCamera {
    pub fn new(model: PinholeCameraF64) -> Self {
        Self { model }
    }

    pub fn from_intrinsics(intrinsics: &Intrinsics) -> Self {
        Self::new(PinholeCameraF64::from_params_and_size(
            &VecF64::<4>::new(
                intrinsics.fx,
                intrinsics.fy,
                intrinsics.ppx,
                intrinsics.ppy,
            ),
            ImageSize::new(intrinsics.width, intrinsics.height),
        ))
    }

    // model params are laid out as [fx, fy, cx, cy]
    pub fn intrinsics(&self) -> Intrinsics {
        let params = self.model.params();
        Intrinsics {
            fx: params[0],
            fy: params[1],
            ppx: params[2],
            ppy: params[3],
            width: self.cols(),
            height: self.rows(),
        }
    }

    pub fn cols(&self) -> usize {
        self.model.image_size().width
    }

    pub fn rows(&self) -> usize {
        self.model.image_size().height
    }

    pub fn deproject(&self, pixel: &PixelCoordinates, depth: Real) -> Option<PointCoordinates> {
        deproject(&self.intrinsics(), pixel, depth)
    }

    /// Forward pinhole model: metric point to pixel plus depth.
    pub fn project(&self, point: &PointCoordinates) -> Option<(PixelCoordinates, Real)> {
        if !(point.z > 0.0) {
            return None;
        }
        let intrinsics = self.intrinsics();
        let pixel = PixelCoordinates::new(
            point.x / point.z * intrinsics.fx + intrinsics.ppx,
            point.y / point.z * intrinsics.fy + intrinsics.ppy,
        );
        Some((pixel, point.z))
    }
}
