use crate::Real;

/// A calibration sample: where an anchor was seen in the image and how
/// far away it was.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CorrespondencePoint {
    pub pixel_x: i32,
    pub pixel_y: i32,
    pub depth: Real,
    pub marker_id: i32,
}

impl CorrespondencePoint {
    pub fn new(pixel_x: i32, pixel_y: i32, depth: Real, marker_id: i32) -> Self {
        Self {
            pixel_x,
            pixel_y,
            depth,
            marker_id,
        }
    }
}
