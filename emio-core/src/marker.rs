use crate::{ColorImage, PixelCoordinates};

/// One fiducial found by the detector: its dictionary id and its four
/// corners in detector order.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectedMarker {
    pub id: i32,
    pub corners: [PixelCoordinates; 4],
}

impl DetectedMarker {
    pub fn new(id: i32, corners: [PixelCoordinates; 4]) -> Self {
        Self { id, corners }
    }

    pub fn centroid(&self) -> PixelCoordinates {
        self.corners.iter().sum::<PixelCoordinates>() / 4.0
    }
}

pub trait MarkerDetector: Send {
    fn detect(&mut self, frame: &ColorImage) -> anyhow::Result<Vec<DetectedMarker>>;
}
