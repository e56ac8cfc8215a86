use emio_core::{ColorImage, PixelCoordinates, Real};
use emio_sensor::hsv::{in_range, rgb_to_hsv};
use image::{GrayImage, Luma, RgbImage};
use imageproc::{
    distance_transform::Norm,
    morphology::erode,
    region_labelling::{connected_components, Connectivity},
};

use crate::TrackingParameters;

/// A connected region of the tracking mask.
#[derive(Clone, Debug, PartialEq)]
pub struct Blob {
    pub area: usize,
    pub centroid: PixelCoordinates,
}

/// Colour-based tracker for the passive markers mounted on the robot.
#[derive(Clone, Debug, Default)]
pub struct BlobTracker {
    parameters: TrackingParameters,
}

impl BlobTracker {
    pub fn new(parameters: TrackingParameters) -> Self {
        Self { parameters }
    }

    pub fn parameters(&self) -> &TrackingParameters {
        &self.parameters
    }

    pub fn set_parameters(&mut self, parameters: TrackingParameters) {
        if parameters != self.parameters {
            log::debug!("tracking parameters changed: {parameters:?}");
            self.parameters = parameters;
        }
    }

    /// HSV view of the frame and the eroded in-range mask.
    pub fn segment(&self, frame: &ColorImage) -> (RgbImage, GrayImage) {
        let hsv = rgb_to_hsv(frame);
        let mask = in_range(&hsv, self.parameters.lower(), self.parameters.upper());
        let mask = erode(&mask, Norm::LInf, self.parameters.erosion_size);
        (hsv, mask)
    }

    /// 8-connected components of `mask` with at least `area` pixels, in the
    /// raster order of their first pixel.
    pub fn blobs(&self, mask: &GrayImage) -> Vec<Blob> {
        let labels = connected_components(mask, Connectivity::Eight, Luma([0u8]));

        let mut regions: Vec<Region> = vec![];
        for (index, (x, y, label)) in labels.enumerate_pixels().enumerate() {
            let label = label.0[0] as usize;
            if label == 0 {
                continue;
            }
            if regions.len() < label {
                regions.resize(label, Region::default());
            }
            regions[label - 1].add(index, x, y);
        }
        regions.sort_by_key(|r| r.first);

        regions
            .into_iter()
            .filter(|r| r.area > 0 && r.area >= self.parameters.area)
            .map(|r| Blob {
                area: r.area,
                centroid: PixelCoordinates::new(r.sum_x / r.area as Real, r.sum_y / r.area as Real),
            })
            .collect()
    }
}

#[derive(Clone, Default)]
struct Region {
    first: usize,
    area: usize,
    sum_x: Real,
    sum_y: Real,
}

impl Region {
    fn add(&mut self, index: usize, x: u32, y: u32) {
        if self.area == 0 {
            self.first = index;
        }
        self.area += 1;
        self.sum_x += x as Real;
        self.sum_y += y as Real;
    }
}
