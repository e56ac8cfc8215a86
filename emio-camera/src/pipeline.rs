use emio_calibration::WorldFrameMapper;
use emio_core::{ColorImage, DepthImage, PixelCoordinates, PointCoordinates, Real};
use emio_sensor::depth::depth_at;
use image::{GrayImage, RgbImage};

use crate::{BlobTracker, Toggles, TrackingParameters};

/// Everything one acquisition cycle produces.
#[derive(Clone, Debug, Default)]
pub struct FrameResults {
    pub color: ColorImage,
    pub depth: DepthImage,
    pub hsv: RgbImage,
    pub mask: GrayImage,
    pub trackers: Vec<PointCoordinates>,
    pub point_cloud: Vec<PointCoordinates>,
}

/// Per-frame processing shared by both harness tiers.
///
/// Positions are reported in the robot frame once the mapper holds a
/// transform and in the camera frame before that.
pub struct Pipeline {
    tracker: BlobTracker,
    mapper: WorldFrameMapper,
    stride: u32,
}

impl Pipeline {
    pub fn new(parameters: TrackingParameters, mapper: WorldFrameMapper, stride: u32) -> Self {
        Self {
            tracker: BlobTracker::new(parameters),
            mapper,
            stride: stride.max(1),
        }
    }

    pub fn tracker(&self) -> &BlobTracker {
        &self.tracker
    }

    pub fn set_parameters(&mut self, parameters: TrackingParameters) {
        self.tracker.set_parameters(parameters);
    }

    pub fn mapper(&self) -> &WorldFrameMapper {
        &self.mapper
    }

    pub fn mapper_mut(&mut self) -> &mut WorldFrameMapper {
        &mut self.mapper
    }

    pub fn process(&self, color: ColorImage, depth: DepthImage, toggles: Toggles) -> FrameResults {
        let (hsv, mask) = self.tracker.segment(&color);

        let trackers = if toggles.tracking {
            self.tracker
                .blobs(&mask)
                .iter()
                .filter_map(|blob| {
                    let pixel = PixelCoordinates::new(blob.centroid.x.trunc(), blob.centroid.y.trunc());
                    self.locate(&pixel, depth_at(&depth, &pixel)?)
                })
                .collect()
        } else {
            vec![]
        };

        let point_cloud = if toggles.point_cloud {
            self.point_cloud(&depth)
        } else {
            vec![]
        };
        log::trace!(
            "frame processed: {} trackers, {} cloud points",
            trackers.len(),
            point_cloud.len()
        );

        FrameResults {
            color,
            depth,
            hsv,
            mask,
            trackers,
            point_cloud,
        }
    }

    fn point_cloud(&self, depth: &DepthImage) -> Vec<PointCoordinates> {
        let mut cloud = vec![];
        for y in (0..depth.height()).step_by(self.stride as usize) {
            for x in (0..depth.width()).step_by(self.stride as usize) {
                let d = depth.get_pixel(x, y).0[0] as Real;
                if let Some(point) = self.locate(&PixelCoordinates::new(x as Real, y as Real), d) {
                    cloud.push(point);
                }
            }
        }
        cloud
    }

    fn locate(&self, pixel: &PixelCoordinates, depth: Real) -> Option<PointCoordinates> {
        let point = self.mapper.camera().deproject(pixel, depth)?;
        if self.mapper.is_initialized() {
            self.mapper.camera_to_world(&point).ok()
        } else {
            Some(point)
        }
    }
}
