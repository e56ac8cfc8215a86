use std::sync::{Arc, Mutex, MutexGuard};

use emio_core::{ColorImage, DepthImage, PointCoordinates};
use image::{GrayImage, RgbImage};

use crate::{FrameResults, Toggles, TrackingParameters};

/// Everything the acquisition loop and its consumers exchange. One lock
/// guards the whole struct: a frame's results are published at once.
#[derive(Debug)]
pub struct SharedCameraState {
    pub running: bool,
    /// Bumped for every worker started; a worker only writes while its own
    /// generation is current.
    pub generation: u64,
    pub toggles: Toggles,
    pub parameters: TrackingParameters,
    pub frame_count: u64,
    pub color_frame: Option<ColorImage>,
    pub depth_frame: Option<DepthImage>,
    pub hsv_frame: Option<RgbImage>,
    pub mask_frame: Option<GrayImage>,
    pub trackers_pos: Vec<PointCoordinates>,
    pub point_cloud: Vec<PointCoordinates>,
}

impl SharedCameraState {
    pub fn new(toggles: Toggles, parameters: TrackingParameters) -> Self {
        Self {
            running: false,
            generation: 0,
            toggles,
            parameters,
            frame_count: 0,
            color_frame: None,
            depth_frame: None,
            hsv_frame: None,
            mask_frame: None,
            trackers_pos: vec![],
            point_cloud: vec![],
        }
    }

    pub fn publish(&mut self, results: FrameResults) {
        self.color_frame = Some(results.color);
        self.depth_frame = Some(results.depth);
        self.hsv_frame = Some(results.hsv);
        self.mask_frame = Some(results.mask);
        self.trackers_pos = results.trackers;
        self.point_cloud = results.point_cloud;
        self.frame_count += 1;
    }
}

/// Cloneable handle on the state shared with the acquisition loop.
///
/// Getters return copies taken under the lock. Tracker positions and the
/// point cloud read as empty while their feature is switched off, so a
/// consumer never acts on data from before the switch.
#[derive(Clone, Debug)]
pub struct SharedCamera {
    inner: Arc<Mutex<SharedCameraState>>,
}

impl SharedCamera {
    pub fn new(toggles: Toggles, parameters: TrackingParameters) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SharedCameraState::new(toggles, parameters))),
        }
    }

    /// A panicking writer leaves plain data behind, so a poisoned lock is
    /// still usable.
    pub fn lock(&self) -> MutexGuard<'_, SharedCameraState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    pub fn frame_count(&self) -> u64 {
        self.lock().frame_count
    }

    pub fn trackers_pos(&self) -> Vec<PointCoordinates> {
        let state = self.lock();
        if state.toggles.tracking {
            state.trackers_pos.clone()
        } else {
            vec![]
        }
    }

    pub fn point_cloud(&self) -> Vec<PointCoordinates> {
        let state = self.lock();
        if state.toggles.point_cloud {
            state.point_cloud.clone()
        } else {
            vec![]
        }
    }

    pub fn hsv_frame(&self) -> Option<RgbImage> {
        self.lock().hsv_frame.clone()
    }

    pub fn mask_frame(&self) -> Option<GrayImage> {
        self.lock().mask_frame.clone()
    }

    /// Last colour frame, only while frames are shown.
    pub fn color_frame(&self) -> Option<ColorImage> {
        let state = self.lock();
        state.toggles.show.then(|| state.color_frame.clone()).flatten()
    }

    pub fn depth_frame(&self) -> Option<DepthImage> {
        self.lock().depth_frame.clone()
    }

    pub fn parameters(&self) -> TrackingParameters {
        self.lock().parameters
    }

    pub fn set_parameters(&self, parameters: TrackingParameters) {
        self.lock().parameters = parameters;
    }

    pub fn toggles(&self) -> Toggles {
        self.lock().toggles
    }

    pub fn tracking(&self) -> bool {
        self.lock().toggles.tracking
    }

    pub fn set_tracking(&self, enabled: bool) {
        self.lock().toggles.tracking = enabled;
    }

    pub fn computes_point_cloud(&self) -> bool {
        self.lock().toggles.point_cloud
    }

    pub fn set_point_cloud(&self, enabled: bool) {
        self.lock().toggles.point_cloud = enabled;
    }

    pub fn shows_frames(&self) -> bool {
        self.lock().toggles.show
    }

    pub fn set_show(&self, enabled: bool) {
        self.lock().toggles.show = enabled;
    }
}
