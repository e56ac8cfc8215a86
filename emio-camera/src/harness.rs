use crate::SharedCamera;

/// Lifecycle shared by the in-process and worker tiers.
pub trait CameraHarness {
    /// Starts acquisition, closing any previous session first. Returns
    /// `false` when the camera did not come up.
    fn open(&mut self, camera: Option<&str>) -> bool;

    /// Stops acquisition. Calling it on a closed harness is a no-op.
    fn close(&mut self);

    fn state(&self) -> &SharedCamera;

    fn is_running(&self) -> bool {
        self.state().is_running()
    }
}
