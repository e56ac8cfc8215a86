use emio_core::{CorrespondencePoint, PixelCoordinates, PointCoordinates, Real};
use emio_sensor::PinholeCamera;
use emio_store::CalibrationStore;
use serde::{Deserialize, Serialize};

use crate::{
    estimate_rigid_transform, CalibrationError, ReferenceGeometry, RigidTransform,
    ValidationReason,
};

/// Fixed offsets applied after the rigid transform to re-origin results
/// in the deployment's robot frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameConvention {
    /// Subtracted from the world `y` coordinate (mm).
    pub vertical_offset: Real,
}

impl Default for FrameConvention {
    fn default() -> Self {
        Self {
            vertical_offset: 305.5,
        }
    }
}

/// Maps camera observations into the robot frame.
///
/// Calibration needs `&mut` access, so a mapper can never be read while a
/// calibration pass is replacing its transform.
#[derive(Clone, Debug)]
pub struct WorldFrameMapper {
    camera: PinholeCamera,
    geometry: ReferenceGeometry,
    convention: FrameConvention,
    transform: Option<RigidTransform>,
}

impl WorldFrameMapper {
    pub fn new(
        camera: PinholeCamera,
        geometry: ReferenceGeometry,
        convention: FrameConvention,
    ) -> Self {
        Self {
            camera,
            geometry,
            convention,
            transform: None,
        }
    }

    pub fn camera(&self) -> &PinholeCamera {
        &self.camera
    }

    pub fn geometry(&self) -> &ReferenceGeometry {
        &self.geometry
    }

    pub fn convention(&self) -> &FrameConvention {
        &self.convention
    }

    pub fn transform(&self) -> Option<&RigidTransform> {
        self.transform.as_ref()
    }

    pub fn is_initialized(&self) -> bool {
        self.transform.is_some()
    }

    /// Rebuilds the transform from the last persisted calibration session.
    /// On failure the current transform is kept.
    pub fn initialize(&mut self, store: &CalibrationStore) -> Result<&RigidTransform, CalibrationError> {
        let records = store.load()?;
        let transform = self.solve(&records)?;
        log::info!(
            "camera to world transform loaded from {}: {:?}",
            store.path().display(),
            transform.to_homogeneous()
        );
        Ok(&*self.transform.insert(transform))
    }

    /// Registers the correspondences against the reference geometry without
    /// touching the current transform.
    pub fn solve(&self, records: &[CorrespondencePoint]) -> Result<RigidTransform, CalibrationError> {
        if records.len() != self.geometry.len() {
            return Err(CalibrationError::GeometryMismatch {
                expected: self.geometry.len(),
                found: records.len(),
            });
        }

        let camera_points = records
            .iter()
            .enumerate()
            .map(|(index, r)| {
                let pixel = PixelCoordinates::new(r.pixel_x as Real, r.pixel_y as Real);
                self.camera
                    .deproject(&pixel, r.depth)
                    .ok_or(ValidationReason::UnknownDepth { index })
            })
            .collect::<Result<Vec<_>, _>>()?;
        log::debug!("trackers positions from calibration: {camera_points:?}");

        Ok(estimate_rigid_transform(
            &camera_points,
            self.geometry.anchors(),
        )?)
    }

    pub(crate) fn install(&mut self, transform: RigidTransform) {
        self.transform = Some(transform);
    }

    pub fn camera_to_world(&self, point: &PointCoordinates) -> Result<PointCoordinates, CalibrationError> {
        let transform = self
            .transform
            .as_ref()
            .ok_or(CalibrationError::NotInitialized)?;
        let mut world = transform.apply(point);
        world.y -= self.convention.vertical_offset;
        Ok(world)
    }

    /// Pixel plus depth to robot frame.
    pub fn project(&self, pixel: &PixelCoordinates, depth: Real) -> Result<PointCoordinates, CalibrationError> {
        let point = self
            .camera
            .deproject(pixel, depth)
            .ok_or(CalibrationError::UnknownDepth)?;
        self.camera_to_world(&point)
    }
}
