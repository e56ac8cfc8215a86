use std::{path::PathBuf, time::Duration};

use emio_calibration::{CalibrationError, FrameConvention, GeometryCfg, WorldFrameMapper};
use emio_core::Intrinsics;
use emio_sensor::PinholeCamera;
use emio_store::{CalibrationStore, DEFAULT_CALIBRATION_FILE};
use serde::{Deserialize, Serialize};

/// HSV window and blob filter of the marker tracker. Hue is on the 8-bit
/// `[0, 180)` scale.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingParameters {
    pub hue_h: u8,
    pub hue_l: u8,
    pub sat_h: u8,
    pub sat_l: u8,
    pub value_h: u8,
    pub value_l: u8,
    /// Radius of the square erosion kernel, `0` disables erosion.
    pub erosion_size: u8,
    /// Smallest blob, in pixels, reported as a tracker.
    pub area: usize,
}

impl Default for TrackingParameters {
    fn default() -> Self {
        Self {
            hue_h: 90,
            hue_l: 36,
            sat_h: 255,
            sat_l: 100,
            value_h: 255,
            value_l: 35,
            erosion_size: 1,
            area: 1,
        }
    }
}

impl TrackingParameters {
    pub fn lower(&self) -> [u8; 3] {
        [self.hue_l, self.sat_l, self.value_l]
    }

    pub fn upper(&self) -> [u8; 3] {
        [self.hue_h, self.sat_h, self.value_h]
    }
}

/// Feature flags read by the acquisition loop on every cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toggles {
    pub tracking: bool,
    pub point_cloud: bool,
    pub show: bool,
}

/// Where the camera to world calibration lives and how it is interpreted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationSettings {
    pub store_path: PathBuf,
    pub geometry: GeometryCfg,
    pub convention: FrameConvention,
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from(DEFAULT_CALIBRATION_FILE),
            geometry: GeometryCfg::default(),
            convention: FrameConvention::default(),
        }
    }
}

impl CalibrationSettings {
    pub fn store(&self) -> CalibrationStore {
        CalibrationStore::new(self.store_path.clone())
    }

    /// A mapper for the given camera, without a transform.
    pub fn mapper(&self, intrinsics: &Intrinsics) -> WorldFrameMapper {
        WorldFrameMapper::new(
            PinholeCamera::from_intrinsics(intrinsics),
            self.geometry.build(),
            self.convention,
        )
    }

    /// A mapper initialised from the calibration file.
    pub fn load_mapper(&self, intrinsics: &Intrinsics) -> Result<WorldFrameMapper, CalibrationError> {
        let mut mapper = self.mapper(intrinsics);
        mapper.initialize(&self.store())?;
        Ok(mapper)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessCfg {
    /// Device identifier handed to the factory; `None` picks any camera.
    pub camera: Option<String>,
    pub tracking: bool,
    pub point_cloud: bool,
    pub show: bool,
    pub parameters: TrackingParameters,
    pub startup_timeout_ms: u64,
    pub shutdown_timeout_ms: u64,
    /// Sample every n-th pixel on both axes for the point cloud.
    pub point_cloud_stride: u32,
    pub calibration: CalibrationSettings,
}

impl Default for HarnessCfg {
    fn default() -> Self {
        Self {
            camera: None,
            tracking: true,
            point_cloud: false,
            show: false,
            parameters: TrackingParameters::default(),
            startup_timeout_ms: 5000,
            shutdown_timeout_ms: 1000,
            point_cloud_stride: 4,
            calibration: CalibrationSettings::default(),
        }
    }
}

impl HarnessCfg {
    pub fn toggles(&self) -> Toggles {
        Toggles {
            tracking: self.tracking,
            point_cloud: self.point_cloud,
            show: self.show,
        }
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}
