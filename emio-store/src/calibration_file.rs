use emio_core::CorrespondencePoint;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CALIBRATION_FILE: &str = "camera_2d_points.csv";

const HEADER: [&str; 4] = ["X", "Y", "Depth", "id"];

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("no calibration found at {}", .0.display())]
    NotFound(PathBuf),
    #[error("io error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed calibration file: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Serialize, Deserialize)]
struct Row {
    #[serde(rename = "X")]
    x: i32,
    #[serde(rename = "Y")]
    y: i32,
    #[serde(rename = "Depth")]
    depth: f64,
    id: i32,
}

impl From<&CorrespondencePoint> for Row {
    fn from(p: &CorrespondencePoint) -> Self {
        Row {
            x: p.pixel_x,
            y: p.pixel_y,
            depth: p.depth,
            id: p.marker_id,
        }
    }
}

impl From<Row> for CorrespondencePoint {
    fn from(r: Row) -> Self {
        CorrespondencePoint::new(r.x, r.y, r.depth, r.id)
    }
}

/// Holds exactly one calibration session: every `save` replaces the whole
/// file, and the replacement becomes visible in a single rename.
#[derive(Clone, Debug)]
pub struct CalibrationStore {
    path: PathBuf,
}

impl CalibrationStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    pub fn save(&self, records: &[CorrespondencePoint]) -> Result<(), StoreError> {
        let staging = self.staging_path();
        let written = self.write_rows(&staging, records);
        if written.is_err() {
            let _ = std::fs::remove_file(&staging);
            return written;
        }
        std::fs::rename(&staging, &self.path).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })?;
        log::debug!(
            "calibration data written to {}: {:?}",
            self.path.display(),
            records
        );
        Ok(())
    }

    pub fn load(&self) -> Result<Vec<CorrespondencePoint>, StoreError> {
        if !self.exists() {
            return Err(StoreError::NotFound(self.path.clone()));
        }
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(&self.path)?;

        let mut records = vec![];
        for row in reader.deserialize::<Row>() {
            records.push(row?.into());
        }
        log::debug!(
            "loaded {} correspondences from {}",
            records.len(),
            self.path.display()
        );
        Ok(records)
    }

    fn write_rows(&self, staging: &Path, records: &[CorrespondencePoint]) -> Result<(), StoreError> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(staging)?;
        writer.write_record(HEADER)?;
        for record in records {
            writer.serialize(Row::from(record))?;
        }
        writer.flush().map_err(|source| StoreError::Io {
            path: staging.to_path_buf(),
            source,
        })
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".partial");
        self.path.with_file_name(name)
    }
}
