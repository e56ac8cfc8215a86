mod calibration_file;
pub use calibration_file::*;
