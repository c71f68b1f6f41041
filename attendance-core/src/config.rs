use std::path::PathBuf;

use crate::error::{AttendanceError, Result};
use crate::Coordinate;

/// Latitude of the hostel that attendance is tracked for.
pub const DEFAULT_REFERENCE_LATITUDE: f64 = 21.498221;

/// Longitude of the hostel that attendance is tracked for.
pub const DEFAULT_REFERENCE_LONGITUDE: f64 = 83.904285;

/// Radius around the reference point that still counts as present, in meters.
pub const DEFAULT_THRESHOLD_METERS: f64 = 10.0;

/// The hostel as a [Coordinate](Coordinate).
pub const DEFAULT_REFERENCE: Coordinate =
    Coordinate::from_valid_degrees(DEFAULT_REFERENCE_LATITUDE, DEFAULT_REFERENCE_LONGITUDE);

/// Default location of the SQLite file, relative to the working directory.
pub const DEFAULT_DATABASE_PATH: &str = "attendance.db";

/// Everything the [AttendanceService](crate::AttendanceService) needs to know about the place it
/// tracks attendance for.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerConfig {
    /// The fixed point distances are measured against.
    pub reference: Coordinate,

    /// Maximum distance from `reference` that counts as present.
    pub threshold_meters: f64,

    /// Where the attendance log is stored.
    pub database_path: PathBuf,
}

impl TrackerConfig {
    /// Creates a new `TrackerConfig`, validating the reference point and the threshold.
    pub fn new(
        reference_latitude: f64,
        reference_longitude: f64,
        threshold_meters: f64,
        database_path: PathBuf,
    ) -> Result<TrackerConfig> {
        Ok(TrackerConfig {
            reference: Coordinate::new(reference_latitude, reference_longitude)?,
            threshold_meters: validate_threshold(threshold_meters)?,
            database_path,
        })
    }
}

/// Accepts finite, non-negative thresholds.
pub(crate) fn validate_threshold(threshold_meters: f64) -> Result<f64> {
    if !threshold_meters.is_finite() || threshold_meters < 0.0 {
        return Err(AttendanceError::Validation(format!(
            "threshold must be a non-negative number of meters, got {}",
            threshold_meters
        )));
    }
    Ok(threshold_meters)
}

impl Default for TrackerConfig {
    fn default() -> Self {
        TrackerConfig {
            reference: DEFAULT_REFERENCE,
            threshold_meters: DEFAULT_THRESHOLD_METERS,
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
        }
    }
}
