use std::fmt::{Display, Formatter};

use serde::ser::{Serialize, SerializeTuple, Serializer};

use crate::error::{AttendanceError, Result};

/// A point on the earth's surface in decimal degrees.
///
/// Coordinates are validated on construction, so anything holding a `Coordinate` can rely on
/// finite values with latitude in `[-90, 90]` and longitude in `[-180, 180]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinate {
    latitude: f64,
    longitude: f64,
}

impl Coordinate {
    /// Creates a new `Coordinate`, rejecting non-finite or out-of-range values.
    pub fn new(latitude: f64, longitude: f64) -> Result<Coordinate> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(AttendanceError::Validation(format!(
                "latitude must be between -90 and 90, got {}",
                latitude
            )));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(AttendanceError::Validation(format!(
                "longitude must be between -180 and 180, got {}",
                longitude
            )));
        }
        Ok(Coordinate {
            latitude,
            longitude,
        })
    }

    /// Creates a `Coordinate` from degrees the caller knows to be in range, e.g. constants.
    pub(crate) const fn from_valid_degrees(latitude: f64, longitude: f64) -> Coordinate {
        Coordinate {
            latitude,
            longitude,
        }
    }

    /// Parses a coordinate from the textual latitude and longitude that clients put in the
    /// request path.
    pub fn parse(latitude: &str, longitude: &str) -> Result<Coordinate> {
        let latitude = parse_degrees("latitude", latitude)?;
        let longitude = parse_degrees("longitude", longitude)?;
        Coordinate::new(latitude, longitude)
    }

    /// Get the latitude in decimal degrees
    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    /// Get the longitude in decimal degrees
    pub fn longitude(&self) -> f64 {
        self.longitude
    }
}

fn parse_degrees(name: &str, text: &str) -> Result<f64> {
    text.trim().parse::<f64>().map_err(|error| {
        AttendanceError::Validation(format!("could not convert {} {:?} to float: {}", name, text, error))
    })
}

impl Display for Coordinate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.latitude, self.longitude)
    }
}

// The browser client reads locations as `[lat, lon]` arrays.
impl Serialize for Coordinate {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(2)?;
        tuple.serialize_element(&self.latitude)?;
        tuple.serialize_element(&self.longitude)?;
        tuple.end()
    }
}
