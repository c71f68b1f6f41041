//! Distances between coordinates on the WGS-84 ellipsoid.
//!
//! [geodesic_distance](crate::geo::geodesic_distance) solves the inverse geodesic problem with
//! the [Geodesic](geo::Geodesic) metric of the `geo` crate, which also converges for antipodal
//! points.

use geo::{Distance, Geodesic, Point};

use crate::error::Result;
use crate::Coordinate;

/// Returns the geodesic distance in meters between two coordinates.
pub fn geodesic_distance(from: &Coordinate, to: &Coordinate) -> f64 {
    if from == to {
        return 0.0;
    }
    Geodesic.distance(to_point(from), to_point(to))
}

/// Validates the raw degrees and returns the geodesic distance in meters between them.
pub fn distance_between(
    from_latitude: f64,
    from_longitude: f64,
    to_latitude: f64,
    to_longitude: f64,
) -> Result<f64> {
    let from = Coordinate::new(from_latitude, from_longitude)?;
    let to = Coordinate::new(to_latitude, to_longitude)?;
    Ok(geodesic_distance(&from, &to))
}

// geo points are (x, y), i.e. longitude first
fn to_point(coordinate: &Coordinate) -> Point<f64> {
    Point::new(coordinate.longitude(), coordinate.latitude())
}
