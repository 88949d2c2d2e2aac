//! Great-circle bearing and distance between validated coordinates.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Result;
use crate::position::GeoCoordinate;

/// Initial great-circle bearing in degrees, [0, 360) clockwise from true north.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bearing {
    pub degrees: f64,
    /// Set when origin and destination coincide or are antipodal; `degrees`
    /// is then 0 and carries no directional meaning.
    pub degenerate: bool,
}

impl fmt::Display for Bearing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.degenerate {
            write!(f, "{:.2}° (undefined)", self.degrees)
        } else {
            write!(f, "{:.2}°", self.degrees)
        }
    }
}

/// Great-circle distance in meters.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Distance(pub f64);

impl Distance {
    pub fn meters(&self) -> f64 {
        self.0
    }

    pub fn kilometers(&self) -> f64 {
        self.0 / 1000.0
    }
}

impl fmt::Display for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 >= 1000.0 {
            write!(f, "{:.1} km", self.kilometers())
        } else {
            write!(f, "{:.0} m", self.0)
        }
    }
}

/// Initial bearing from `origin` toward `destination`.
///
/// Fails only with `InvalidCoordinate`. Coincident or antipodal points give a
/// degenerate bearing of 0 rather than an error.
pub fn bearing(origin: &GeoCoordinate, destination: &GeoCoordinate) -> Result<Bearing> {
    origin.validate()?;
    destination.validate()?;

    let (degrees, degenerate) = origin.bearing_to(destination);
    Ok(Bearing {
        degrees,
        degenerate,
    })
}

/// Haversine distance between two coordinates. Symmetric in its arguments.
pub fn distance(a: &GeoCoordinate, b: &GeoCoordinate) -> Result<Distance> {
    a.validate()?;
    b.validate()?;

    Ok(Distance(a.distance_to(b)))
}

/// Normalize any finite angle into [0, 360).
pub fn normalize_degrees(degrees: f64) -> f64 {
    let normalized = degrees.rem_euclid(360.0);
    if normalized >= 360.0 { 0.0 } else { normalized }
}

/// Normalize any finite angle into (-180, 180].
pub fn normalize_signed_degrees(degrees: f64) -> f64 {
    let signed = (degrees + 540.0).rem_euclid(360.0) - 180.0;
    if signed <= -180.0 { 180.0 } else { signed }
}
