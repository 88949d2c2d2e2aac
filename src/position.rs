use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{QiblaError, Result};

/// Earth's mean radius in meters.
pub const EARTH_RADIUS: f64 = 6_371_000.0;

/// Below this magnitude both atan2 components are treated as zero, which
/// happens for coincident and antipodal points.
const DEGENERATE_EPSILON: f64 = 1e-12;

/// A point on the Earth's surface in decimal degrees.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoCoordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl fmt::Display for GeoCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}°, {:.6}°)", self.latitude, self.longitude)
    }
}

impl GeoCoordinate {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Build a coordinate, rejecting anything outside [-90,90] x [-180,180].
    pub fn try_new(latitude: f64, longitude: f64) -> Result<Self> {
        let coord = Self::new(latitude, longitude);
        coord.validate()?;
        Ok(coord)
    }

    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    pub fn validate(&self) -> Result<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(QiblaError::InvalidCoordinate {
                latitude: self.latitude,
                longitude: self.longitude,
            })
        }
    }

    /// Initial great-circle bearing from this coordinate to another.
    ///
    /// Returns `(degrees, degenerate)`. Degrees are in [0, 360), clockwise from
    /// true north. When the two points coincide or are antipodal the bearing is
    /// undefined; the result is then `(0.0, true)` instead of NaN.
    ///
    /// Assumes both coordinates are valid, see [`crate::geodesy::bearing`] for
    /// the checked form.
    pub fn bearing_to(&self, other: &GeoCoordinate) -> (f64, bool) {
        let lat_from = self.latitude.to_radians();
        let lat_to = other.latitude.to_radians();
        let delta_lon = (other.longitude - self.longitude).to_radians();

        let y = delta_lon.sin() * lat_to.cos();
        let x = lat_from.cos() * lat_to.sin() - lat_from.sin() * lat_to.cos() * delta_lon.cos();

        if y.abs() < DEGENERATE_EPSILON && x.abs() < DEGENERATE_EPSILON {
            return (0.0, true);
        }

        let bearing = (y.atan2(x).to_degrees() + 360.0) % 360.0;
        // 360 - tiny rounds up to exactly 360.0
        if bearing >= 360.0 {
            (0.0, false)
        } else {
            (bearing, false)
        }
    }

    /// Distance to another coordinate using the Haversine formula.
    /// Read more here: https://en.wikipedia.org/wiki/Haversine_formula
    /// Returns the distance in meters.
    pub fn distance_to(&self, other: &GeoCoordinate) -> f64 {
        let lat_from = self.latitude.to_radians();
        let lat_to = other.latitude.to_radians();
        let delta_lat = (other.latitude - self.latitude).to_radians();
        let delta_lon = (other.longitude - self.longitude).to_radians();

        let a = (delta_lat / 2.0).sin().powi(2)
            + lat_from.cos() * lat_to.cos() * (delta_lon / 2.0).sin().powi(2);

        // rounding can push `a` a hair past 1 for near-antipodal points
        let a = a.clamp(0.0, 1.0);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

        EARTH_RADIUS * c
    }
}
