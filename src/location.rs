//! Location capability: how a fix is obtained is up to the platform.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::config::{LOCATION_MAXIMUM_AGE_MS, LOCATION_TIMEOUT_MS};
use crate::error::Result;
use crate::position::GeoCoordinate;
use crate::subscription::Subscription;

/// A position report from the platform.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationFix {
    pub coordinate: GeoCoordinate,
    /// Estimated horizontal accuracy radius, meters
    pub accuracy: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl LocationFix {
    pub fn new(coordinate: GeoCoordinate) -> Self {
        Self {
            coordinate,
            accuracy: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_accuracy(mut self, accuracy: f64) -> Self {
        self.accuracy = Some(accuracy);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// How old this fix is relative to `now`; a fix from the future counts as fresh.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.timestamp).to_std().unwrap_or(Duration::ZERO)
    }
}

impl fmt::Display for LocationFix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.accuracy {
            Some(accuracy) => write!(f, "{} ±{:.0}m", self.coordinate, accuracy),
            None => write!(f, "{}", self.coordinate),
        }
    }
}

/// Request options for a fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocationOptions {
    /// Give up on a fresh fix after this long
    pub timeout: Duration,
    /// A cached fix no older than this may be returned instead of a fresh one
    pub maximum_age: Duration,
}

impl Default for LocationOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(LOCATION_TIMEOUT_MS),
            maximum_age: Duration::from_millis(LOCATION_MAXIMUM_AGE_MS),
        }
    }
}

/// Receives every update of a continuous location watch.
pub type LocationSink = Box<dyn FnMut(Result<LocationFix>) + Send>;

/// Platform geolocation.
pub trait LocationCapability: Send + Sync {
    /// Obtain a single fix. May block for up to `options.timeout`.
    fn current_fix(&self, options: &LocationOptions) -> Result<LocationFix>;

    /// Deliver fixes (and failures) to `sink` until the returned
    /// subscription is stopped.
    fn watch(&self, options: &LocationOptions, sink: LocationSink) -> Result<Subscription>;
}
