//! Heading normalization
//!
//! Orientation feeds report heading in one of three conventions:
//! - an explicit compass heading, clockwise from north (iOS style)
//! - a magnetic heading from a sensor, also clockwise, uncorrected for
//!   declination
//! - a raw device-orientation `alpha` that grows counter-clockwise
//!
//! [`normalize`] resolves a raw event into a single clockwise-from-north
//! [`HeadingSample`] so nothing downstream needs to know which one it was.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::geodesy::normalize_degrees;

/// Where a heading came from, or that there is none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeadingSourceKind {
    Absolute,
    MagneticUncalibrated,
    Unavailable,
}

/// One event from a device orientation feed, as delivered by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawOrientationEvent {
    /// Counter-clockwise rotation about the z axis, degrees
    pub alpha: Option<f64>,
    /// Whether the platform claims the frame is earth-referenced
    pub absolute: bool,
    /// Vendor compass heading field, clockwise from north
    pub compass_heading: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl RawOrientationEvent {
    pub fn from_alpha(alpha: f64) -> Self {
        Self {
            alpha: Some(alpha),
            absolute: false,
            compass_heading: None,
            timestamp: Utc::now(),
        }
    }

    pub fn from_compass(heading: f64, absolute: bool) -> Self {
        Self {
            alpha: None,
            absolute,
            compass_heading: Some(heading),
            timestamp: Utc::now(),
        }
    }

    pub fn empty() -> Self {
        Self {
            alpha: None,
            absolute: false,
            compass_heading: None,
            timestamp: Utc::now(),
        }
    }
}

/// A normalized heading. `azimuth` is `None` exactly when `source` is
/// `Unavailable`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeadingSample {
    pub azimuth: Option<f64>,
    pub source: HeadingSourceKind,
    pub timestamp: DateTime<Utc>,
}

impl HeadingSample {
    pub fn new(azimuth: f64, source: HeadingSourceKind, timestamp: DateTime<Utc>) -> Self {
        if source == HeadingSourceKind::Unavailable || !azimuth.is_finite() {
            return Self::unavailable(timestamp);
        }
        Self {
            azimuth: Some(normalize_degrees(azimuth)),
            source,
            timestamp,
        }
    }

    pub fn unavailable(timestamp: DateTime<Utc>) -> Self {
        Self {
            azimuth: None,
            source: HeadingSourceKind::Unavailable,
            timestamp,
        }
    }

    /// The azimuth, if this sample carries a usable one.
    pub fn heading(&self) -> Option<f64> {
        match self.source {
            HeadingSourceKind::Unavailable => None,
            _ => self.azimuth.filter(|a| a.is_finite()),
        }
    }

    pub fn is_available(&self) -> bool {
        self.heading().is_some()
    }
}

/// Convert a raw orientation event into a heading sample.
///
/// An explicit compass heading wins over `alpha`; alpha is converted with
/// `(360 - alpha) mod 360`. Non-finite fields count as absent.
pub fn normalize(raw: &RawOrientationEvent) -> HeadingSample {
    if let Some(heading) = raw.compass_heading.filter(|h| h.is_finite()) {
        let source = if raw.absolute {
            HeadingSourceKind::Absolute
        } else {
            HeadingSourceKind::MagneticUncalibrated
        };
        return HeadingSample::new(heading, source, raw.timestamp);
    }

    if let Some(alpha) = raw.alpha.filter(|a| a.is_finite()) {
        return HeadingSample::new(
            360.0 - alpha,
            HeadingSourceKind::MagneticUncalibrated,
            raw.timestamp,
        );
    }

    HeadingSample::unavailable(raw.timestamp)
}

/// Latest-sample-wins holder for the orientation feed.
///
/// Once marked unsupported the source only ever yields `Unavailable`.
#[derive(Debug, Clone)]
pub struct HeadingSource {
    supported: bool,
    latest: Option<HeadingSample>,
}

impl Default for HeadingSource {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadingSource {
    pub fn new() -> Self {
        Self {
            supported: true,
            latest: None,
        }
    }

    /// Normalize one event and make it the latest sample.
    pub fn push(&mut self, raw: &RawOrientationEvent) -> HeadingSample {
        let sample = if self.supported {
            normalize(raw)
        } else {
            HeadingSample::unavailable(raw.timestamp)
        };

        match sample.azimuth {
            Some(azimuth) => trace!(azimuth, source = ?sample.source, "heading sample"),
            None => debug!("orientation event carried no usable heading"),
        }

        self.latest = Some(sample);
        sample
    }

    /// The orientation capability is absent or denied; stop producing headings.
    pub fn mark_unsupported(&mut self) -> HeadingSample {
        if self.supported {
            warn!("orientation capability unavailable, heading disabled");
        }
        self.supported = false;
        let sample = HeadingSample::unavailable(Utc::now());
        self.latest = Some(sample);
        sample
    }

    pub fn is_supported(&self) -> bool {
        self.supported
    }

    pub fn latest(&self) -> Option<HeadingSample> {
        self.latest
    }
}
