use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::compass::CompassResolution;
use crate::error::{QiblaError, Result};
use crate::location::LocationOptions;
use crate::position::GeoCoordinate;

// ** REFERENCE CONFIGURATION ** //

/// The Kaaba in Mecca.
pub const KAABA: GeoCoordinate = GeoCoordinate::new(21.422487, 39.826206);

/// Deviation (degrees) within which the device counts as facing the target.
pub const ALIGNMENT_TOLERANCE_DEGREES: f64 = 2.0;

// ** LOCATION CONFIGURATION ** //

pub const LOCATION_TIMEOUT_MS: u64 = 5000;
/// Zero means a cached fix is never reused.
pub const LOCATION_MAXIMUM_AGE_MS: u64 = 0;

/// Serial device the GPS receiver writes NMEA sentences to.
pub const GPS_DEVICE: &str = "/dev/serial0";
/// Nominal user-equivalent range error (meters) used to turn HDOP into an
/// accuracy radius.
pub const GPS_RANGE_ERROR_M: f64 = 5.0;

// ** COMPASS CONFIGURATION ** //

pub const LIS3MDL_ADDR: u16 = 0x1C;
// Magnetometer calibration offsets (hard iron correction)
// Obtained from calibration: rotate board 360° and record min/max X,Y values
pub const X_OFFSET: f64 = -2776.0; // (X_min + X_max) / 2
pub const Y_OFFSET: f64 = 2556.0; // (Y_min + Y_max) / 2
pub const HEADING_OFFSET: f64 = 88.0; // Overall heading correction for this location
pub const COMPASS_POLL_INTERVAL_MS: u64 = 50; // 20Hz

// ** DISPLAY CONFIGURATION ** //

pub const STATUS_UPDATE_INTERVAL_SECS: u64 = 1;

/// Top-level runtime configuration, loadable from JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QiblaConfig {
    /// Target landmark
    pub reference: GeoCoordinate,
    pub location: LocationConfig,
    pub gps: GpsConfig,
    pub compass: CompassConfig,
    pub alignment_tolerance_deg: f64,
    pub direction_resolution: CompassResolution,
}

impl Default for QiblaConfig {
    fn default() -> Self {
        Self {
            reference: KAABA,
            location: LocationConfig::default(),
            gps: GpsConfig::default(),
            compass: CompassConfig::default(),
            alignment_tolerance_deg: ALIGNMENT_TOLERANCE_DEGREES,
            direction_resolution: CompassResolution::Sixteen,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationConfig {
    pub timeout_ms: u64,
    pub maximum_age_ms: u64,
    /// Keep tracking after the first fix instead of locating once
    pub continuous: bool,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            timeout_ms: LOCATION_TIMEOUT_MS,
            maximum_age_ms: LOCATION_MAXIMUM_AGE_MS,
            continuous: false,
        }
    }
}

impl LocationConfig {
    pub fn options(&self) -> LocationOptions {
        LocationOptions {
            timeout: Duration::from_millis(self.timeout_ms),
            maximum_age: Duration::from_millis(self.maximum_age_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GpsConfig {
    pub device: PathBuf,
    pub range_error_m: f64,
}

impl Default for GpsConfig {
    fn default() -> Self {
        Self {
            device: PathBuf::from(GPS_DEVICE),
            range_error_m: GPS_RANGE_ERROR_M,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompassConfig {
    pub i2c_address: u16,
    pub x_offset: f64,
    pub y_offset: f64,
    pub heading_offset: f64,
    pub poll_interval_ms: u64,
}

impl Default for CompassConfig {
    fn default() -> Self {
        Self {
            i2c_address: LIS3MDL_ADDR,
            x_offset: X_OFFSET,
            y_offset: Y_OFFSET,
            heading_offset: HEADING_OFFSET,
            poll_interval_ms: COMPASS_POLL_INTERVAL_MS,
        }
    }
}

impl QiblaConfig {
    /// Load and validate a JSON configuration file. Missing fields take
    /// their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let config: QiblaConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.reference.validate()?;

        if self.location.timeout_ms == 0 {
            return Err(QiblaError::Config(
                "location.timeout_ms must be greater than zero".into(),
            ));
        }
        if !self.alignment_tolerance_deg.is_finite()
            || !(0.0..180.0).contains(&self.alignment_tolerance_deg)
        {
            return Err(QiblaError::Config(format!(
                "alignment_tolerance_deg must be in [0, 180), got {}",
                self.alignment_tolerance_deg
            )));
        }
        if !self.gps.range_error_m.is_finite() || self.gps.range_error_m <= 0.0 {
            return Err(QiblaError::Config(format!(
                "gps.range_error_m must be positive, got {}",
                self.gps.range_error_m
            )));
        }
        if self.compass.poll_interval_ms == 0 {
            return Err(QiblaError::Config(
                "compass.poll_interval_ms must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}
