use serde::Serialize;

use crate::config::CompassConfig;
use crate::geodesy::normalize_degrees;

/// Heading in degrees clockwise from north for a raw horizontal magnetometer
/// reading, after hard iron correction and the mounting offset.
pub fn heading_from_field(x_raw: f64, y_raw: f64, config: &CompassConfig) -> f64 {
    // Apply hard iron calibration (center the readings)
    let x = x_raw - config.x_offset;
    let y = y_raw - config.y_offset;

    normalize_degrees(y.atan2(x).to_degrees() + config.heading_offset)
}

/// Tracks the extent of raw X/Y readings while the board is rotated a full
/// turn. The center of that extent is the hard iron offset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HardIronCalibration {
    x_min: f64,
    x_max: f64,
    y_min: f64,
    y_max: f64,
    samples: usize,
}

/// Offsets ready to be pasted into the `compass` section of a config file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HardIronOffsets {
    pub x_offset: f64,
    pub y_offset: f64,
}

impl Default for HardIronCalibration {
    fn default() -> Self {
        Self {
            x_min: f64::MAX,
            x_max: f64::MIN,
            y_min: f64::MAX,
            y_max: f64::MIN,
            samples: 0,
        }
    }
}

impl HardIronCalibration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one reading. Non-finite values are ignored.
    pub fn add_sample(&mut self, x: f64, y: f64) {
        if !x.is_finite() || !y.is_finite() {
            return;
        }
        self.x_min = self.x_min.min(x);
        self.x_max = self.x_max.max(x);
        self.y_min = self.y_min.min(y);
        self.y_max = self.y_max.max(y);
        self.samples += 1;
    }

    pub fn samples(&self) -> usize {
        self.samples
    }

    pub fn x_range(&self) -> Option<(f64, f64)> {
        (self.samples > 0).then_some((self.x_min, self.x_max))
    }

    pub fn y_range(&self) -> Option<(f64, f64)> {
        (self.samples > 0).then_some((self.y_min, self.y_max))
    }

    pub fn offsets(&self) -> Option<HardIronOffsets> {
        if self.samples == 0 {
            return None;
        }
        Some(HardIronOffsets {
            x_offset: (self.x_min + self.x_max) / 2.0,
            y_offset: (self.y_min + self.y_max) / 2.0,
        })
    }

    /// Apply the collected offsets to a compass configuration.
    pub fn apply_to(&self, config: &mut CompassConfig) -> bool {
        match self.offsets() {
            Some(offsets) => {
                config.x_offset = offsets.x_offset;
                config.y_offset = offsets.y_offset;
                true
            }
            None => false,
        }
    }
}
