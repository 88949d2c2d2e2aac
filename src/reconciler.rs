//! Fuses the cached target bearing with the live heading.
//!
//! The bearing toward the reference point only changes when the device moves,
//! so it is recomputed on location updates and cached. Heading changes many
//! times a second; every snapshot derives deviation and rotation afresh from
//! the latest bearing and heading, so nothing accumulates across updates.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::compass::{CompassResolution, Direction};
use crate::config::KAABA;
use crate::error::Result;
use crate::geodesy::{self, Bearing, Distance, normalize_degrees, normalize_signed_degrees};
use crate::heading::{HeadingSample, HeadingSourceKind};
use crate::location::LocationFix;
use crate::position::GeoCoordinate;

/// Which way to turn to face the reference point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Guidance {
    TurnLeft,
    TurnRight,
    Aligned,
}

/// What the renderer gets. `None` means "still calculating", never zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlignmentSnapshot {
    /// Device position behind `target_bearing`
    pub location: Option<GeoCoordinate>,
    /// Bearing from the device to the reference, [0, 360)
    pub target_bearing: Option<f64>,
    /// The device sits on (or opposite) the reference point
    pub degenerate: bool,
    /// Normalized device heading, [0, 360)
    pub current_heading: Option<f64>,
    pub heading_source: Option<HeadingSourceKind>,
    /// `target_bearing - current_heading` in (-180, 180]; positive means the
    /// target lies clockwise of where the device points
    pub signed_deviation: Option<f64>,
    /// The same angle in [0, 360), for dial rotation
    pub rotation: Option<f64>,
    /// Great-circle distance to the reference, meters
    pub distance: Option<f64>,
    /// Accuracy radius of the fix behind `target_bearing`, meters
    pub accuracy: Option<f64>,
}

impl AlignmentSnapshot {
    /// Nothing can be drawn yet.
    pub fn is_pending(&self) -> bool {
        self.signed_deviation.is_none()
    }

    pub fn target_direction(&self, resolution: CompassResolution) -> Option<Direction> {
        if self.degenerate {
            return None;
        }
        self.target_bearing
            .map(|bearing| Direction::from_bearing(bearing, resolution))
    }

    /// Turn hint; within `tolerance` degrees of the target counts as aligned.
    pub fn guidance(&self, tolerance: f64) -> Option<Guidance> {
        let deviation = self.signed_deviation?;
        Some(if deviation.abs() <= tolerance {
            Guidance::Aligned
        } else if deviation > 0.0 {
            Guidance::TurnRight
        } else {
            Guidance::TurnLeft
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct TargetSolution {
    bearing: Bearing,
    distance: Distance,
}

/// `target - heading`, normalized into (-180, 180].
pub fn signed_deviation(target_bearing: f64, heading: f64) -> f64 {
    normalize_signed_degrees(target_bearing - heading)
}

/// `target - heading`, normalized into [0, 360).
pub fn dial_rotation(target_bearing: f64, heading: f64) -> f64 {
    normalize_degrees(target_bearing - heading)
}

/// Reconciles location fixes and heading samples against one fixed
/// reference coordinate.
#[derive(Debug, Clone)]
pub struct AlignmentReconciler {
    reference: GeoCoordinate,
    origin: Option<GeoCoordinate>,
    target: Option<TargetSolution>,
    accuracy: Option<f64>,
    heading: Option<HeadingSample>,
}

impl Default for AlignmentReconciler {
    fn default() -> Self {
        Self::new(KAABA)
    }
}

impl AlignmentReconciler {
    /// `reference` must already be valid; see [`AlignmentReconciler::try_new`].
    pub fn new(reference: GeoCoordinate) -> Self {
        Self {
            reference,
            origin: None,
            target: None,
            accuracy: None,
            heading: None,
        }
    }

    pub fn try_new(reference: GeoCoordinate) -> Result<Self> {
        reference.validate()?;
        Ok(Self::new(reference))
    }

    pub fn reference(&self) -> GeoCoordinate {
        self.reference
    }

    pub fn last_location(&self) -> Option<GeoCoordinate> {
        self.origin
    }

    pub fn last_heading(&self) -> Option<HeadingSample> {
        self.heading
    }

    /// Recompute the target solution from a new device position.
    ///
    /// An invalid coordinate is rejected and leaves the previous state intact.
    pub fn on_location_update(&mut self, coord: GeoCoordinate) -> Result<()> {
        let bearing = match geodesy::bearing(&coord, &self.reference) {
            Ok(bearing) => bearing,
            Err(e) => {
                warn!("rejecting location update {}: {}", coord, e);
                return Err(e);
            }
        };
        let distance = geodesy::distance(&coord, &self.reference)?;

        if bearing.degenerate {
            warn!("device is at the reference point or its antipode, bearing undefined");
        }
        if self.origin != Some(coord) {
            info!("target bearing {} at {} from {}", bearing, distance, coord);
        }

        self.origin = Some(coord);
        self.target = Some(TargetSolution { bearing, distance });
        self.accuracy = None;
        Ok(())
    }

    /// As [`on_location_update`](Self::on_location_update), also keeping the
    /// fix's accuracy for display.
    pub fn on_location_fix(&mut self, fix: &LocationFix) -> Result<()> {
        self.on_location_update(fix.coordinate)?;
        self.accuracy = fix.accuracy.filter(|a| a.is_finite() && *a >= 0.0);
        Ok(())
    }

    pub fn on_heading_update(&mut self, sample: HeadingSample) {
        if sample.source == HeadingSourceKind::Unavailable
            && self.heading.is_some_and(|h| h.is_available())
        {
            debug!("heading lost");
        }
        self.heading = Some(sample);
    }

    /// Project current state. Calling this twice without an update in
    /// between gives identical results.
    pub fn current_snapshot(&self) -> AlignmentSnapshot {
        let target_bearing = self.target.map(|t| t.bearing.degrees);
        let current_heading = self
            .heading
            .and_then(|h| h.heading())
            .map(normalize_degrees);

        let (signed_deviation, rotation) = match (target_bearing, current_heading) {
            (Some(target), Some(heading)) => (
                Some(signed_deviation(target, heading)),
                Some(dial_rotation(target, heading)),
            ),
            _ => (None, None),
        };

        AlignmentSnapshot {
            location: self.origin,
            target_bearing,
            degenerate: self.target.is_some_and(|t| t.bearing.degenerate),
            current_heading,
            heading_source: self.heading.map(|h| h.source),
            signed_deviation,
            rotation,
            distance: self.target.map(|t| t.distance.meters()),
            accuracy: self.accuracy,
        }
    }
}
