pub mod calibration;
pub mod compass;
#[cfg(feature = "rpi")]
pub mod compass_sensor;
pub mod config;
pub mod error;
pub mod geodesy;
pub mod heading;
pub mod location;
pub mod nmea_source;
pub mod orientation;
pub mod position;
pub mod reconciler;
pub mod subscription;
pub mod tracker;

// Re-export commonly used types
pub use config::QiblaConfig;
pub use error::{QiblaError, Result};
pub use heading::{HeadingSample, HeadingSource, HeadingSourceKind, RawOrientationEvent};
pub use location::{LocationCapability, LocationFix, LocationOptions};
pub use orientation::OrientationCapability;
pub use position::GeoCoordinate;
pub use reconciler::{AlignmentReconciler, AlignmentSnapshot, Guidance};
pub use tracker::{QiblaTracker, TrackerEvent};

#[cfg(test)]
pub(crate) mod mocks;
