//! Orientation capability: a push feed of raw device orientation events.

use crate::error::{QiblaError, Result};
use crate::heading::RawOrientationEvent;
use crate::subscription::Subscription;

/// Receives each raw orientation event exactly once.
pub type OrientationSink = Box<dyn FnMut(RawOrientationEvent) + Send>;

pub trait OrientationCapability {
    /// Start delivering events to `sink`. Fails with `OrientationUnavailable`
    /// when the platform has no usable orientation sensor.
    fn subscribe(&self, sink: OrientationSink) -> Result<Subscription>;
}

/// Stand-in for platforms without an orientation sensor.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOrientation;

impl OrientationCapability for NoOrientation {
    fn subscribe(&self, _sink: OrientationSink) -> Result<Subscription> {
        Err(QiblaError::OrientationUnavailable(
            "no orientation sensor on this platform".into(),
        ))
    }
}
