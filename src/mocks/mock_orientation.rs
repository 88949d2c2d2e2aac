// This file is only compiled during tests

use parking_lot::Mutex;
use std::sync::Arc;

use crate::error::{QiblaError, Result};
use crate::heading::RawOrientationEvent;
use crate::orientation::{OrientationCapability, OrientationSink};
use crate::subscription::{Subscription, SubscriptionToken};

type Listener = (SubscriptionToken, OrientationSink);

/// Orientation feed driven by the test through `emit`.
#[derive(Clone)]
pub struct MockOrientation {
    supported: bool,
    listener: Arc<Mutex<Option<Listener>>>,
}

impl MockOrientation {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            supported: true,
            listener: Arc::default(),
        }
    }

    pub fn unsupported() -> Self {
        Self {
            supported: false,
            listener: Arc::default(),
        }
    }

    /// Deliver one event. Returns whether a live subscriber received it.
    pub fn emit(&self, event: RawOrientationEvent) -> bool {
        let mut listener = self.listener.lock();
        match listener.as_mut() {
            Some((token, sink)) if token.is_active() => {
                sink(event);
                true
            }
            _ => false,
        }
    }
}

impl OrientationCapability for MockOrientation {
    fn subscribe(&self, sink: OrientationSink) -> Result<Subscription> {
        if !self.supported {
            return Err(QiblaError::OrientationUnavailable(
                "mock sensor absent".into(),
            ));
        }
        let (subscription, token) = Subscription::new("mock-orientation");
        *self.listener.lock() = Some((token, sink));
        Ok(subscription)
    }
}
