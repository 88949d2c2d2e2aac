// This file is only compiled during tests

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{LocationErrorCode, QiblaError, Result};
use crate::location::{LocationCapability, LocationFix, LocationOptions, LocationSink};
use crate::subscription::{Subscription, SubscriptionToken};

type Listener = (SubscriptionToken, LocationSink);

/// Location capability returning a scripted one-shot result and forwarding
/// pushed updates to a watcher.
#[derive(Clone)]
pub struct MockLocation {
    result: Arc<Mutex<std::result::Result<LocationFix, LocationErrorCode>>>,
    delay: Duration,
    calls: Arc<Mutex<u32>>,
    listener: Arc<Mutex<Option<Listener>>>,
}

impl MockLocation {
    pub fn with_fix(fix: LocationFix) -> Self {
        Self {
            result: Arc::new(Mutex::new(Ok(fix))),
            delay: Duration::ZERO,
            calls: Arc::default(),
            listener: Arc::default(),
        }
    }

    pub fn failing(code: LocationErrorCode) -> Self {
        Self {
            result: Arc::new(Mutex::new(Err(code))),
            delay: Duration::ZERO,
            calls: Arc::default(),
            listener: Arc::default(),
        }
    }

    /// Make `current_fix` block for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn set_result(&self, result: std::result::Result<LocationFix, LocationErrorCode>) {
        *self.result.lock() = result;
    }

    pub fn calls(&self) -> u32 {
        *self.calls.lock()
    }

    /// Push an update to the active watcher, if any.
    pub fn push(&self, update: Result<LocationFix>) -> bool {
        let mut listener = self.listener.lock();
        match listener.as_mut() {
            Some((token, sink)) if token.is_active() => {
                sink(update);
                true
            }
            _ => false,
        }
    }
}

impl LocationCapability for MockLocation {
    fn current_fix(&self, _options: &LocationOptions) -> Result<LocationFix> {
        *self.calls.lock() += 1;
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        let result = *self.result.lock();
        result.map_err(|code| QiblaError::location(code, "mock location failure"))
    }

    fn watch(&self, _options: &LocationOptions, sink: LocationSink) -> Result<Subscription> {
        let (subscription, token) = Subscription::new("mock-location");
        *self.listener.lock() = Some((token, sink));
        Ok(subscription)
    }
}
