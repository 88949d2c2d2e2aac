//! Start/stop lifecycle for push feeds (orientation events, location watch).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Handle owned by whoever started a feed. Stopping is idempotent and
/// dropping the handle stops the feed.
#[derive(Debug)]
pub struct Subscription {
    name: &'static str,
    active: Arc<AtomicBool>,
}

/// Producer-side view of a subscription. A producer must check
/// [`SubscriptionToken::is_active`] before delivering each event.
#[derive(Debug, Clone)]
pub struct SubscriptionToken {
    active: Arc<AtomicBool>,
}

impl Subscription {
    pub fn new(name: &'static str) -> (Self, SubscriptionToken) {
        let active = Arc::new(AtomicBool::new(true));
        debug!(feed = name, "subscription started");
        (
            Self {
                name,
                active: Arc::clone(&active),
            },
            SubscriptionToken { active },
        )
    }

    /// Stop delivery. Returns `true` only for the call that actually stopped
    /// the feed; repeated calls are no-ops.
    pub fn stop(&mut self) -> bool {
        let was_active = self.active.swap(false, Ordering::SeqCst);
        if was_active {
            debug!(feed = self.name, "subscription stopped");
        }
        was_active
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.stop();
    }
}

impl SubscriptionToken {
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}
