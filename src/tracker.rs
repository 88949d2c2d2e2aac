use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use tracing::{info, warn};

use crate::config::QiblaConfig;
use crate::error::{LocationFailure, Result};
use crate::heading::{HeadingSource, RawOrientationEvent};
use crate::location::{LocationCapability, LocationFix, LocationOptions};
use crate::orientation::OrientationCapability;
use crate::position::GeoCoordinate;
use crate::reconciler::{AlignmentReconciler, AlignmentSnapshot};
use crate::subscription::Subscription;

/// Published to every listener after each update.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackerEvent {
    Snapshot(AlignmentSnapshot),
    LocationFailed(LocationFailure),
    OrientationUnavailable,
}

struct TrackerState {
    reconciler: AlignmentReconciler,
    heading: HeadingSource,
    last_failure: Option<LocationFailure>,
    listeners: Vec<Sender<TrackerEvent>>,
}

impl TrackerState {
    fn publish(&mut self, event: TrackerEvent) {
        // a dropped receiver unsubscribes its listener
        self.listeners.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn publish_snapshot(&mut self) -> AlignmentSnapshot {
        let snapshot = self.reconciler.current_snapshot();
        self.publish(TrackerEvent::Snapshot(snapshot));
        snapshot
    }

    fn record_failure(&mut self, failure: LocationFailure) {
        warn!("location failed: {}", failure);
        self.last_failure = Some(failure.clone());
        self.publish(TrackerEvent::LocationFailed(failure));
    }
}

/// Shared entry point for location and heading feeds.
///
/// Every update takes one lock for the whole update, snapshot and publish
/// sequence, so location and heading updates never interleave. Acquiring a
/// fix happens outside the lock.
#[derive(Clone)]
pub struct QiblaTracker {
    state: Arc<Mutex<TrackerState>>,
}

impl Default for QiblaTracker {
    fn default() -> Self {
        Self::from_reconciler(AlignmentReconciler::default())
    }
}

impl QiblaTracker {
    pub fn new(reference: GeoCoordinate) -> Result<Self> {
        Ok(Self::from_reconciler(AlignmentReconciler::try_new(
            reference,
        )?))
    }

    pub fn from_config(config: &QiblaConfig) -> Result<Self> {
        config.validate()?;
        Self::new(config.reference)
    }

    fn from_reconciler(reconciler: AlignmentReconciler) -> Self {
        Self {
            state: Arc::new(Mutex::new(TrackerState {
                reconciler,
                heading: HeadingSource::new(),
                last_failure: None,
                listeners: Vec::new(),
            })),
        }
    }

    /// Register a listener. Events published from now on are delivered in
    /// update order.
    pub fn events(&self) -> Receiver<TrackerEvent> {
        let (tx, rx) = mpsc::channel();
        self.state.lock().listeners.push(tx);
        rx
    }

    pub fn snapshot(&self) -> AlignmentSnapshot {
        self.state.lock().reconciler.current_snapshot()
    }

    pub fn last_location_failure(&self) -> Option<LocationFailure> {
        self.state.lock().last_failure.clone()
    }

    pub fn heading_supported(&self) -> bool {
        self.state.lock().heading.is_supported()
    }

    pub fn update_location(&self, coord: GeoCoordinate) -> Result<AlignmentSnapshot> {
        self.update_fix(&LocationFix::new(coord))
    }

    /// Apply a fix. A rejected fix is reported to listeners and leaves the
    /// previous target untouched.
    pub fn update_fix(&self, fix: &LocationFix) -> Result<AlignmentSnapshot> {
        let mut state = self.state.lock();
        if let Err(e) = state.reconciler.on_location_fix(fix) {
            state.record_failure(e.to_failure());
            return Err(e);
        }
        state.last_failure = None;
        Ok(state.publish_snapshot())
    }

    pub fn push_orientation(&self, raw: &RawOrientationEvent) -> AlignmentSnapshot {
        let mut state = self.state.lock();
        let sample = state.heading.push(raw);
        state.reconciler.on_heading_update(sample);
        state.publish_snapshot()
    }

    /// Record a location failure without touching the current target.
    pub fn report_location_error(&self, failure: LocationFailure) {
        self.state.lock().record_failure(failure);
    }

    /// The orientation capability is gone for good: heading becomes
    /// permanently undefined.
    pub fn report_orientation_unavailable(&self) -> AlignmentSnapshot {
        let mut state = self.state.lock();
        let sample = state.heading.mark_unsupported();
        state.reconciler.on_heading_update(sample);
        state.publish(TrackerEvent::OrientationUnavailable);
        state.publish_snapshot()
    }

    /// Route an orientation feed into this tracker.
    pub fn start_heading(&self, orientation: &dyn OrientationCapability) -> Result<Subscription> {
        let tracker = self.clone();
        let subscribed = orientation.subscribe(Box::new(move |raw: RawOrientationEvent| {
            tracker.push_orientation(&raw);
        }));

        match subscribed {
            Ok(subscription) => {
                info!("heading feed started");
                Ok(subscription)
            }
            Err(e) => {
                warn!("heading feed unavailable: {}", e);
                self.report_orientation_unavailable();
                Err(e)
            }
        }
    }

    /// Acquire one fix on the calling thread and apply it.
    pub fn locate(
        &self,
        location: &dyn LocationCapability,
        options: &LocationOptions,
    ) -> Result<AlignmentSnapshot> {
        match location.current_fix(options) {
            Ok(fix) => {
                info!("location fix {}", fix);
                self.update_fix(&fix)
            }
            Err(e) => {
                self.report_location_error(e.to_failure());
                Err(e)
            }
        }
    }

    /// Acquire one fix on a background thread so a slow fix never holds up
    /// the heading stream. Call again to refresh.
    pub fn locate_once(
        &self,
        location: Arc<dyn LocationCapability>,
        options: LocationOptions,
    ) -> JoinHandle<Result<AlignmentSnapshot>> {
        let tracker = self.clone();
        thread::spawn(move || tracker.locate(location.as_ref(), &options))
    }

    /// Follow the device's position until the returned subscription stops.
    pub fn track_location(
        &self,
        location: &dyn LocationCapability,
        options: &LocationOptions,
    ) -> Result<Subscription> {
        let tracker = self.clone();
        let subscription = location.watch(
            options,
            Box::new(move |update: Result<LocationFix>| match update {
                Ok(fix) => {
                    // rejection is already reported to listeners
                    let _ = tracker.update_fix(&fix);
                }
                Err(e) => tracker.report_location_error(e.to_failure()),
            }),
        )?;
        info!("location tracking started");
        Ok(subscription)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KAABA;
    use crate::error::{LocationErrorCode, QiblaError};
    use crate::heading::HeadingSourceKind;
    use crate::mocks::{MockLocation, MockOrientation};
    use std::time::Duration;

    fn london_fix() -> LocationFix {
        LocationFix::new(GeoCoordinate::new(51.5074, -0.1278)).with_accuracy(12.0)
    }

    fn next_snapshot(rx: &Receiver<TrackerEvent>) -> AlignmentSnapshot {
        loop {
            match rx.recv_timeout(Duration::from_secs(2)) {
                Ok(TrackerEvent::Snapshot(snapshot)) => return snapshot,
                Ok(_) => continue,
                Err(e) => panic!("no snapshot published: {}", e),
            }
        }
    }

    #[test]
    fn test_tracker_initialization() {
        let tracker = QiblaTracker::default();
        assert!(tracker.snapshot().is_pending());
        assert!(tracker.snapshot().target_bearing.is_none());
        assert!(tracker.last_location_failure().is_none());
        assert!(tracker.heading_supported());

        assert!(QiblaTracker::new(GeoCoordinate::new(0.0, 181.0)).is_err());
    }

    #[test]
    fn test_every_update_is_published() {
        let tracker = QiblaTracker::default();
        let rx = tracker.events();

        tracker.push_orientation(&RawOrientationEvent::from_compass(100.0, true));
        let snapshot = next_snapshot(&rx);
        assert_eq!(snapshot.current_heading, Some(100.0));
        assert!(snapshot.target_bearing.is_none());

        tracker.update_fix(&london_fix()).unwrap();
        let snapshot = next_snapshot(&rx);
        assert!(snapshot.target_bearing.is_some());
        assert!(snapshot.signed_deviation.is_some());
        assert_eq!(snapshot.accuracy, Some(12.0));
    }

    #[test]
    fn test_dropped_listener_is_removed() {
        let tracker = QiblaTracker::default();
        let rx = tracker.events();
        drop(rx);

        tracker.update_location(KAABA).unwrap();
        assert!(tracker.state.lock().listeners.is_empty());
    }

    #[test]
    fn test_heading_feed_delivery_and_stop() {
        let tracker = QiblaTracker::default();
        let orientation = MockOrientation::new();
        let mut subscription = tracker.start_heading(&orientation).unwrap();

        assert!(orientation.emit(RawOrientationEvent::from_alpha(90.0)));
        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.current_heading, Some(270.0));
        assert_eq!(
            snapshot.heading_source,
            Some(HeadingSourceKind::MagneticUncalibrated)
        );

        assert!(subscription.stop());
        assert!(!subscription.stop());

        // nothing delivered after stop
        assert!(!orientation.emit(RawOrientationEvent::from_alpha(0.0)));
        assert_eq!(tracker.snapshot().current_heading, Some(270.0));
    }

    #[test]
    fn test_missing_orientation_is_permanent() {
        let tracker = QiblaTracker::default();
        let rx = tracker.events();

        let result = tracker.start_heading(&MockOrientation::unsupported());
        assert!(matches!(result, Err(QiblaError::OrientationUnavailable(_))));
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(1)).unwrap(),
            TrackerEvent::OrientationUnavailable
        );
        assert!(!tracker.heading_supported());

        tracker.push_orientation(&RawOrientationEvent::from_compass(10.0, true));
        tracker.update_fix(&london_fix()).unwrap();
        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.current_heading, None);
        assert_eq!(snapshot.signed_deviation, None);
        assert!(snapshot.target_bearing.is_some());
    }

    #[test]
    fn test_locate_failure_keeps_prior_state() {
        let tracker = QiblaTracker::default();
        tracker.update_fix(&london_fix()).unwrap();
        tracker.push_orientation(&RawOrientationEvent::from_compass(90.0, true));
        let before = tracker.snapshot();

        let rx = tracker.events();
        let location = MockLocation::failing(LocationErrorCode::Timeout);
        let result = tracker.locate(&location, &LocationOptions::default());

        match result {
            Err(QiblaError::LocationUnavailable { code, .. }) => {
                assert_eq!(code, LocationErrorCode::Timeout)
            }
            other => panic!("expected LocationUnavailable, got {:?}", other),
        }
        // reported once, not retried
        assert_eq!(location.calls(), 1);
        match rx.recv_timeout(Duration::from_secs(1)).unwrap() {
            TrackerEvent::LocationFailed(failure) => {
                assert_eq!(failure.code, LocationErrorCode::Timeout)
            }
            other => panic!("expected LocationFailed, got {:?}", other),
        }
        assert_eq!(tracker.snapshot(), before);
        assert!(tracker.last_location_failure().is_some());

        // a later success clears the failure
        location.set_result(Ok(london_fix()));
        tracker.locate(&location, &LocationOptions::default()).unwrap();
        assert!(tracker.last_location_failure().is_none());
    }

    #[test]
    fn test_invalid_fix_is_rejected() {
        let tracker = QiblaTracker::default();
        let rx = tracker.events();

        let result = tracker.update_location(GeoCoordinate::new(-95.0, 0.0));
        assert!(matches!(result, Err(QiblaError::InvalidCoordinate { .. })));
        match rx.recv_timeout(Duration::from_secs(1)).unwrap() {
            // distinguishable from a receiver outage
            TrackerEvent::LocationFailed(failure) => {
                assert_eq!(failure.code, LocationErrorCode::InvalidCoordinate)
            }
            other => panic!("expected LocationFailed, got {:?}", other),
        }
        assert_eq!(
            tracker.last_location_failure().map(|f| f.code),
            Some(LocationErrorCode::InvalidCoordinate)
        );
        assert!(tracker.snapshot().target_bearing.is_none());
    }

    #[test]
    fn test_slow_fix_does_not_block_heading() {
        let tracker = QiblaTracker::default();
        let location: Arc<dyn LocationCapability> =
            Arc::new(MockLocation::with_fix(london_fix()).with_delay(Duration::from_millis(300)));

        let handle = tracker.locate_once(location, LocationOptions::default());

        // heading updates go through while the fix is still pending
        for i in 0..10 {
            let snapshot =
                tracker.push_orientation(&RawOrientationEvent::from_compass(i as f64, true));
            assert_eq!(snapshot.current_heading, Some(i as f64));
        }
        assert!(!handle.is_finished());

        let snapshot = handle.join().unwrap().unwrap();
        assert!(snapshot.target_bearing.is_some());
        assert_eq!(snapshot.current_heading, Some(9.0));
        assert!(snapshot.signed_deviation.is_some());
    }

    #[test]
    fn test_location_tracking_lifecycle() {
        let tracker = QiblaTracker::default();
        let rx = tracker.events();
        let location = MockLocation::failing(LocationErrorCode::PositionUnavailable);
        let mut subscription = tracker
            .track_location(&location, &LocationOptions::default())
            .unwrap();

        assert!(location.push(Ok(london_fix())));
        let first = next_snapshot(&rx);
        assert!((first.target_bearing.unwrap() - 118.98722399197209).abs() < 1e-6);

        assert!(location.push(Ok(LocationFix::new(GeoCoordinate::new(0.0, 0.0)))));
        let second = next_snapshot(&rx);
        assert!((second.target_bearing.unwrap() - 58.508227348881576).abs() < 1e-9);

        assert!(location.push(Err(QiblaError::location(
            LocationErrorCode::PermissionDenied,
            "revoked"
        ))));
        assert_eq!(
            tracker.last_location_failure().map(|f| f.code),
            Some(LocationErrorCode::PermissionDenied)
        );
        assert_eq!(tracker.snapshot().target_bearing, second.target_bearing);

        assert!(subscription.stop());
        assert!(!subscription.stop());
        assert!(!location.push(Ok(london_fix())));
        assert_eq!(tracker.snapshot().target_bearing, second.target_bearing);
    }
}
