//! Tests for the LocationSession module

use super::*;
use crate::domain::geo::offset_m;
use crate::domain::types::{Coordinate, RiskGrade, Severity};
use crate::infra::clock::{ManualClock, SeededRandom};
use crate::io::buddy::BuddyMatcher;
use crate::io::error_report::ErrorLog;
use crate::io::notifier::{create_notification_channel, Notification};
use crate::io::positioning::{PushSource, UnavailableSource};
use crate::io::zone_catalog::StaticZoneCatalog;
use crate::services::escalation::create_buddy_worker;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Records every zone the worker asks a buddy for
#[derive(Default)]
struct RecordingMatcher {
    zones: Mutex<Vec<String>>,
}

#[async_trait]
impl BuddyMatcher for RecordingMatcher {
    async fn request_match(&self, zone: &Zone) -> anyhow::Result<()> {
        self.zones.lock().push(zone.id.to_string());
        Ok(())
    }
}

/// Never answers the one-shot fix
struct StalledSource;

#[async_trait]
impl PositionSource for StalledSource {
    async fn current_position(&self, _options: &PositionOptions) -> FeedItem {
        std::future::pending().await
    }

    fn watch(&self, _options: &PositionOptions) -> Result<Subscription, PositionError> {
        Err(PositionError::PositionUnavailable("stalled".to_string()))
    }
}

/// Grants a fix but cannot open the live stream
struct FixOnlySource;

#[async_trait]
impl PositionSource for FixOnlySource {
    async fn current_position(&self, _options: &PositionOptions) -> FeedItem {
        Ok(origin())
    }

    fn watch(&self, _options: &PositionOptions) -> Result<Subscription, PositionError> {
        Err(PositionError::PositionUnavailable("no provider".to_string()))
    }
}

/// Test harness that keeps collaborator receivers alive
struct TestSession {
    session: LocationSession,
    clock: ManualClock,
    errors: Arc<ErrorLog>,
    metrics: Arc<Metrics>,
    notifications: mpsc::Receiver<Notification>,
    matcher: Arc<RecordingMatcher>,
    worker: JoinHandle<()>,
}

impl std::ops::Deref for TestSession {
    type Target = LocationSession;
    fn deref(&self) -> &Self::Target {
        &self.session
    }
}

impl std::ops::DerefMut for TestSession {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.session
    }
}

impl TestSession {
    /// Drop the session and wait for the buddy worker to drain
    async fn finish(self) -> Vec<String> {
        let TestSession { session, matcher, worker, .. } = self;
        drop(session);
        worker.await.unwrap();
        let zones = matcher.zones.lock().clone();
        zones
    }

    fn kinds(&self) -> Vec<(AlertKind, Severity)> {
        self.alerts().map(|a| (a.kind, a.severity)).collect()
    }
}

/// Builder for test sessions
struct SessionBuilder {
    config: Config,
    source: Arc<dyn PositionSource>,
    zones: Vec<Zone>,
    start_ms: u64,
}

impl SessionBuilder {
    fn new() -> Self {
        Self {
            config: Config::default(),
            source: Arc::new(UnavailableSource::new(PositionError::PermissionDenied)),
            zones: vec![zone_c()],
            start_ms: 0,
        }
    }

    fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    fn with_source(mut self, source: Arc<dyn PositionSource>) -> Self {
        self.source = source;
        self
    }

    fn with_zones(mut self, zones: Vec<Zone>) -> Self {
        self.zones = zones;
        self
    }

    fn build(self) -> TestSession {
        let clock = ManualClock::new(self.start_ms);
        let errors = Arc::new(ErrorLog::new());
        let metrics = Arc::new(Metrics::new());
        let (notifier, notifications) = create_notification_channel(256, metrics.clone());
        let matcher = Arc::new(RecordingMatcher::default());
        let (buddy, worker) = create_buddy_worker(matcher.clone(), errors.clone(), metrics.clone(), 64);
        let worker = tokio::spawn(worker.run());

        let collaborators = Collaborators::new(self.source, Arc::new(notifier), errors.clone(), buddy, metrics.clone())
            .with_clock(Arc::new(clock.clone()))
            .with_random(Box::new(SeededRandom::new(42)));
        let mut session = LocationSession::new(self.config, collaborators);
        session.replace_zones(self.zones);

        TestSession { session, clock, errors, metrics, notifications, matcher, worker }
    }
}

fn zone_c() -> Zone {
    Zone::new("Z1", "Zone One", Coordinate::new(0.0, 0.0), 500.0, RiskGrade::C)
}

fn zone_a() -> Zone {
    Zone::new("ZA", "Safe Zone", Coordinate::new(0.0, 0.0), 500.0, RiskGrade::A)
}

fn sample_at(lat: f64, lng: f64) -> LocationSample {
    LocationSample::new(Coordinate::new(lat, lng), 5.0, 0)
}

fn origin() -> LocationSample {
    sample_at(0.0, 0.0)
}

fn far_away() -> LocationSample {
    // ~1.1 km north of the origin
    sample_at(0.01, 0.0)
}

// ============================================================================
// Pipeline
// ============================================================================

#[tokio::test]
async fn test_reference_scenario_via_live_feed() {
    let (source, tx) = PushSource::new(Ok(origin()));
    let mut t = SessionBuilder::new().with_source(Arc::new(source)).build();

    assert!(t.start_tracking().await);
    assert_eq!(t.phase(), SessionPhase::Tracking);
    assert_eq!(t.permission(), PermissionStatus::Granted);

    t.clock.set(70_000);
    tx.send(Ok(far_away())).await.unwrap();
    assert!(t.pump().await);

    assert_eq!(
        t.kinds(),
        vec![
            (AlertKind::Entry, Severity::High),
            (AlertKind::BuddyRequest, Severity::High),
            (AlertKind::Exit, Severity::Low),
        ]
    );
    assert_eq!(t.buddy_requests(), 1);
    assert!(t.active_zones().is_empty());
    assert!(!t.is_in_danger_zone());
    assert_eq!(t.current_sample().map(|s| s.coordinate), Some(far_away().coordinate));

    // Every alert is handed to the notifier
    let mut delivered = 0;
    while t.notifications.try_recv().is_ok() {
        delivered += 1;
    }
    assert_eq!(delivered, 3);

    assert_eq!(t.finish().await, vec!["Z1"]);
}

#[tokio::test]
async fn test_reentry_within_cooldown_yields_single_entry() {
    let mut t = SessionBuilder::new().build();

    t.process_sample(origin());
    t.clock.set(20_000);
    t.process_sample(far_away());
    t.clock.set(40_000);
    t.process_sample(origin());

    let entries = t.alerts().filter(|a| a.kind == AlertKind::Entry).count();
    let exits = t.alerts().filter(|a| a.kind == AlertKind::Exit).count();
    assert_eq!(entries, 1);
    assert_eq!(exits, 0);
    assert_eq!(t.buddy_requests(), 1);
    assert_eq!(t.metrics.suppressed_total(), 2);
    // Membership stays accurate even though alerts were suppressed
    assert_eq!(t.active_zones().len(), 1);
    assert!(t.is_in_danger_zone());
}

#[tokio::test]
async fn test_safe_zone_never_escalates() {
    let mut t = SessionBuilder::new().with_zones(vec![zone_a()]).build();

    let alerts = t.process_sample(origin());

    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].kind, AlertKind::Entry);
    assert_eq!(alerts[0].severity, Severity::Low);
    assert_eq!(t.buddy_requests(), 0);
    assert!(!t.is_in_danger_zone());
    assert!(t.finish().await.is_empty());
}

#[tokio::test]
async fn test_sample_just_inside_radius_alerts() {
    let zone = Zone::new("EDGE", "Edge", Coordinate::new(40.7209, -73.9896), 500.0, RiskGrade::B);
    let mut t = SessionBuilder::new().with_zones(vec![zone.clone()]).build();

    let edge = offset_m(zone.centroid, 499.9, 0.0);
    let alerts = t.process_sample(LocationSample::new(edge, 5.0, 0));

    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].severity, Severity::Medium);
}

#[tokio::test]
async fn test_alert_log_is_bounded() {
    let config = Config::default().with_cooldown_ms(0).with_alert_log_capacity(20);
    let mut t = SessionBuilder::new().with_config(config).with_zones(vec![zone_a()]).build();

    let mut first_id = None;
    for i in 0..21u64 {
        t.clock.set(i + 1);
        let sample = if i % 2 == 0 { origin() } else { far_away() };
        let alerts = t.process_sample(sample);
        assert_eq!(alerts.len(), 1);
        if first_id.is_none() {
            first_id = Some(alerts[0].id.clone());
        }
    }

    assert_eq!(t.alert_count(), 20);
    let first_id = first_id.unwrap();
    assert!(t.alerts().all(|a| a.id != first_id));
}

#[tokio::test]
async fn test_no_zones_means_no_active_zones() {
    let mut t = SessionBuilder::new().with_zones(vec![]).build();
    let alerts = t.process_sample(origin());
    assert!(alerts.is_empty());
    assert!(t.active_zones().is_empty());
    assert_eq!(t.metrics.samples_total(), 1);
}

#[tokio::test]
async fn test_zone_dropped_from_catalog_leaves_silently() {
    let mut t = SessionBuilder::new().build();
    t.process_sample(origin());
    assert_eq!(t.active_zones().len(), 1);

    t.replace_zones(vec![zone_a()]);
    t.clock.set(120_000);
    let alerts = t.process_sample(origin());

    // Z1 leaves without an exit alert; ZA is entered fresh
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].zone.id.as_str(), "ZA");
    assert_eq!(t.active_zones().len(), 1);
    assert_eq!(t.active_zones()[0].id.as_str(), "ZA");
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_late_sample_after_stop_is_ignored() {
    let (source, tx) = PushSource::new(Ok(far_away()));
    let mut t = SessionBuilder::new().with_source(Arc::new(source)).build();

    assert!(t.start_tracking().await);
    let generation = t.feed_generation();
    t.stop_tracking();

    assert_eq!(t.phase(), SessionPhase::Idle);
    assert!(!t.has_feed());
    // The cancelled subscription refuses new samples
    assert!(tx.send(Ok(origin())).await.is_err());

    // An item already in flight from the old feed changes nothing
    t.apply_feed_item(generation, Some(Ok(origin())));
    assert_eq!(t.alert_count(), 0);
    assert!(t.active_zones().is_empty());
    assert_eq!(t.current_sample().map(|s| s.coordinate), Some(far_away().coordinate));
}

#[tokio::test]
async fn test_stop_keeps_alerts_and_counters() {
    let (source, _tx) = PushSource::new(Ok(origin()));
    let mut t = SessionBuilder::new().with_source(Arc::new(source)).build();

    t.start_tracking().await;
    t.stop_tracking();

    assert_eq!(t.alert_count(), 2);
    assert_eq!(t.buddy_requests(), 1);
    assert_eq!(t.permission(), PermissionStatus::Granted);
}

#[tokio::test]
async fn test_denied_falls_back_to_demo_feed() {
    let demo_zone = Zone::new("DEMO", "Midtown", Coordinate::new(40.7589, -73.9851), 500.0, RiskGrade::D);
    let config = Config::default().with_demo(3, Duration::from_millis(5));
    let mut t = SessionBuilder::new().with_config(config).with_zones(vec![demo_zone]).build();

    assert!(!t.start_tracking().await);
    assert_eq!(t.phase(), SessionPhase::Denied);
    assert_eq!(t.permission(), PermissionStatus::Denied);
    assert!(t.is_demo_mode());

    // Anchor processed synchronously: entry + buddy request
    assert_eq!(t.alert_count(), 2);
    assert_eq!(t.buddy_requests(), 1);

    let errors = t.errors.by_category(ErrorCategory::Geolocation);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].details["code"], 1);
    assert!(!errors[0].details["suggestion"].as_str().unwrap().is_empty());
    assert_eq!(t.errors.by_category(ErrorCategory::Permission).len(), 1);

    // Drain the jittered walk; it stays well inside the zone
    while t.pump().await {}
    assert_eq!(t.metrics.samples_total(), 4);
    assert_eq!(t.alert_count(), 2);
    assert!(!t.has_feed());
    assert_eq!(t.phase(), SessionPhase::Denied);
}

#[tokio::test]
async fn test_stop_cancels_pending_demo_feed() {
    let config = Config::default().with_demo(5, Duration::from_secs(60));
    let mut t = SessionBuilder::new().with_config(config).build();

    t.start_tracking().await;
    assert!(t.has_feed());

    t.stop_tracking();
    assert!(!t.has_feed());
    assert!(!t.is_demo_mode());
    assert!(!t.pump().await);
    assert_eq!(t.metrics.samples_total(), 1);
}

#[tokio::test]
async fn test_initial_fix_timeout() {
    let config = Config::default().without_demo().with_initial_timeout(Duration::from_millis(20));
    let mut t = SessionBuilder::new().with_config(config).with_source(Arc::new(StalledSource)).build();

    assert!(!t.start_tracking().await);
    assert_eq!(t.phase(), SessionPhase::Denied);
    assert!(!t.has_feed());
    assert!(t.current_sample().is_none());

    // A timeout is not a refusal
    let logs = t.errors.logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].message, "Location request timed out");
    assert_eq!(logs[0].details["code"], 3);
}

#[tokio::test]
async fn test_unopenable_live_stream_is_not_tracking() {
    let mut t = SessionBuilder::new().with_source(Arc::new(FixOnlySource)).build();

    assert!(!t.start_tracking().await);
    assert_eq!(t.phase(), SessionPhase::Denied);
    assert!(!t.is_tracking());
    // The fix itself was granted and processed
    assert_eq!(t.permission(), PermissionStatus::Granted);
    assert_eq!(t.alert_count(), 2);
    assert!(!t.has_feed());
    assert!(!t.is_demo_mode());

    let logs = t.errors.logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].context.as_deref(), Some("watch_position"));

    t.stop_tracking();
    assert_eq!(t.phase(), SessionPhase::Idle);
}

#[tokio::test]
async fn test_stream_permission_revoked_stops_tracking() {
    let (source, tx) = PushSource::new(Ok(far_away()));
    let mut t = SessionBuilder::new().with_source(Arc::new(source)).build();
    t.start_tracking().await;

    tx.send(Err(PositionError::PermissionDenied)).await.unwrap();
    assert!(t.pump().await);

    assert_eq!(t.phase(), SessionPhase::Denied);
    assert_eq!(t.permission(), PermissionStatus::Denied);
    assert!(!t.has_feed());
    assert!(!t.is_demo_mode());
}

#[tokio::test]
async fn test_stream_unavailable_keeps_tracking() {
    let (source, tx) = PushSource::new(Ok(far_away()));
    let mut t = SessionBuilder::new().with_source(Arc::new(source)).build();
    t.start_tracking().await;

    tx.send(Err(PositionError::PositionUnavailable("no satellites".to_string()))).await.unwrap();
    t.pump().await;

    assert_eq!(t.phase(), SessionPhase::Tracking);
    assert!(t.has_feed());
    assert_eq!(t.errors.len(), 1);
    assert_eq!(t.errors.logs()[0].context.as_deref(), Some("watch_position"));
}

// ============================================================================
// Manual operations
// ============================================================================

#[tokio::test]
async fn test_request_buddy_targets() {
    let mut t = SessionBuilder::new().with_zones(vec![zone_c(), zone_a()]).build();

    // Nothing active yet, nothing named
    assert!(t.request_buddy(None).is_none());
    assert!(t.request_buddy(Some(&ZoneId::from("missing"))).is_none());
    assert_eq!(t.buddy_requests(), 0);

    // Named zone works even when not active
    let alert = t.request_buddy(Some(&ZoneId::from("ZA"))).unwrap();
    assert_eq!(alert.kind, AlertKind::BuddyRequest);
    assert_eq!(alert.zone.id.as_str(), "ZA");

    t.process_sample(origin());
    let before = t.buddy_requests();
    let alert = t.request_buddy(None).unwrap();
    assert_eq!(alert.zone.id.as_str(), "Z1");
    assert_eq!(t.buddy_requests(), before + 1);

    assert_eq!(t.finish().await, vec!["ZA", "Z1", "Z1"]);
}

#[tokio::test]
async fn test_clear_alert_is_idempotent() {
    let mut t = SessionBuilder::new().build();
    let alerts = t.process_sample(origin());
    let id = alerts[0].id.clone();

    assert!(!t.clear_alert("unknown"));
    assert_eq!(t.alert_count(), 2);
    assert!(t.clear_alert(&id));
    assert!(!t.clear_alert(&id));
    assert_eq!(t.alert_count(), 1);
}

#[tokio::test]
async fn test_load_zones_reports_missing_ids() {
    let mut t = SessionBuilder::new().with_zones(vec![]).build();
    let catalog = StaticZoneCatalog::new([zone_c(), zone_a()]);
    let ids = [ZoneId::from("Z1"), ZoneId::from("NOPE"), ZoneId::from("ZA")];

    let loaded = t.load_zones(&catalog, &ids).await;

    assert_eq!(loaded, 2);
    let failures = t.errors.by_category(ErrorCategory::Catalog);
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].details["zone"], "NOPE");
}

#[tokio::test]
async fn test_snapshot_reflects_state() {
    let mut t = SessionBuilder::new().build();
    t.process_sample(origin());

    let snapshot = t.snapshot();
    assert_eq!(snapshot.phase, SessionPhase::Idle);
    assert!(!snapshot.is_tracking);
    assert!(snapshot.in_danger_zone);
    assert_eq!(snapshot.alerts.len(), 2);
    assert_eq!(snapshot.buddy_requests, 1);

    let json = serde_json::to_value(&snapshot).unwrap();
    assert_eq!(json["permission"], "not_yet_asked");
    assert_eq!(json["alerts"][1]["kind"], "buddy_request");
}

// ============================================================================
// Runner
// ============================================================================

#[tokio::test]
async fn test_runner_drives_session() {
    let (source, tx) = PushSource::new(Ok(origin()));
    let t = SessionBuilder::new().with_source(Arc::new(source)).build();
    let clock = t.clock.clone();
    let (handle, runner) = create_session_runner(t.session, 16);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(runner.run(shutdown_rx));

    assert!(handle.start().await.unwrap());
    clock.set(70_000);
    tx.send(Ok(far_away())).await.unwrap();

    // Poll until the feed item has been applied
    let mut snapshot = handle.snapshot().await.unwrap();
    for _ in 0..100 {
        if snapshot.alerts.len() == 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
        snapshot = handle.snapshot().await.unwrap();
    }
    assert_eq!(snapshot.alerts.len(), 3);
    assert!(snapshot.active_zones.is_empty());

    let buddy_id = snapshot.alerts[1].id.clone();
    assert!(handle.clear_alert(buddy_id).await.unwrap());

    handle.stop().await.unwrap();
    assert!(tx.send(Ok(origin())).await.is_err());

    shutdown_tx.send(true).unwrap();
    let session = task.await.unwrap();
    assert_eq!(session.alert_count(), 2);
    assert_eq!(session.phase(), SessionPhase::Idle);

    // Runner gone: handle calls fail instead of hanging
    assert!(matches!(handle.snapshot().await, Err(EngineError::InternalState(_))));
}
