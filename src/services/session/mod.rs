//! Location tracking session
//!
//! The session owns all per-user engine state and is the single writer
//! for it:
//! - Zone snapshot (replaced wholesale on catalog refresh)
//! - Transition tracker (membership + cooldown table)
//! - Bounded alert log and buddy-request counter
//! - The active sample feed, live or demo, at most one at a time
//!
//! Every mutation goes through one of the methods below. `SessionRunner`
//! drives them from a command channel.

mod runner;
#[cfg(test)]
mod tests;

pub use runner::{create_session_runner, SessionCommand, SessionHandle, SessionRunner};

use crate::domain::types::{
    Alert, AlertKind, LocationSample, PermissionStatus, SessionPhase, Zone, ZoneId,
};
use crate::infra::clock::{Clock, RandomSource, SystemClock, ThreadRandom};
use crate::infra::config::Config;
use crate::infra::error::{EngineError, PositionError};
use crate::infra::metrics::Metrics;
use crate::io::error_report::{ErrorCategory, ErrorRecord, ErrorReporter};
use crate::io::notifier::Notifier;
use crate::io::positioning::{FeedItem, PositionOptions, PositionSource, Subscription};
use crate::io::zone_catalog::ZoneCatalog;
use crate::services::classifier::AlertClassifier;
use crate::services::demo_stream::DemoPlan;
use crate::services::escalation::{should_escalate, BuddyDispatcher};
use crate::services::transition_tracker::TransitionTracker;
use serde::Serialize;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// External collaborators a session talks to
pub struct Collaborators {
    pub positioning: Arc<dyn PositionSource>,
    pub notifier: Arc<dyn Notifier>,
    pub reporter: Arc<dyn ErrorReporter>,
    pub buddy: BuddyDispatcher,
    pub metrics: Arc<Metrics>,
    pub clock: Arc<dyn Clock>,
    pub random: Box<dyn RandomSource>,
}

impl Collaborators {
    /// Wall clock and entropy-seeded randomness
    pub fn new(
        positioning: Arc<dyn PositionSource>,
        notifier: Arc<dyn Notifier>,
        reporter: Arc<dyn ErrorReporter>,
        buddy: BuddyDispatcher,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            positioning,
            notifier,
            reporter,
            buddy,
            metrics,
            clock: Arc::new(SystemClock),
            random: Box::new(ThreadRandom::new()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_random(mut self, random: Box<dyn RandomSource>) -> Self {
        self.random = random;
        self
    }
}

/// Serializable view of the session for consumers
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub is_tracking: bool,
    pub permission: PermissionStatus,
    pub demo_mode: bool,
    pub current_sample: Option<LocationSample>,
    pub zones: Vec<Zone>,
    pub active_zones: Vec<Zone>,
    pub alerts: Vec<Alert>,
    pub buddy_requests: u64,
    pub in_danger_zone: bool,
}

pub struct LocationSession {
    config: Config,
    positioning: Arc<dyn PositionSource>,
    notifier: Arc<dyn Notifier>,
    reporter: Arc<dyn ErrorReporter>,
    buddy: BuddyDispatcher,
    metrics: Arc<Metrics>,
    clock: Arc<dyn Clock>,
    random: Box<dyn RandomSource>,

    tracker: TransitionTracker,
    classifier: AlertClassifier,
    zones: Vec<Zone>,
    current_sample: Option<LocationSample>,
    active_zones: Vec<Zone>,
    alerts: VecDeque<Alert>,
    buddy_requests: u64,
    phase: SessionPhase,
    permission: PermissionStatus,

    /// Live subscription or demo feed
    feed: Option<Subscription>,
    /// Bumped whenever the feed is torn down; items tagged with an older
    /// generation are discarded
    feed_generation: u64,
    demo_mode: bool,
}

impl LocationSession {
    pub fn new(config: Config, collaborators: Collaborators) -> Self {
        let Collaborators { positioning, notifier, reporter, buddy, metrics, clock, random } = collaborators;
        Self {
            tracker: TransitionTracker::new(config.cooldown_ms()),
            classifier: AlertClassifier::new(),
            alerts: VecDeque::with_capacity(config.alert_log_capacity()),
            config,
            positioning,
            notifier,
            reporter,
            buddy,
            metrics,
            clock,
            random,
            zones: Vec::new(),
            current_sample: None,
            active_zones: Vec::new(),
            buddy_requests: 0,
            phase: SessionPhase::Idle,
            permission: PermissionStatus::NotYetAsked,
            feed: None,
            feed_generation: 0,
            demo_mode: false,
        }
    }

    /// Load monitored zones from the catalog, replacing the current set.
    /// Returns how many zones are now monitored.
    pub async fn load_zones(&mut self, catalog: &dyn ZoneCatalog, ids: &[ZoneId]) -> usize {
        let load = catalog.load_zones(ids).await;
        for failure in &load.failures {
            let zone = match failure {
                EngineError::CatalogLoadFailure { zone, .. } => Some(zone.to_string()),
                _ => None,
            };
            self.reporter.report(ErrorRecord::new(
                ErrorCategory::Catalog,
                failure.to_string(),
                Some("load_zones"),
                json!({ "zone": zone }),
            ));
        }
        self.replace_zones(load.zones);
        self.zones.len()
    }

    /// Swap in a new zone set. Membership catches up on the next sample.
    pub fn replace_zones(&mut self, zones: Vec<Zone>) {
        info!(previous = %self.zones.len(), zones = %zones.len(), "zones_replaced");
        self.zones = zones;
    }

    /// Acquire an initial fix and subscribe to updates. Falls back to the
    /// demo feed when the fix fails. Returns true if live tracking started.
    pub async fn start_tracking(&mut self) -> bool {
        if self.feed.is_some() {
            debug!(phase = %self.phase.as_str(), "start_tracking_restarting_feed");
            self.cancel_feed();
        }
        self.phase = SessionPhase::AwaitingPermission;

        let options = PositionOptions {
            high_accuracy: self.config.initial_high_accuracy(),
            timeout: self.config.initial_timeout(),
            max_age_ms: self.config.initial_max_age_ms(),
        };
        let positioning = self.positioning.clone();
        let fix = match tokio::time::timeout(options.timeout, positioning.current_position(&options)).await {
            Ok(result) => result,
            Err(_) => Err(PositionError::Timeout(options.timeout.as_millis() as u64)),
        };

        let sample = match fix {
            Ok(sample) => sample,
            Err(error) => {
                self.report_position_error(&error, "start_tracking");
                self.permission = PermissionStatus::Denied;
                self.phase = SessionPhase::Denied;
                if self.config.demo_enabled() {
                    self.start_demo();
                }
                return false;
            }
        };

        self.permission = PermissionStatus::Granted;
        self.phase = SessionPhase::Tracking;
        info!(coordinate = %sample.coordinate, accuracy_m = %sample.accuracy_m, "tracking_started");
        self.process_sample(sample);

        let watch_options = PositionOptions {
            high_accuracy: self.config.watch_high_accuracy(),
            timeout: self.config.watch_timeout(),
            max_age_ms: self.config.watch_max_age_ms(),
        };
        match self.positioning.watch(&watch_options) {
            Ok(subscription) => self.feed = Some(subscription),
            Err(error) => {
                self.handle_stream_error(error);
                // Nothing further can arrive without a subscription
                if self.phase == SessionPhase::Tracking {
                    warn!(permission = %self.permission.as_str(), "live_updates_unavailable");
                    self.phase = SessionPhase::Denied;
                }
            }
        }
        self.phase == SessionPhase::Tracking
    }

    /// Cancel the active feed and return to idle. Alerts and counters stay.
    pub fn stop_tracking(&mut self) {
        self.cancel_feed();
        if self.phase != SessionPhase::Idle {
            info!(previous = %self.phase.as_str(), "tracking_stopped");
        }
        self.phase = SessionPhase::Idle;
    }

    /// Wait for the next feed item, tagged with the feed generation it came
    /// from. Pending forever when there is no feed.
    pub async fn next_feed_item(&mut self) -> (u64, Option<FeedItem>) {
        let generation = self.feed_generation;
        match self.feed.as_mut() {
            Some(feed) => (generation, feed.recv().await),
            None => std::future::pending().await,
        }
    }

    /// Apply one item from `next_feed_item`. `None` means the feed ended.
    pub fn apply_feed_item(&mut self, generation: u64, item: Option<FeedItem>) {
        if generation != self.feed_generation {
            debug!(generation = %generation, current = %self.feed_generation, "stale_feed_item_ignored");
            return;
        }
        match item {
            Some(Ok(sample)) => {
                self.process_sample(sample);
            }
            Some(Err(error)) => self.handle_stream_error(error),
            None => {
                info!(demo = %self.demo_mode, "feed_ended");
                self.feed = None;
            }
        }
    }

    /// Receive and apply one feed item. Returns false when there is no feed.
    pub async fn pump(&mut self) -> bool {
        if self.feed.is_none() {
            return false;
        }
        let (generation, item) = self.next_feed_item().await;
        self.apply_feed_item(generation, item);
        true
    }

    /// Run one sample through membership, transitions, classification and
    /// escalation. Returns the alerts it produced, in emission order.
    pub fn process_sample(&mut self, sample: LocationSample) -> Vec<Alert> {
        let process_start = Instant::now();
        let now = self.clock.now_ms();

        self.current_sample = Some(sample);
        let observation = self.tracker.observe(&sample, &self.zones, now);
        for _ in &observation.suppressed {
            self.metrics.record_suppressed();
        }
        self.active_zones = observation.active;

        let mut emitted = Vec::with_capacity(observation.transitions.len());
        for transition in observation.transitions {
            let kind = transition.kind.alert_kind();
            let alert = self.classifier.classify(kind, &transition.zone, now);
            self.emit(alert.clone());
            emitted.push(alert);

            if should_escalate(kind, transition.zone.grade) {
                emitted.push(self.escalate(&transition.zone, now));
            }
        }

        debug!(
            coordinate = %sample.coordinate,
            active = %self.active_zones.len(),
            alerts = %emitted.len(),
            "sample_processed"
        );
        self.metrics.record_sample_processed(process_start.elapsed().as_micros() as u64);
        emitted
    }

    /// Manually request a buddy for `zone`, or for the first active
    /// high-risk zone. Emits nothing if no zone qualifies.
    pub fn request_buddy(&mut self, zone: Option<&ZoneId>) -> Option<Alert> {
        let target = match zone {
            Some(id) => self.zones.iter().find(|z| &z.id == id),
            None => self.active_zones.iter().find(|z| z.grade.is_high_risk()),
        }
        .cloned();

        let Some(target) = target else {
            debug!(zone = ?zone.map(ZoneId::as_str), "buddy_request_no_zone");
            return None;
        };
        let now = self.clock.now_ms();
        Some(self.escalate(&target, now))
    }

    /// Remove one alert by id. Unknown ids are ignored.
    pub fn clear_alert(&mut self, id: &str) -> bool {
        let before = self.alerts.len();
        self.alerts.retain(|a| a.id != id);
        before != self.alerts.len()
    }

    pub fn is_in_danger_zone(&self) -> bool {
        self.active_zones.iter().any(|z| z.grade.is_high_risk())
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_tracking(&self) -> bool {
        self.phase == SessionPhase::Tracking
    }

    pub fn permission(&self) -> PermissionStatus {
        self.permission
    }

    pub fn is_demo_mode(&self) -> bool {
        self.demo_mode
    }

    pub fn has_feed(&self) -> bool {
        self.feed.is_some()
    }

    pub fn feed_generation(&self) -> u64 {
        self.feed_generation
    }

    pub fn current_sample(&self) -> Option<&LocationSample> {
        self.current_sample.as_ref()
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    pub fn active_zones(&self) -> &[Zone] {
        &self.active_zones
    }

    pub fn alerts(&self) -> impl Iterator<Item = &Alert> {
        self.alerts.iter()
    }

    pub fn alert_count(&self) -> usize {
        self.alerts.len()
    }

    pub fn buddy_requests(&self) -> u64 {
        self.buddy_requests
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.phase,
            is_tracking: self.is_tracking(),
            permission: self.permission,
            demo_mode: self.demo_mode,
            current_sample: self.current_sample,
            zones: self.zones.clone(),
            active_zones: self.active_zones.clone(),
            alerts: self.alerts.iter().cloned().collect(),
            buddy_requests: self.buddy_requests,
            in_danger_zone: self.is_in_danger_zone(),
        }
    }

    /// Synthesize a buddy_request alert and hand the match to the worker
    fn escalate(&mut self, zone: &Zone, now: u64) -> Alert {
        let alert = self.classifier.classify(AlertKind::BuddyRequest, zone, now);
        self.emit(alert.clone());
        self.buddy_requests += 1;
        self.buddy.dispatch(zone);
        alert
    }

    fn emit(&mut self, alert: Alert) {
        info!(
            alert_id = %alert.id,
            kind = %alert.kind,
            zone = %alert.zone.id,
            grade = %alert.zone.grade,
            severity = %alert.severity,
            "alert_emitted"
        );
        self.metrics.record_alert(alert.kind);
        self.notifier.notify(&alert);

        self.alerts.push_back(alert);
        while self.alerts.len() > self.config.alert_log_capacity() {
            self.alerts.pop_front();
        }
    }

    /// Anchor sample now, jittered walk on a timer
    fn start_demo(&mut self) {
        let plan = DemoPlan::generate(
            self.config.demo_anchor(),
            self.config.demo_accuracy_m(),
            self.config.demo_samples(),
            self.config.demo_jitter_deg(),
            self.config.demo_interval(),
            self.random.as_mut(),
        );
        info!(
            anchor = %plan.anchor,
            samples = %plan.points.len(),
            interval_ms = %plan.interval.as_millis(),
            "demo_feed_started"
        );

        self.demo_mode = true;
        let anchor = plan.anchor_sample(self.clock.now_ms());
        self.process_sample(anchor);
        self.feed = Some(plan.spawn(self.clock.clone()));
    }

    /// Errors delivered by an active subscription. Only a permission
    /// revocation ends tracking.
    fn handle_stream_error(&mut self, error: PositionError) {
        self.report_position_error(&error, "watch_position");
        if error == PositionError::PermissionDenied {
            self.cancel_feed();
            self.permission = PermissionStatus::Denied;
            self.phase = SessionPhase::Denied;
        }
    }

    fn report_position_error(&self, error: &PositionError, context: &str) {
        self.metrics.record_positioning_error();
        warn!(
            code = %error.code(),
            error = %error,
            context = %context,
            suggestion = %error.suggestion(),
            "positioning_failed"
        );
        self.reporter.report(ErrorRecord::geolocation(error, context));
        if *error == PositionError::PermissionDenied {
            self.reporter.report(ErrorRecord::permission_denied(context));
        }
    }

    fn cancel_feed(&mut self) {
        if let Some(mut feed) = self.feed.take() {
            feed.cancel();
        }
        self.feed_generation += 1;
        self.demo_mode = false;
    }
}
