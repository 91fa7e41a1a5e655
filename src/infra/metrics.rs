//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations to avoid mutex contention.
//! Monotonic counters are only ever incremented; the latency aggregates
//! are swapped to zero on every report.
//!
//! NOTE: All atomics use Relaxed ordering intentionally. These are
//! statistical counters only and must not drive engine decisions.

use crate::domain::types::AlertKind;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Lock-free metrics collector shared between the session and its workers
pub struct Metrics {
    /// Samples run through the pipeline (monotonic)
    samples_total: AtomicU64,
    /// Samples since last report (reset on report)
    samples_since_report: AtomicU64,
    /// Sum of per-sample processing latency in microseconds (reset on report)
    latency_sum_us: AtomicU64,
    /// Max per-sample processing latency (reset on report)
    latency_max_us: AtomicU64,
    /// Entry alerts emitted (monotonic)
    entry_alerts: AtomicU64,
    /// Exit alerts emitted (monotonic)
    exit_alerts: AtomicU64,
    /// Buddy request alerts emitted, automatic and manual (monotonic)
    buddy_alerts: AtomicU64,
    /// Transitions swallowed by the cooldown window (monotonic)
    suppressed_total: AtomicU64,
    /// Buddy match dispatches completed by the worker (monotonic)
    buddy_dispatched: AtomicU64,
    /// Buddy match dispatches that failed downstream (monotonic)
    buddy_failed: AtomicU64,
    /// Buddy match dispatches dropped due to channel full (monotonic)
    buddy_dropped: AtomicU64,
    /// Notifications dropped due to channel full (monotonic)
    notifications_dropped: AtomicU64,
    /// Errors reported by the positioning source (monotonic)
    positioning_errors: AtomicU64,
    /// Last report time (only accessed from reporter)
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            samples_total: AtomicU64::new(0),
            samples_since_report: AtomicU64::new(0),
            latency_sum_us: AtomicU64::new(0),
            latency_max_us: AtomicU64::new(0),
            entry_alerts: AtomicU64::new(0),
            exit_alerts: AtomicU64::new(0),
            buddy_alerts: AtomicU64::new(0),
            suppressed_total: AtomicU64::new(0),
            buddy_dispatched: AtomicU64::new(0),
            buddy_failed: AtomicU64::new(0),
            buddy_dropped: AtomicU64::new(0),
            notifications_dropped: AtomicU64::new(0),
            positioning_errors: AtomicU64::new(0),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    /// Record one processed sample and its pipeline latency
    #[inline]
    pub fn record_sample_processed(&self, latency_us: u64) {
        self.samples_total.fetch_add(1, Ordering::Relaxed);
        self.samples_since_report.fetch_add(1, Ordering::Relaxed);
        self.latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        update_atomic_max(&self.latency_max_us, latency_us);
    }

    #[inline]
    pub fn record_alert(&self, kind: AlertKind) {
        let counter = match kind {
            AlertKind::Entry => &self.entry_alerts,
            AlertKind::Exit => &self.exit_alerts,
            AlertKind::BuddyRequest => &self.buddy_alerts,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_suppressed(&self) {
        self.suppressed_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_buddy_dispatched(&self) {
        self.buddy_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_buddy_failed(&self) {
        self.buddy_failed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_buddy_dropped(&self) {
        self.buddy_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_notification_dropped(&self) {
        self.notifications_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_positioning_error(&self) {
        self.positioning_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn samples_total(&self) -> u64 {
        self.samples_total.load(Ordering::Relaxed)
    }

    pub fn suppressed_total(&self) -> u64 {
        self.suppressed_total.load(Ordering::Relaxed)
    }

    pub fn buddy_dropped(&self) -> u64 {
        self.buddy_dropped.load(Ordering::Relaxed)
    }

    pub fn notifications_dropped(&self) -> u64 {
        self.notifications_dropped.load(Ordering::Relaxed)
    }

    /// Snapshot counters and reset the per-interval aggregates
    pub fn report(&self) -> MetricsSummary {
        let mut last = self.last_report_time.lock();
        let elapsed_secs = last.elapsed().as_secs_f64();
        *last = Instant::now();
        drop(last);

        let samples = self.samples_since_report.swap(0, Ordering::Relaxed);
        let latency_sum = self.latency_sum_us.swap(0, Ordering::Relaxed);
        let latency_max = self.latency_max_us.swap(0, Ordering::Relaxed);

        MetricsSummary {
            samples_total: self.samples_total.load(Ordering::Relaxed),
            samples_per_sec: if elapsed_secs > 0.0 { samples as f64 / elapsed_secs } else { 0.0 },
            avg_latency_us: if samples > 0 { latency_sum / samples } else { 0 },
            max_latency_us: latency_max,
            entry_alerts: self.entry_alerts.load(Ordering::Relaxed),
            exit_alerts: self.exit_alerts.load(Ordering::Relaxed),
            buddy_alerts: self.buddy_alerts.load(Ordering::Relaxed),
            suppressed_total: self.suppressed_total.load(Ordering::Relaxed),
            buddy_dispatched: self.buddy_dispatched.load(Ordering::Relaxed),
            buddy_failed: self.buddy_failed.load(Ordering::Relaxed),
            buddy_dropped: self.buddy_dropped.load(Ordering::Relaxed),
            notifications_dropped: self.notifications_dropped.load(Ordering::Relaxed),
            positioning_errors: self.positioning_errors.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time metrics snapshot
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub samples_total: u64,
    pub samples_per_sec: f64,
    pub avg_latency_us: u64,
    pub max_latency_us: u64,
    pub entry_alerts: u64,
    pub exit_alerts: u64,
    pub buddy_alerts: u64,
    pub suppressed_total: u64,
    pub buddy_dispatched: u64,
    pub buddy_failed: u64,
    pub buddy_dropped: u64,
    pub notifications_dropped: u64,
    pub positioning_errors: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            samples_total = %self.samples_total,
            samples_per_sec = %format!("{:.2}", self.samples_per_sec),
            avg_latency_us = %self.avg_latency_us,
            max_latency_us = %self.max_latency_us,
            entry_alerts = %self.entry_alerts,
            exit_alerts = %self.exit_alerts,
            buddy_alerts = %self.buddy_alerts,
            suppressed = %self.suppressed_total,
            buddy_dispatched = %self.buddy_dispatched,
            buddy_failed = %self.buddy_failed,
            buddy_dropped = %self.buddy_dropped,
            notifications_dropped = %self.notifications_dropped,
            positioning_errors = %self.positioning_errors,
            "metrics"
        );
    }
}
