//! Auto-escalation policy and buddy dispatch worker
//!
//! A qualifying entry synthesizes a buddy_request alert inside the
//! session. The actual match request is handed to a worker task through a
//! bounded channel so matcher network I/O never blocks sample processing.

use crate::domain::types::{AlertKind, RiskGrade, Zone};
use crate::infra::metrics::Metrics;
use crate::io::buddy::BuddyMatcher;
use crate::io::error_report::{ErrorRecord, ErrorReporter};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Only entries into C, D or F zones escalate
#[inline]
pub fn should_escalate(kind: AlertKind, grade: RiskGrade) -> bool {
    kind == AlertKind::Entry && grade.is_high_risk()
}

/// A match request waiting for the worker
#[derive(Debug)]
pub struct BuddyCmd {
    pub zone: Zone,
    /// When the request was enqueued (for queue delay measurement)
    pub enqueued_at: Instant,
}

/// Worker that forwards match requests to the matcher
pub struct BuddyWorker {
    matcher: Arc<dyn BuddyMatcher>,
    cmd_rx: mpsc::Receiver<BuddyCmd>,
    reporter: Arc<dyn ErrorReporter>,
    metrics: Arc<Metrics>,
}

impl BuddyWorker {
    pub fn new(
        matcher: Arc<dyn BuddyMatcher>,
        cmd_rx: mpsc::Receiver<BuddyCmd>,
        reporter: Arc<dyn ErrorReporter>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self { matcher, cmd_rx, reporter, metrics }
    }

    /// Run until every dispatcher is dropped
    pub async fn run(mut self) {
        info!("buddy_worker_started");

        while let Some(cmd) = self.cmd_rx.recv().await {
            let queue_delay_us = cmd.enqueued_at.elapsed().as_micros() as u64;
            let send_start = Instant::now();

            match self.matcher.request_match(&cmd.zone).await {
                Ok(()) => {
                    self.metrics.record_buddy_dispatched();
                    info!(
                        zone = %cmd.zone.id,
                        queue_delay_us = %queue_delay_us,
                        send_us = %send_start.elapsed().as_micros(),
                        "buddy_match_dispatched"
                    );
                }
                Err(e) => {
                    // Outcome never feeds back into the alert pipeline
                    self.metrics.record_buddy_failed();
                    warn!(zone = %cmd.zone.id, error = %format!("{e:#}"), "buddy_match_failed");
                    self.reporter.report(ErrorRecord::api(
                        "buddy_match",
                        format!("{e:#}"),
                        json!({ "zone": cmd.zone.id.as_str(), "grade": cmd.zone.grade.as_str() }),
                    ));
                }
            }
        }

        info!("buddy_worker_stopped");
    }
}

/// Session-side handle for fire-and-forget match requests
#[derive(Clone)]
pub struct BuddyDispatcher {
    tx: Option<mpsc::Sender<BuddyCmd>>,
    metrics: Arc<Metrics>,
}

impl BuddyDispatcher {
    /// Dispatcher that only logs; used when buddy matching is switched off
    pub fn disabled(metrics: Arc<Metrics>) -> Self {
        Self { tx: None, metrics }
    }

    /// Enqueue a match request. Never blocks; a full queue drops it.
    pub fn dispatch(&self, zone: &Zone) {
        let Some(tx) = &self.tx else {
            info!(zone = %zone.id, "buddy_dispatch_disabled");
            return;
        };
        let cmd = BuddyCmd { zone: zone.clone(), enqueued_at: Instant::now() };
        if let Err(e) = tx.try_send(cmd) {
            self.metrics.record_buddy_dropped();
            warn!(zone = %zone.id, error = %e, "buddy_dispatch_dropped");
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }
}

/// Create a buddy dispatch channel and worker
///
/// Returns the dispatcher (for the session) and the worker (to be spawned)
pub fn create_buddy_worker(
    matcher: Arc<dyn BuddyMatcher>,
    reporter: Arc<dyn ErrorReporter>,
    metrics: Arc<Metrics>,
    buffer_size: usize,
) -> (BuddyDispatcher, BuddyWorker) {
    let (tx, rx) = mpsc::channel(buffer_size);
    let worker = BuddyWorker::new(matcher, rx, reporter, metrics.clone());
    (BuddyDispatcher { tx: Some(tx), metrics }, worker)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::Coordinate;
    use crate::io::error_report::{ErrorCategory, ErrorLog};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingMatcher {
        zones: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl BuddyMatcher for RecordingMatcher {
        async fn request_match(&self, zone: &Zone) -> anyhow::Result<()> {
            self.zones.lock().push(zone.id.to_string());
            if self.fail {
                anyhow::bail!("matching service unreachable");
            }
            Ok(())
        }
    }

    fn zone() -> Zone {
        Zone::new("10002", "Lower East Side", Coordinate::new(40.7209, -73.9896), 500.0, RiskGrade::C)
    }

    #[test]
    fn test_escalation_policy() {
        assert!(should_escalate(AlertKind::Entry, RiskGrade::C));
        assert!(should_escalate(AlertKind::Entry, RiskGrade::F));
        assert!(!should_escalate(AlertKind::Entry, RiskGrade::B));
        assert!(!should_escalate(AlertKind::Entry, RiskGrade::APlus));
        assert!(!should_escalate(AlertKind::Exit, RiskGrade::F));
        assert!(!should_escalate(AlertKind::BuddyRequest, RiskGrade::F));
    }

    #[tokio::test]
    async fn test_worker_forwards_requests() {
        let metrics = Arc::new(Metrics::new());
        let matcher = Arc::new(RecordingMatcher::default());
        let errors = Arc::new(ErrorLog::new());
        let (dispatcher, worker) = create_buddy_worker(matcher.clone(), errors.clone(), metrics.clone(), 8);

        dispatcher.dispatch(&zone());
        dispatcher.dispatch(&zone());
        drop(dispatcher);
        worker.run().await;

        assert_eq!(*matcher.zones.lock(), vec!["10002", "10002"]);
        assert_eq!(metrics.report().buddy_dispatched, 2);
        assert!(errors.is_empty());
    }

    #[tokio::test]
    async fn test_worker_absorbs_failures() {
        let metrics = Arc::new(Metrics::new());
        let matcher = Arc::new(RecordingMatcher { fail: true, ..Default::default() });
        let errors = Arc::new(ErrorLog::new());
        let (dispatcher, worker) = create_buddy_worker(matcher, errors.clone(), metrics.clone(), 8);

        dispatcher.dispatch(&zone());
        drop(dispatcher);
        worker.run().await;

        let summary = metrics.report();
        assert_eq!(summary.buddy_failed, 1);
        assert_eq!(summary.buddy_dispatched, 0);

        let failures = errors.by_category(ErrorCategory::Api);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].context.as_deref(), Some("buddy_match"));
        assert_eq!(failures[0].message, "matching service unreachable");
        assert_eq!(failures[0].details["zone"], "10002");
    }

    #[test]
    fn test_full_queue_drops_instead_of_blocking() {
        let metrics = Arc::new(Metrics::new());
        let (dispatcher, _worker) =
            create_buddy_worker(Arc::new(RecordingMatcher::default()), Arc::new(ErrorLog::new()), metrics.clone(), 1);

        dispatcher.dispatch(&zone());
        dispatcher.dispatch(&zone());

        assert_eq!(metrics.buddy_dropped(), 1);
    }

    #[test]
    fn test_disabled_dispatcher_is_noop() {
        let metrics = Arc::new(Metrics::new());
        let dispatcher = BuddyDispatcher::disabled(metrics.clone());
        dispatcher.dispatch(&zone());
        assert!(!dispatcher.is_enabled());
        assert_eq!(metrics.buddy_dropped(), 0);
    }
}
