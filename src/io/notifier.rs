//! Notification delivery
//!
//! The session hands every emitted alert to a `Notifier`. Delivery is best
//! effort: implementations must never block the sample pipeline.

use crate::domain::types::{Alert, Severity};
use crate::infra::metrics::Metrics;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Non-critical notifications close themselves after this long
const AUTO_CLOSE_AFTER: Duration = Duration::from_secs(5);

/// OS-level notification derived from an alert
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub alert_id: String,
    pub title: String,
    pub body: String,
    /// Collapses repeat notifications for the same zone
    pub tag: String,
    pub severity: Severity,
    pub require_interaction: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_close_ms: Option<u64>,
}

impl Notification {
    pub fn from_alert(alert: &Alert) -> Self {
        let high = alert.severity == Severity::High;
        Self {
            alert_id: alert.id.clone(),
            title: if high { "High-Crime Area Alert" } else { "Location Alert" }.to_string(),
            body: alert.message.clone(),
            tag: alert.zone.id.to_string(),
            severity: alert.severity,
            require_interaction: high,
            auto_close_ms: (!high).then_some(AUTO_CLOSE_AFTER.as_millis() as u64),
        }
    }
}

pub trait Notifier: Send + Sync {
    /// Hand off an alert; must return without waiting on delivery
    fn notify(&self, alert: &Alert);
}

/// Forwards notifications to a consumer task over a bounded channel
#[derive(Clone)]
pub struct ChannelNotifier {
    tx: mpsc::Sender<Notification>,
    metrics: Arc<Metrics>,
}

impl Notifier for ChannelNotifier {
    fn notify(&self, alert: &Alert) {
        if let Err(e) = self.tx.try_send(Notification::from_alert(alert)) {
            self.metrics.record_notification_dropped();
            warn!(alert_id = %alert.id, error = %e, "notification_dropped");
        }
    }
}

/// Create a notification channel
///
/// Returns the notifier (for the session) and the receiver (for the display side)
pub fn create_notification_channel(
    buffer_size: usize,
    metrics: Arc<Metrics>,
) -> (ChannelNotifier, mpsc::Receiver<Notification>) {
    let (tx, rx) = mpsc::channel(buffer_size);
    (ChannelNotifier { tx, metrics }, rx)
}

/// Writes notifications to the log only
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, alert: &Alert) {
        let n = Notification::from_alert(alert);
        info!(
            title = %n.title,
            tag = %n.tag,
            severity = %n.severity,
            body = %n.body,
            "notification"
        );
    }
}
