//! Command loop that owns a `LocationSession`
//!
//! Commands, feed items and shutdown are multiplexed with `select!` so the
//! session keeps a single writer while the feed and the callers run
//! concurrently.

use super::{LocationSession, SessionSnapshot};
use crate::domain::types::{Alert, Zone, ZoneId};
use crate::infra::error::EngineError;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info};

#[derive(Debug)]
pub enum SessionCommand {
    Start { reply: oneshot::Sender<bool> },
    Stop { reply: oneshot::Sender<()> },
    RequestBuddy { zone: Option<ZoneId>, reply: oneshot::Sender<Option<Alert>> },
    ClearAlert { id: String, reply: oneshot::Sender<bool> },
    ReplaceZones { zones: Vec<Zone> },
    Snapshot { reply: oneshot::Sender<SessionSnapshot> },
}

impl SessionCommand {
    fn name(&self) -> &'static str {
        match self {
            SessionCommand::Start { .. } => "start",
            SessionCommand::Stop { .. } => "stop",
            SessionCommand::RequestBuddy { .. } => "request_buddy",
            SessionCommand::ClearAlert { .. } => "clear_alert",
            SessionCommand::ReplaceZones { .. } => "replace_zones",
            SessionCommand::Snapshot { .. } => "snapshot",
        }
    }
}

pub struct SessionRunner {
    session: LocationSession,
    cmd_rx: mpsc::Receiver<SessionCommand>,
}

impl SessionRunner {
    pub fn new(session: LocationSession, cmd_rx: mpsc::Receiver<SessionCommand>) -> Self {
        Self { session, cmd_rx }
    }

    /// Run until shutdown or until every handle is dropped. Tracking is
    /// stopped on the way out and the session handed back.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> LocationSession {
        info!("session_runner_started");

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("session_runner_shutdown");
                        break;
                    }
                }
                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(cmd) => self.handle_command(cmd).await,
                        None => break, // All handles dropped
                    }
                }
                (generation, item) = self.session.next_feed_item() => {
                    self.session.apply_feed_item(generation, item);
                }
            }
        }

        self.session.stop_tracking();
        info!(
            alerts = %self.session.alert_count(),
            buddy_requests = %self.session.buddy_requests(),
            "session_runner_stopped"
        );
        self.session
    }

    async fn handle_command(&mut self, cmd: SessionCommand) {
        debug!(command = %cmd.name(), "session_command");
        // A dropped reply receiver only means the caller stopped waiting
        match cmd {
            SessionCommand::Start { reply } => {
                let started = self.session.start_tracking().await;
                let _ = reply.send(started);
            }
            SessionCommand::Stop { reply } => {
                self.session.stop_tracking();
                let _ = reply.send(());
            }
            SessionCommand::RequestBuddy { zone, reply } => {
                let alert = self.session.request_buddy(zone.as_ref());
                let _ = reply.send(alert);
            }
            SessionCommand::ClearAlert { id, reply } => {
                let _ = reply.send(self.session.clear_alert(&id));
            }
            SessionCommand::ReplaceZones { zones } => {
                self.session.replace_zones(zones);
            }
            SessionCommand::Snapshot { reply } => {
                let _ = reply.send(self.session.snapshot());
            }
        }
    }
}

/// Cloneable front end for a running session
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    /// Returns true if live tracking started, false if the session fell
    /// back to denied (and possibly demo) mode
    pub async fn start(&self) -> Result<bool, EngineError> {
        self.call(|reply| SessionCommand::Start { reply }).await
    }

    /// Resolves once the feed has been cancelled
    pub async fn stop(&self) -> Result<(), EngineError> {
        self.call(|reply| SessionCommand::Stop { reply }).await
    }

    pub async fn request_buddy(&self, zone: Option<ZoneId>) -> Result<Option<Alert>, EngineError> {
        self.call(|reply| SessionCommand::RequestBuddy { zone, reply }).await
    }

    pub async fn clear_alert(&self, id: impl Into<String>) -> Result<bool, EngineError> {
        let id = id.into();
        self.call(|reply| SessionCommand::ClearAlert { id, reply }).await
    }

    pub async fn replace_zones(&self, zones: Vec<Zone>) -> Result<(), EngineError> {
        self.tx.send(SessionCommand::ReplaceZones { zones }).await.map_err(|_| runner_gone())
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, EngineError> {
        self.call(|reply| SessionCommand::Snapshot { reply }).await
    }

    async fn call<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> SessionCommand) -> Result<T, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx.send(build(reply_tx)).await.map_err(|_| runner_gone())?;
        reply_rx.await.map_err(|_| runner_gone())
    }
}

fn runner_gone() -> EngineError {
    EngineError::InternalState("session runner is not running".to_string())
}

/// Create a session command channel and runner
///
/// Returns the handle (for callers) and the runner (to be spawned)
pub fn create_session_runner(session: LocationSession, buffer_size: usize) -> (SessionHandle, SessionRunner) {
    let (tx, rx) = mpsc::channel(buffer_size);
    (SessionHandle { tx }, SessionRunner::new(session, rx))
}
