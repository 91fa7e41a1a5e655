//! Geofence engine - location-event service
//!
//! Feeds location samples through zone membership, transition detection,
//! alert classification and buddy escalation.
//!
//! Module structure:
//! - `domain/` - Core value types and geometry (Zone, Alert, Haversine)
//! - `io/` - Collaborator seams (positioning, catalog, notifier, buddy, error log)
//! - `services/` - Engine pipeline and session lifecycle
//! - `infra/` - Infrastructure (Config, Metrics, Clock, Errors)

use clap::Parser;
use geofence_engine::infra::{Config, Metrics, PositionError, SystemClock};
use geofence_engine::io::{
    create_notification_channel, BuddyMatcher, ErrorLog, HttpBuddyMatcher, LogBuddyMatcher, PositionSource,
    ReplaySource, StaticZoneCatalog, UnavailableSource,
};
use geofence_engine::services::{
    create_buddy_worker, create_session_runner, BuddyDispatcher, Collaborators, LocationSession,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Geofence engine - zone entry/exit alerts with buddy escalation
#[derive(Parser, Debug)]
#[command(name = "geofence-engine", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, env = "CONFIG_FILE", default_value = "config/dev.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Default: INFO, use RUST_LOG=debug for per-sample visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!(git_hash = %env!("GIT_HASH"), "geofence-engine starting");

    let args = Args::parse();
    let config = Config::load_from_path(&args.config);

    info!(
        config_file = %config.config_file(),
        cooldown_ms = %config.cooldown_ms(),
        alert_log_capacity = %config.alert_log_capacity(),
        zones = %config.zones().len(),
        monitored = %config.monitored().len(),
        replay_file = ?config.replay_file(),
        demo_enabled = %config.demo_enabled(),
        buddy_endpoint = ?config.buddy_endpoint(),
        "config_loaded"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let metrics = Arc::new(Metrics::new());
    let clock = Arc::new(SystemClock);

    // Notifications are drained by a display task that only logs them
    let (notifier, mut notification_rx) =
        create_notification_channel(config.notification_queue_size(), metrics.clone());
    tokio::spawn(async move {
        while let Some(n) = notification_rx.recv().await {
            info!(
                title = %n.title,
                tag = %n.tag,
                severity = %n.severity,
                sticky = %n.require_interaction,
                body = %n.body,
                "notification_displayed"
            );
        }
    });

    let errors = Arc::new(ErrorLog::new());

    // Buddy matching worker (off the sample path)
    let buddy = if config.buddy_enabled() {
        let matcher: Arc<dyn BuddyMatcher> = match config.buddy_endpoint() {
            Some(endpoint) => Arc::new(HttpBuddyMatcher::new(endpoint, config.buddy_timeout())?),
            None => Arc::new(LogBuddyMatcher),
        };
        let (dispatcher, worker) =
            create_buddy_worker(matcher, errors.clone(), metrics.clone(), config.buddy_queue_size());
        tokio::spawn(worker.run());
        dispatcher
    } else {
        BuddyDispatcher::disabled(metrics.clone())
    };

    // Positioning: replay a recorded walk if configured, otherwise behave
    // like a host that refuses location access
    let positioning: Arc<dyn PositionSource> = match config.replay_file() {
        Some(path) => match ReplaySource::from_file(path, config.replay_interval(), clock.clone()) {
            Ok(source) => Arc::new(source),
            Err(e) => {
                warn!(error = %format!("{e:#}"), "replay_source_unavailable");
                Arc::new(UnavailableSource::new(PositionError::PositionUnavailable(e.to_string())))
            }
        },
        None => Arc::new(UnavailableSource::new(PositionError::PermissionDenied)),
    };

    let collaborators = Collaborators::new(positioning, Arc::new(notifier), errors.clone(), buddy, metrics.clone())
        .with_clock(clock);
    let mut session = LocationSession::new(config.clone(), collaborators);

    let catalog = StaticZoneCatalog::new(config.zones().iter().cloned());
    let loaded = session.load_zones(&catalog, config.monitored()).await;
    info!(zones = %loaded, "zones_ready");

    // Start metrics reporter
    let metrics_clone = metrics.clone();
    let metrics_interval = config.metrics_interval_secs();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(metrics_interval));
        loop {
            interval.tick().await;
            metrics_clone.report().log();
        }
    });

    let (handle, runner) = create_session_runner(session, 32);
    let runner_task = tokio::spawn(runner.run(shutdown_rx));

    // Handle shutdown on Ctrl+C
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    match handle.start().await {
        Ok(true) => info!("live_tracking_active"),
        Ok(false) => warn!(demo = %config.demo_enabled(), "live_tracking_unavailable"),
        Err(e) => warn!(error = %e, "session_start_failed"),
    }

    // The runner also exits once every handle is gone, so ours lives until shutdown
    let session = runner_task.await?;
    drop(handle);
    let snapshot = session.snapshot();
    info!(
        alerts = %snapshot.alerts.len(),
        buddy_requests = %snapshot.buddy_requests,
        errors = %errors.len(),
        recurring_permission_issues = %errors.has_recurring_permission_issues(),
        "geofence-engine shutdown complete"
    );
    metrics.report().log();
    Ok(())
}
