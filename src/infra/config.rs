//! Configuration loading from TOML files
//!
//! The binary selects the config file via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml

use crate::domain::types::{Coordinate, RiskGrade, Zone, ZoneId};
use crate::infra::error::EngineError;
use anyhow::Context;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
struct SessionConfig {
    /// Minimum time between two alerts for the same zone
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
    /// Alerts retained in the session log, oldest evicted first
    #[serde(default = "default_alert_log_capacity")]
    pub alert_log_capacity: usize,
}

fn default_cooldown_ms() -> u64 {
    60_000
}

fn default_alert_log_capacity() -> usize {
    20
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { cooldown_ms: default_cooldown_ms(), alert_log_capacity: default_alert_log_capacity() }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct PositioningConfig {
    #[serde(default = "default_timeout_ms")]
    pub initial_timeout_ms: u64,
    #[serde(default = "default_max_age_ms")]
    pub initial_max_age_ms: u64,
    #[serde(default = "default_true")]
    pub initial_high_accuracy: bool,
    #[serde(default = "default_timeout_ms")]
    pub watch_timeout_ms: u64,
    #[serde(default = "default_max_age_ms")]
    pub watch_max_age_ms: u64,
    #[serde(default)]
    pub watch_high_accuracy: bool,
    /// JSONL file of recorded samples; unset means no positioning hardware
    #[serde(default)]
    pub replay_file: Option<String>,
    #[serde(default = "default_replay_interval_ms")]
    pub replay_interval_ms: u64,
}

fn default_timeout_ms() -> u64 {
    15_000
}

fn default_max_age_ms() -> u64 {
    60_000
}

fn default_true() -> bool {
    true
}

fn default_replay_interval_ms() -> u64 {
    1000
}

impl Default for PositioningConfig {
    fn default() -> Self {
        Self {
            initial_timeout_ms: default_timeout_ms(),
            initial_max_age_ms: default_max_age_ms(),
            initial_high_accuracy: true,
            watch_timeout_ms: default_timeout_ms(),
            watch_max_age_ms: default_max_age_ms(),
            watch_high_accuracy: false,
            replay_file: None,
            replay_interval_ms: default_replay_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct DemoConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_demo_lat")]
    pub lat: f64,
    #[serde(default = "default_demo_lng")]
    pub lng: f64,
    #[serde(default = "default_demo_accuracy")]
    pub accuracy_m: f64,
    /// Perturbed samples emitted after the anchor sample
    #[serde(default = "default_demo_samples")]
    pub samples: u32,
    #[serde(default = "default_demo_interval_ms")]
    pub interval_ms: u64,
    /// Full width of the uniform jitter window in degrees
    #[serde(default = "default_demo_jitter")]
    pub jitter_deg: f64,
}

fn default_demo_lat() -> f64 {
    40.7589 // Midtown Manhattan
}

fn default_demo_lng() -> f64 {
    -73.9851
}

fn default_demo_accuracy() -> f64 {
    10.0
}

fn default_demo_samples() -> u32 {
    5
}

fn default_demo_interval_ms() -> u64 {
    5000
}

fn default_demo_jitter() -> f64 {
    0.001
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            lat: default_demo_lat(),
            lng: default_demo_lng(),
            accuracy_m: default_demo_accuracy(),
            samples: default_demo_samples(),
            interval_ms: default_demo_interval_ms(),
            jitter_deg: default_demo_jitter(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct BuddyConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Matching service URL; unset logs requests instead of sending them
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_buddy_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_buddy_queue_size")]
    pub queue_size: usize,
}

fn default_buddy_timeout_ms() -> u64 {
    5000
}

fn default_buddy_queue_size() -> usize {
    64
}

impl Default for BuddyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: None,
            timeout_ms: default_buddy_timeout_ms(),
            queue_size: default_buddy_queue_size(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct NotificationsConfig {
    #[serde(default = "default_notification_queue_size")]
    pub queue_size: usize,
}

fn default_notification_queue_size() -> usize {
    256
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self { queue_size: default_notification_queue_size() }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct MetricsConfig {
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
}

fn default_metrics_interval() -> u64 {
    30
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval() }
    }
}

/// One zone definition as written in the config file
#[derive(Debug, Clone, Deserialize)]
struct ZoneDef {
    pub id: String,
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    pub grade: RiskGrade,
    /// Falls back to the grade's default radius
    #[serde(default)]
    pub radius_m: Option<f64>,
    #[serde(default)]
    pub crime_rate: Option<f64>,
}

impl ZoneDef {
    fn to_zone(&self) -> Zone {
        Zone {
            id: ZoneId::new(self.id.clone()),
            name: self.name.clone(),
            centroid: Coordinate::new(self.lat, self.lng),
            radius_m: self.radius_m.unwrap_or_else(|| self.grade.default_radius_m()),
            grade: self.grade,
            crime_rate: self.crime_rate,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
struct CatalogConfig {
    /// Zone ids the session asks the catalog for; empty means all defined zones
    #[serde(default)]
    pub monitored: Vec<String>,
    #[serde(default)]
    pub zones: Vec<ZoneDef>,
}

#[derive(Debug, Clone, Deserialize)]
struct TomlConfig {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub positioning: PositioningConfig,
    #[serde(default)]
    pub demo: DemoConfig,
    #[serde(default)]
    pub buddy: BuddyConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    pub catalog: Option<CatalogConfig>,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    cooldown_ms: u64,
    alert_log_capacity: usize,
    initial_timeout_ms: u64,
    initial_max_age_ms: u64,
    initial_high_accuracy: bool,
    watch_timeout_ms: u64,
    watch_max_age_ms: u64,
    watch_high_accuracy: bool,
    replay_file: Option<String>,
    replay_interval_ms: u64,
    demo_enabled: bool,
    demo_anchor: Coordinate,
    demo_accuracy_m: f64,
    demo_samples: u32,
    demo_interval_ms: u64,
    demo_jitter_deg: f64,
    buddy_enabled: bool,
    buddy_endpoint: Option<String>,
    buddy_timeout_ms: u64,
    buddy_queue_size: usize,
    notification_queue_size: usize,
    metrics_interval_secs: u64,
    monitored: Vec<ZoneId>,
    zones: Vec<Zone>,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        let zones = Self::default_zones();
        Self {
            cooldown_ms: default_cooldown_ms(),
            alert_log_capacity: default_alert_log_capacity(),
            initial_timeout_ms: default_timeout_ms(),
            initial_max_age_ms: default_max_age_ms(),
            initial_high_accuracy: true,
            watch_timeout_ms: default_timeout_ms(),
            watch_max_age_ms: default_max_age_ms(),
            watch_high_accuracy: false,
            replay_file: None,
            replay_interval_ms: default_replay_interval_ms(),
            demo_enabled: true,
            demo_anchor: Coordinate::new(default_demo_lat(), default_demo_lng()),
            demo_accuracy_m: default_demo_accuracy(),
            demo_samples: default_demo_samples(),
            demo_interval_ms: default_demo_interval_ms(),
            demo_jitter_deg: default_demo_jitter(),
            buddy_enabled: true,
            buddy_endpoint: None,
            buddy_timeout_ms: default_buddy_timeout_ms(),
            buddy_queue_size: default_buddy_queue_size(),
            notification_queue_size: default_notification_queue_size(),
            metrics_interval_secs: default_metrics_interval(),
            monitored: zones.iter().map(|z| z.id.clone()).collect(),
            zones,
            config_file: "default".to_string(),
        }
    }
}

impl Config {
    /// Reference Manhattan zones with known crime grades
    fn default_zones() -> Vec<Zone> {
        let defs = [
            ("10001", "Chelsea", 40.7505, -73.9934, RiskGrade::B, 12.3),
            ("10002", "Lower East Side", 40.7209, -73.9896, RiskGrade::C, 18.8),
            ("10003", "Greenwich Village", 40.7316, -73.9938, RiskGrade::A, 8.2),
            ("10004", "Financial District", 40.7041, -74.0125, RiskGrade::APlus, 4.1),
            ("10009", "East Village", 40.726, -73.9816, RiskGrade::C, 19.4),
        ];
        defs.into_iter()
            .map(|(id, name, lat, lng, grade, rate)| Zone {
                id: ZoneId::new(id),
                name: name.to_string(),
                centroid: Coordinate::new(lat, lng),
                radius_m: grade.default_radius_m(),
                grade,
                crime_rate: Some(rate),
            })
            .collect()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        let mut config = Self::from_toml(toml_config);
        config.config_file = path.display().to_string();
        config
            .validate()
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(config)
    }

    fn from_toml(toml_config: TomlConfig) -> Self {
        let TomlConfig { session, positioning, demo, buddy, notifications, metrics, catalog } =
            toml_config;

        // No [catalog] section keeps the reference zones
        let (monitored, zones) = match catalog {
            Some(catalog) => {
                let zones: Vec<Zone> = catalog.zones.iter().map(ZoneDef::to_zone).collect();
                let monitored = if catalog.monitored.is_empty() {
                    zones.iter().map(|z| z.id.clone()).collect()
                } else {
                    catalog.monitored.into_iter().map(ZoneId::new).collect()
                };
                (monitored, zones)
            }
            None => {
                let zones = Self::default_zones();
                (zones.iter().map(|z| z.id.clone()).collect(), zones)
            }
        };

        Self {
            cooldown_ms: session.cooldown_ms,
            alert_log_capacity: session.alert_log_capacity,
            initial_timeout_ms: positioning.initial_timeout_ms,
            initial_max_age_ms: positioning.initial_max_age_ms,
            initial_high_accuracy: positioning.initial_high_accuracy,
            watch_timeout_ms: positioning.watch_timeout_ms,
            watch_max_age_ms: positioning.watch_max_age_ms,
            watch_high_accuracy: positioning.watch_high_accuracy,
            replay_file: positioning.replay_file,
            replay_interval_ms: positioning.replay_interval_ms,
            demo_enabled: demo.enabled,
            demo_anchor: Coordinate::new(demo.lat, demo.lng),
            demo_accuracy_m: demo.accuracy_m,
            demo_samples: demo.samples,
            demo_interval_ms: demo.interval_ms,
            demo_jitter_deg: demo.jitter_deg,
            buddy_enabled: buddy.enabled,
            buddy_endpoint: buddy.endpoint,
            buddy_timeout_ms: buddy.timeout_ms,
            buddy_queue_size: buddy.queue_size,
            notification_queue_size: notifications.queue_size,
            metrics_interval_secs: metrics.interval_secs,
            monitored,
            zones,
            config_file: "default".to_string(),
        }
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.alert_log_capacity == 0 {
            return Err(EngineError::Config("session.alert_log_capacity must be > 0".into()));
        }
        if self.buddy_queue_size == 0 || self.notification_queue_size == 0 {
            return Err(EngineError::Config("queue sizes must be > 0".into()));
        }
        if self.demo_interval_ms == 0 || self.replay_interval_ms == 0 {
            return Err(EngineError::Config("stream intervals must be > 0".into()));
        }
        if self.metrics_interval_secs == 0 {
            return Err(EngineError::Config("metrics.interval_secs must be > 0".into()));
        }
        for zone in &self.zones {
            if !(zone.radius_m.is_finite() && zone.radius_m > 0.0) {
                return Err(EngineError::Config(format!(
                    "zone {} has invalid radius {}",
                    zone.id, zone.radius_m
                )));
            }
            if !(-90.0..=90.0).contains(&zone.centroid.lat)
                || !(-180.0..=180.0).contains(&zone.centroid.lng)
            {
                return Err(EngineError::Config(format!(
                    "zone {} centroid {} out of range",
                    zone.id, zone.centroid
                )));
            }
        }
        Ok(())
    }

    /// Load from an explicit path, falling back to defaults on any error
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), "config_load_failed_using_defaults");
                Self::default()
            }
        }
    }

    pub fn cooldown_ms(&self) -> u64 {
        self.cooldown_ms
    }

    pub fn alert_log_capacity(&self) -> usize {
        self.alert_log_capacity
    }

    pub fn initial_timeout(&self) -> Duration {
        Duration::from_millis(self.initial_timeout_ms)
    }

    pub fn initial_max_age_ms(&self) -> u64 {
        self.initial_max_age_ms
    }

    pub fn initial_high_accuracy(&self) -> bool {
        self.initial_high_accuracy
    }

    pub fn watch_timeout(&self) -> Duration {
        Duration::from_millis(self.watch_timeout_ms)
    }

    pub fn watch_max_age_ms(&self) -> u64 {
        self.watch_max_age_ms
    }

    pub fn watch_high_accuracy(&self) -> bool {
        self.watch_high_accuracy
    }

    pub fn replay_file(&self) -> Option<&str> {
        self.replay_file.as_deref()
    }

    pub fn replay_interval(&self) -> Duration {
        Duration::from_millis(self.replay_interval_ms)
    }

    pub fn demo_enabled(&self) -> bool {
        self.demo_enabled
    }

    pub fn demo_anchor(&self) -> Coordinate {
        self.demo_anchor
    }

    pub fn demo_accuracy_m(&self) -> f64 {
        self.demo_accuracy_m
    }

    pub fn demo_samples(&self) -> u32 {
        self.demo_samples
    }

    pub fn demo_interval(&self) -> Duration {
        Duration::from_millis(self.demo_interval_ms)
    }

    pub fn demo_jitter_deg(&self) -> f64 {
        self.demo_jitter_deg
    }

    pub fn buddy_enabled(&self) -> bool {
        self.buddy_enabled
    }

    pub fn buddy_endpoint(&self) -> Option<&str> {
        self.buddy_endpoint.as_deref()
    }

    pub fn buddy_timeout(&self) -> Duration {
        Duration::from_millis(self.buddy_timeout_ms)
    }

    pub fn buddy_queue_size(&self) -> usize {
        self.buddy_queue_size
    }

    pub fn notification_queue_size(&self) -> usize {
        self.notification_queue_size
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn monitored(&self) -> &[ZoneId] {
        &self.monitored
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests to set the cooldown window
    pub fn with_cooldown_ms(mut self, ms: u64) -> Self {
        self.cooldown_ms = ms;
        self
    }

    /// Builder method for tests to set the alert log capacity
    pub fn with_alert_log_capacity(mut self, capacity: usize) -> Self {
        self.alert_log_capacity = capacity;
        self
    }

    /// Builder method for tests to shorten the demo stream
    pub fn with_demo(mut self, samples: u32, interval: Duration) -> Self {
        self.demo_samples = samples;
        self.demo_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Builder method for tests to disable the demo fallback
    pub fn without_demo(mut self) -> Self {
        self.demo_enabled = false;
        self
    }

    /// Builder method for tests to shorten the initial fix timeout
    pub fn with_initial_timeout(mut self, timeout: Duration) -> Self {
        self.initial_timeout_ms = timeout.as_millis() as u64;
        self
    }
}
