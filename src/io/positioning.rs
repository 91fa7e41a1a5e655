//! Positioning sources
//!
//! A source answers a one-shot fix request and offers a continuing
//! subscription. Subscriptions deliver samples and errors over a bounded
//! channel; cancelling (or dropping) one stops delivery immediately.

use crate::domain::types::{Coordinate, LocationSample};
use crate::infra::clock::Clock;
use crate::infra::error::PositionError;
use anyhow::Context;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// One item from a position feed
pub type FeedItem = Result<LocationSample, PositionError>;

/// Buffer for subscription channels
const FEED_BUFFER: usize = 64;

/// Tuning for a position request
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionOptions {
    pub high_accuracy: bool,
    /// Maximum wait for a fix
    pub timeout: Duration,
    /// Oldest cached fix the source may answer with
    pub max_age_ms: u64,
}

/// A live feed of samples. Dropping it cancels the feed.
pub struct Subscription {
    rx: mpsc::Receiver<FeedItem>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Feed produced by a task owned by the subscription
    pub fn new(rx: mpsc::Receiver<FeedItem>, task: JoinHandle<()>) -> Self {
        Self { rx, task: Some(task) }
    }

    /// Feed produced elsewhere; cancelling closes the channel
    pub fn from_receiver(rx: mpsc::Receiver<FeedItem>) -> Self {
        Self { rx, task: None }
    }

    pub async fn recv(&mut self) -> Option<FeedItem> {
        self.rx.recv().await
    }

    /// Stop the producer and refuse further items
    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.rx.close();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[async_trait]
pub trait PositionSource: Send + Sync {
    /// One-shot fix. The caller enforces `options.timeout` as well.
    async fn current_position(&self, options: &PositionOptions) -> FeedItem;

    /// Subscribe to continuing updates
    fn watch(&self, options: &PositionOptions) -> Result<Subscription, PositionError>;
}

/// Source that always fails, for hosts with no positioning hardware
pub struct UnavailableSource {
    error: PositionError,
}

impl UnavailableSource {
    pub fn new(error: PositionError) -> Self {
        Self { error }
    }
}

#[async_trait]
impl PositionSource for UnavailableSource {
    async fn current_position(&self, _options: &PositionOptions) -> FeedItem {
        Err(self.error.clone())
    }

    fn watch(&self, _options: &PositionOptions) -> Result<Subscription, PositionError> {
        Err(self.error.clone())
    }
}

/// Source fed by an external producer through a channel sender.
/// The first `watch` takes the feed; later calls fail.
pub struct PushSource {
    initial: Mutex<Option<FeedItem>>,
    feed: Mutex<Option<mpsc::Receiver<FeedItem>>>,
}

impl PushSource {
    /// Returns the source and the sender that drives its live feed
    pub fn new(initial: FeedItem) -> (Self, mpsc::Sender<FeedItem>) {
        let (tx, rx) = mpsc::channel(FEED_BUFFER);
        let source = Self { initial: Mutex::new(Some(initial)), feed: Mutex::new(Some(rx)) };
        (source, tx)
    }
}

#[async_trait]
impl PositionSource for PushSource {
    async fn current_position(&self, _options: &PositionOptions) -> FeedItem {
        // A fix that never arrives parks the request until the caller's timeout
        let initial = self.initial.lock().take();
        match initial {
            Some(item) => item,
            None => std::future::pending().await,
        }
    }

    fn watch(&self, _options: &PositionOptions) -> Result<Subscription, PositionError> {
        self.feed.lock().take().map(Subscription::from_receiver).ok_or_else(|| {
            PositionError::PositionUnavailable("feed already subscribed".to_string())
        })
    }
}

#[derive(Debug, Deserialize)]
struct ReplayLine {
    lat: f64,
    lng: f64,
    #[serde(default = "default_replay_accuracy")]
    accuracy_m: f64,
}

fn default_replay_accuracy() -> f64 {
    25.0
}

/// Replays recorded coordinates. The first answers the one-shot fix, the
/// rest stream at a fixed interval. Samples are stamped with the clock.
pub struct ReplaySource {
    points: Vec<(Coordinate, f64)>,
    interval: Duration,
    clock: Arc<dyn Clock>,
}

impl ReplaySource {
    pub fn new(points: Vec<(Coordinate, f64)>, interval: Duration, clock: Arc<dyn Clock>) -> Self {
        Self { points, interval, clock }
    }

    /// Load a JSONL file of `{"lat", "lng", "accuracy_m"}` objects
    pub fn from_file<P: AsRef<Path>>(
        path: P,
        interval: Duration,
        clock: Arc<dyn Clock>,
    ) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read replay file {}", path.display()))?;
        let points = Self::parse_jsonl(&content)
            .with_context(|| format!("Failed to parse replay file {}", path.display()))?;
        info!(file = %path.display(), points = %points.len(), "replay_source_loaded");
        Ok(Self::new(points, interval, clock))
    }

    fn parse_jsonl(content: &str) -> anyhow::Result<Vec<(Coordinate, f64)>> {
        content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(n, line)| {
                let parsed: ReplayLine =
                    serde_json::from_str(line).with_context(|| format!("line {}", n + 1))?;
                Ok((Coordinate::new(parsed.lat, parsed.lng), parsed.accuracy_m))
            })
            .collect()
    }

    fn sample(&self, point: (Coordinate, f64)) -> LocationSample {
        LocationSample::new(point.0, point.1, self.clock.now_ms())
    }
}

#[async_trait]
impl PositionSource for ReplaySource {
    async fn current_position(&self, _options: &PositionOptions) -> FeedItem {
        match self.points.first() {
            Some(&point) => Ok(self.sample(point)),
            None => Err(PositionError::PositionUnavailable("replay file is empty".to_string())),
        }
    }

    fn watch(&self, _options: &PositionOptions) -> Result<Subscription, PositionError> {
        let (tx, rx) = mpsc::channel(FEED_BUFFER);
        let points: Vec<(Coordinate, f64)> = self.points.iter().skip(1).copied().collect();
        let interval = self.interval;
        let clock = self.clock.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // First tick completes immediately; the fix already covered t=0
            ticker.tick().await;
            for (coordinate, accuracy_m) in points {
                ticker.tick().await;
                let sample = LocationSample::new(coordinate, accuracy_m, clock.now_ms());
                if tx.send(Ok(sample)).await.is_err() {
                    break;
                }
            }
            debug!("replay_feed_exhausted");
        });

        Ok(Subscription::new(rx, task))
    }
}
