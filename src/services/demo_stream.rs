//! Synthetic fallback feed used when positioning is refused
//!
//! The walk is planned up front from the injected random source, so a
//! seeded session replays the exact same coordinates. Only the pacing
//! runs on a timer.

use crate::domain::types::{Coordinate, LocationSample};
use crate::infra::clock::{Clock, RandomSource};
use crate::io::positioning::Subscription;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// Planned demo walk: an anchor followed by jittered points around it
#[derive(Debug, Clone, PartialEq)]
pub struct DemoPlan {
    pub anchor: Coordinate,
    pub accuracy_m: f64,
    pub points: Vec<Coordinate>,
    pub interval: Duration,
}

impl DemoPlan {
    /// Each point is offset from the anchor by `(r - 0.5) * jitter_deg`
    /// per axis, with `r` uniform in [0, 1)
    pub fn generate(
        anchor: Coordinate,
        accuracy_m: f64,
        count: u32,
        jitter_deg: f64,
        interval: Duration,
        random: &mut dyn RandomSource,
    ) -> Self {
        let points = (0..count)
            .map(|_| {
                let dlat = (random.next_unit() - 0.5) * jitter_deg;
                let dlng = (random.next_unit() - 0.5) * jitter_deg;
                Coordinate::new(anchor.lat + dlat, anchor.lng + dlng)
            })
            .collect();
        Self { anchor, accuracy_m, points, interval }
    }

    pub fn anchor_sample(&self, now_ms: u64) -> LocationSample {
        LocationSample::new(self.anchor, self.accuracy_m, now_ms)
    }

    /// Emit the jittered points on the plan's interval. The anchor is not
    /// re-sent; callers process it directly.
    pub fn spawn(self, clock: Arc<dyn Clock>) -> Subscription {
        let (tx, rx) = mpsc::channel(self.points.len().max(1));
        let DemoPlan { accuracy_m, points, interval, .. } = self;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            for (n, coordinate) in points.into_iter().enumerate() {
                ticker.tick().await;
                let sample = LocationSample::new(coordinate, accuracy_m, clock.now_ms());
                debug!(seq = %n, coordinate = %coordinate, "demo_sample");
                if tx.send(Ok(sample)).await.is_err() {
                    break;
                }
            }
            debug!("demo_feed_finished");
        });

        Subscription::new(rx, task)
    }
}
