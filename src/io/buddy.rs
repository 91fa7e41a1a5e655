//! Buddy-matching collaborator
//!
//! The engine only asks for a match; it never waits on or consumes the
//! result.

use crate::domain::types::Zone;
use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::info;

#[async_trait]
pub trait BuddyMatcher: Send + Sync {
    /// Ask for a walking buddy near `zone`
    async fn request_match(&self, zone: &Zone) -> anyhow::Result<()>;
}

/// Wire body for the matching service
#[derive(Debug, Serialize)]
struct MatchRequest<'a> {
    zone_id: &'a str,
    zone_name: &'a str,
    grade: &'a str,
    lat: f64,
    lng: f64,
}

impl<'a> MatchRequest<'a> {
    fn from_zone(zone: &'a Zone) -> Self {
        Self {
            zone_id: zone.id.as_str(),
            zone_name: &zone.name,
            grade: zone.grade.as_str(),
            lat: zone.centroid.lat,
            lng: zone.centroid.lng,
        }
    }
}

/// Posts match requests to an HTTP endpoint
pub struct HttpBuddyMatcher {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpBuddyMatcher {
    pub fn new(endpoint: &str, timeout: Duration) -> anyhow::Result<Self> {
        // Create HTTP client once for reuse (connection pooling)
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build buddy matcher HTTP client")?;
        Ok(Self { endpoint: endpoint.to_string(), client })
    }
}

#[async_trait]
impl BuddyMatcher for HttpBuddyMatcher {
    async fn request_match(&self, zone: &Zone) -> anyhow::Result<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&MatchRequest::from_zone(zone))
            .send()
            .await
            .with_context(|| format!("buddy match request for zone {} failed", zone.id))?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("buddy match service returned {}", status.as_u16());
        }
        info!(zone = %zone.id, status = %status.as_u16(), "buddy_match_requested");
        Ok(())
    }
}

/// Logs match requests without contacting anything
#[derive(Debug, Default, Clone, Copy)]
pub struct LogBuddyMatcher;

#[async_trait]
impl BuddyMatcher for LogBuddyMatcher {
    async fn request_match(&self, zone: &Zone) -> anyhow::Result<()> {
        info!(zone = %zone.id, area = %zone.name, grade = %zone.grade, "buddy_match_logged");
        Ok(())
    }
}
