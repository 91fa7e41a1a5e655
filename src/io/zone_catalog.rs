//! Zone catalog collaborator
//!
//! Loads monitored zones by id. A failed id never fails the batch; it is
//! reported and left out of the result.

use crate::domain::types::{Zone, ZoneId};
use crate::infra::error::EngineError;
use async_trait::async_trait;
use rustc_hash::FxHashMap;
use tracing::{debug, warn};

/// Result of a batch load: the zones that resolved plus per-id failures
#[derive(Debug, Default)]
pub struct ZoneLoad {
    pub zones: Vec<Zone>,
    pub failures: Vec<EngineError>,
}

#[async_trait]
pub trait ZoneCatalog: Send + Sync {
    /// Resolve a single zone definition
    async fn fetch_zone(&self, id: &ZoneId) -> Result<Zone, EngineError>;

    /// Resolve every id, preserving request order and skipping failures
    async fn load_zones(&self, ids: &[ZoneId]) -> ZoneLoad {
        let mut load = ZoneLoad::default();
        for id in ids {
            match self.fetch_zone(id).await {
                Ok(zone) => load.zones.push(zone),
                Err(e) => {
                    warn!(zone = %id, error = %e, "zone_load_failed");
                    load.failures.push(e);
                }
            }
        }
        debug!(requested = %ids.len(), loaded = %load.zones.len(), "zones_loaded");
        load
    }
}

/// In-memory catalog built from configuration
pub struct StaticZoneCatalog {
    zones: FxHashMap<ZoneId, Zone>,
}

impl StaticZoneCatalog {
    pub fn new(zones: impl IntoIterator<Item = Zone>) -> Self {
        Self { zones: zones.into_iter().map(|z| (z.id.clone(), z)).collect() }
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }
}

#[async_trait]
impl ZoneCatalog for StaticZoneCatalog {
    async fn fetch_zone(&self, id: &ZoneId) -> Result<Zone, EngineError> {
        self.zones.get(id).cloned().ok_or_else(|| EngineError::CatalogLoadFailure {
            zone: id.clone(),
            reason: "no crime data for zone".to_string(),
        })
    }
}
