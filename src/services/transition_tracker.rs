//! Zone entry/exit detection with per-zone alert cooldown
//!
//! Each sample rebuilds the full membership map and compares it against
//! the previous one:
//! - OUTSIDE -> INSIDE is an entry candidate
//! - INSIDE -> OUTSIDE is an exit candidate
//!
//! A candidate is only emitted if the zone has not alerted within the
//! cooldown window. The cooldown is keyed per zone, not per direction, so a
//! suppressed exit also masks an immediate re-entry. Membership is always
//! replaced, suppressed or not.

use crate::domain::geo::{evaluate_membership, MembershipState};
use crate::domain::types::{AlertKind, LocationSample, Zone, ZoneId};
use rustc_hash::FxHashMap;
use tracing::debug;

/// Default minimum gap between alerts for the same zone (60 s)
pub const DEFAULT_COOLDOWN_MS: u64 = 60_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionKind {
    Entry,
    Exit,
}

impl TransitionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionKind::Entry => "entry",
            TransitionKind::Exit => "exit",
        }
    }

    pub fn alert_kind(&self) -> AlertKind {
        match self {
            TransitionKind::Entry => AlertKind::Entry,
            TransitionKind::Exit => AlertKind::Exit,
        }
    }
}

/// A membership change that passed the cooldown gate
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub kind: TransitionKind,
    pub zone: Zone,
}

/// Outcome of observing one sample
#[derive(Debug, Default)]
pub struct Observation {
    /// Alert-worthy transitions, in catalog order
    pub transitions: Vec<Transition>,
    /// Transitions swallowed by the cooldown window
    pub suppressed: Vec<(ZoneId, TransitionKind)>,
    /// Zones the sample is inside, in catalog order
    pub active: Vec<Zone>,
}

/// Last alert time per zone. Entries are upserted, never removed.
#[derive(Debug, Default)]
pub struct CooldownTable {
    last_alert_ms: FxHashMap<ZoneId, u64>,
}

impl CooldownTable {
    /// True if a zone with no prior alert, or one whose last alert is
    /// strictly older than the window, may alert at `now_ms`
    pub fn allows(&self, zone: &ZoneId, now_ms: u64, window_ms: u64) -> bool {
        match self.last_alert_ms.get(zone) {
            Some(&last) => now_ms.saturating_sub(last) > window_ms,
            None => true,
        }
    }

    pub fn record(&mut self, zone: &ZoneId, now_ms: u64) {
        self.last_alert_ms.insert(zone.clone(), now_ms);
    }

    pub fn last_alert(&self, zone: &ZoneId) -> Option<u64> {
        self.last_alert_ms.get(zone).copied()
    }

    pub fn len(&self) -> usize {
        self.last_alert_ms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_alert_ms.is_empty()
    }
}

/// Stateful membership comparator
pub struct TransitionTracker {
    membership: MembershipState,
    cooldowns: CooldownTable,
    cooldown_ms: u64,
}

impl TransitionTracker {
    pub fn new(cooldown_ms: u64) -> Self {
        Self { membership: MembershipState::default(), cooldowns: CooldownTable::default(), cooldown_ms }
    }

    /// Compare `sample` against the previous membership and return the
    /// transitions to alert on
    pub fn observe(&mut self, sample: &LocationSample, zones: &[Zone], now_ms: u64) -> Observation {
        // Fully assembled before any transition logic runs
        let next = evaluate_membership(sample, zones);
        let mut observation = Observation::default();

        for zone in zones {
            let inside = next.get(&zone.id).copied().unwrap_or(false);
            let was_inside = self.is_inside(&zone.id);

            if inside {
                observation.active.push(zone.clone());
            }

            let kind = match (was_inside, inside) {
                (false, true) => TransitionKind::Entry,
                (true, false) => TransitionKind::Exit,
                _ => continue,
            };

            if self.cooldowns.allows(&zone.id, now_ms, self.cooldown_ms) {
                self.cooldowns.record(&zone.id, now_ms);
                observation.transitions.push(Transition { kind, zone: zone.clone() });
            } else {
                debug!(
                    zone = %zone.id,
                    transition = %kind.as_str(),
                    last_alert_ms = ?self.cooldowns.last_alert(&zone.id),
                    now_ms = %now_ms,
                    "transition_suppressed_cooldown"
                );
                observation.suppressed.push((zone.id.clone(), kind));
            }
        }

        self.membership = next;
        observation
    }

    pub fn is_inside(&self, zone: &ZoneId) -> bool {
        self.membership.get(zone).copied().unwrap_or(false)
    }

    pub fn membership(&self) -> &MembershipState {
        &self.membership
    }

    pub fn cooldowns(&self) -> &CooldownTable {
        &self.cooldowns
    }

    pub fn cooldown_ms(&self) -> u64 {
        self.cooldown_ms
    }
}

impl Default for TransitionTracker {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN_MS)
    }
}
