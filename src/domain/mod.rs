//! Domain models - value types and geometry
//!
//! This module contains the canonical data types used throughout the engine:
//! - `Coordinate` / `LocationSample` - positional fixes
//! - `Zone` / `RiskGrade` - monitored circular zones
//! - `Alert` / `AlertKind` / `Severity` - user-facing alerts
//! - `geo` - Haversine distance and membership evaluation

pub mod geo;
pub mod types;

pub use geo::{distance_m, evaluate_membership, is_inside, MembershipState};
pub use types::{
    Alert, AlertKind, Coordinate, LocationSample, PermissionStatus, RiskGrade, SessionPhase,
    Severity, Zone, ZoneId,
};
