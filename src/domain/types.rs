//! Shared value types for the geofence engine

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// WGS-84 coordinate in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    #[inline]
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6},{:.6}", self.lat, self.lng)
    }
}

/// A single positional fix from the positioning source
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationSample {
    pub coordinate: Coordinate,
    /// Horizontal accuracy radius in meters
    pub accuracy_m: f64,
    /// Capture time (epoch ms)
    pub captured_at_ms: u64,
}

impl LocationSample {
    pub fn new(coordinate: Coordinate, accuracy_m: f64, captured_at_ms: u64) -> Self {
        Self { coordinate, accuracy_m, captured_at_ms }
    }
}

/// Newtype wrapper for zone keys (postal codes in the reference catalog)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZoneId(pub String);

impl ZoneId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ZoneId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Crime risk grade, ordered from safest to most dangerous
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskGrade {
    #[serde(rename = "A+")]
    APlus,
    A,
    B,
    C,
    D,
    F,
}

impl RiskGrade {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskGrade::APlus => "A+",
            RiskGrade::A => "A",
            RiskGrade::B => "B",
            RiskGrade::C => "C",
            RiskGrade::D => "D",
            RiskGrade::F => "F",
        }
    }

    /// C, D and F zones warrant a buddy
    #[inline]
    pub fn is_high_risk(&self) -> bool {
        *self >= RiskGrade::C
    }

    /// Letter grade from a numeric crime score (incidents per 1k residents)
    pub fn from_crime_score(score: f64) -> Self {
        if score <= 5.0 {
            RiskGrade::APlus
        } else if score <= 8.0 {
            RiskGrade::A
        } else if score <= 12.0 {
            RiskGrade::B
        } else if score <= 18.0 {
            RiskGrade::C
        } else if score <= 25.0 {
            RiskGrade::D
        } else {
            RiskGrade::F
        }
    }

    /// Geofence radius used when a zone definition does not carry one.
    /// Riskier areas get a wider fence.
    pub fn default_radius_m(&self) -> f64 {
        match self {
            RiskGrade::APlus => 200.0,
            RiskGrade::A => 300.0,
            RiskGrade::B => 400.0,
            RiskGrade::C => 500.0,
            RiskGrade::D => 600.0,
            RiskGrade::F => 800.0,
        }
    }
}

impl fmt::Display for RiskGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskGrade {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "A+" => Ok(RiskGrade::APlus),
            "A" => Ok(RiskGrade::A),
            "B" => Ok(RiskGrade::B),
            "C" => Ok(RiskGrade::C),
            "D" => Ok(RiskGrade::D),
            "F" => Ok(RiskGrade::F),
            other => Err(format!("unknown risk grade '{other}'")),
        }
    }
}

/// A monitored circular zone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub id: ZoneId,
    pub name: String,
    pub centroid: Coordinate,
    pub radius_m: f64,
    pub grade: RiskGrade,
    /// Incidents per 1k residents, when the catalog knows it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crime_rate: Option<f64>,
}

impl Zone {
    pub fn new(
        id: impl Into<ZoneId>,
        name: impl Into<String>,
        centroid: Coordinate,
        radius_m: f64,
        grade: RiskGrade,
    ) -> Self {
        Self { id: id.into(), name: name.into(), centroid, radius_m, grade, crime_rate: None }
    }
}

impl From<String> for ZoneId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// What produced an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Entry,
    Exit,
    BuddyRequest,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::Entry => "entry",
            AlertKind::Exit => "exit",
            AlertKind::BuddyRequest => "buddy_request",
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user-facing alert. The zone is copied by value so later catalog
/// refreshes never rewrite history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub kind: AlertKind,
    pub zone: Zone,
    /// Generation time (epoch ms)
    pub ts: u64,
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionStatus {
    NotYetAsked,
    Granted,
    Denied,
}

impl PermissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionStatus::NotYetAsked => "not_yet_asked",
            PermissionStatus::Granted => "granted",
            PermissionStatus::Denied => "denied",
        }
    }
}

/// Lifecycle of a tracking session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    AwaitingPermission,
    Tracking,
    Denied,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Idle => "idle",
            SessionPhase::AwaitingPermission => "awaiting_permission",
            SessionPhase::Tracking => "tracking",
            SessionPhase::Denied => "denied",
        }
    }
}
