//! Error taxonomy for the engine
//!
//! Nothing here is fatal to a session:
//! - Positioning errors degrade the session into the demo fallback
//! - Catalog failures shrink the monitored zone set
//! - Internal state errors are logged and skipped

use crate::domain::types::ZoneId;
use thiserror::Error;

/// Failure reported by the positioning source
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PositionError {
    #[error("location permission denied")]
    PermissionDenied,

    #[error("position unavailable: {0}")]
    PositionUnavailable(String),

    #[error("position request timed out after {0} ms")]
    Timeout(u64),
}

impl PositionError {
    /// Numeric code matching the browser geolocation API
    pub fn code(&self) -> u8 {
        match self {
            PositionError::PermissionDenied => 1,
            PositionError::PositionUnavailable(_) => 2,
            PositionError::Timeout(_) => 3,
        }
    }

    /// Short classification used in error records
    pub fn classification(&self) -> &'static str {
        match self {
            PositionError::PermissionDenied => "User denied location permission",
            PositionError::PositionUnavailable(_) => "Location information unavailable",
            PositionError::Timeout(_) => "Location request timed out",
        }
    }

    /// Plain-language remedy suitable for direct display
    pub fn suggestion(&self) -> &'static str {
        match self {
            PositionError::PermissionDenied => {
                "Location access was blocked. Open your browser or device location settings and select 'Allow' to enable location tracking."
            }
            PositionError::PositionUnavailable(_) => {
                "Unable to determine your location. Try moving to an area with better GPS signal or closer to a window."
            }
            PositionError::Timeout(_) => {
                "Location request took too long. Check your internet connection and try again."
            }
        }
    }
}

/// Engine-level error taxonomy
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("location consent denied")]
    ConsentDenied,

    #[error("position unavailable: {0}")]
    PositionUnavailable(String),

    #[error("position request timed out after {0} ms")]
    RequestTimedOut(u64),

    #[error("failed to load zone {zone}: {reason}")]
    CatalogLoadFailure { zone: ZoneId, reason: String },

    #[error("internal state error: {0}")]
    InternalState(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<PositionError> for EngineError {
    fn from(e: PositionError) -> Self {
        match e {
            PositionError::PermissionDenied => EngineError::ConsentDenied,
            PositionError::PositionUnavailable(msg) => EngineError::PositionUnavailable(msg),
            PositionError::Timeout(ms) => EngineError::RequestTimedOut(ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_error_codes() {
        assert_eq!(PositionError::PermissionDenied.code(), 1);
        assert_eq!(PositionError::PositionUnavailable("gps".into()).code(), 2);
        assert_eq!(PositionError::Timeout(15_000).code(), 3);
    }

    #[test]
    fn test_every_position_error_has_suggestion() {
        for e in [
            PositionError::PermissionDenied,
            PositionError::PositionUnavailable("no fix".into()),
            PositionError::Timeout(15_000),
        ] {
            assert!(!e.suggestion().is_empty());
            assert!(!e.classification().is_empty());
        }
    }

    #[test]
    fn test_position_error_maps_into_engine_error() {
        assert!(matches!(EngineError::from(PositionError::PermissionDenied), EngineError::ConsentDenied));
        assert!(matches!(
            EngineError::from(PositionError::Timeout(15_000)),
            EngineError::RequestTimedOut(15_000)
        ));
        let e = EngineError::from(PositionError::PositionUnavailable("indoors".into()));
        assert_eq!(e.to_string(), "position unavailable: indoors");
    }
}
