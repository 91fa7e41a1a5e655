//! Error-reporting collaborator
//!
//! Write-only from the engine's side. `ErrorLog` keeps the most recent
//! records in memory for diagnostics and mirrors each one to tracing.

use crate::infra::error::PositionError;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, VecDeque};
use tracing::warn;
use uuid::Uuid;

/// Records retained by `ErrorLog`
pub const DEFAULT_ERROR_LOG_CAPACITY: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Geolocation,
    Permission,
    Api,
    Catalog,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Geolocation => "geolocation",
            ErrorCategory::Permission => "permission",
            ErrorCategory::Api => "api",
            ErrorCategory::Catalog => "catalog",
        }
    }
}

/// A structured error record
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub category: ErrorCategory,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    pub details: Value,
}

impl ErrorRecord {
    pub fn new(category: ErrorCategory, message: impl Into<String>, context: Option<&str>, details: Value) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            timestamp: Utc::now(),
            category,
            message: message.into(),
            context: context.map(str::to_string),
            details,
        }
    }

    /// Record for a positioning failure, carrying the browser-style code
    pub fn geolocation(error: &PositionError, context: &str) -> Self {
        Self::new(
            ErrorCategory::Geolocation,
            error.classification(),
            Some(context),
            json!({
                "code": error.code(),
                "message": error.to_string(),
                "suggestion": error.suggestion(),
            }),
        )
    }

    /// The user refused location access outright
    pub fn permission_denied(context: &str) -> Self {
        Self::new(
            ErrorCategory::Permission,
            "Location permission denied",
            Some(context),
            json!({ "permission": "geolocation", "state": "denied" }),
        )
    }

    /// A call to an external service failed
    pub fn api(operation: &str, message: impl Into<String>, details: Value) -> Self {
        Self::new(ErrorCategory::Api, message, Some(operation), details)
    }
}

pub trait ErrorReporter: Send + Sync {
    fn report(&self, record: ErrorRecord);
}

/// Bounded in-memory error log, newest record first
pub struct ErrorLog {
    records: Mutex<VecDeque<ErrorRecord>>,
    capacity: usize,
}

impl ErrorLog {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_ERROR_LOG_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { records: Mutex::new(VecDeque::with_capacity(capacity)), capacity }
    }

    pub fn logs(&self) -> Vec<ErrorRecord> {
        self.records.lock().iter().cloned().collect()
    }

    pub fn by_category(&self, category: ErrorCategory) -> Vec<ErrorRecord> {
        self.records.lock().iter().filter(|r| r.category == category).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }

    /// Count of records per "category:message"
    pub fn summary(&self) -> BTreeMap<String, usize> {
        let mut summary = BTreeMap::new();
        for record in self.records.lock().iter() {
            *summary.entry(format!("{}:{}", record.category.as_str(), record.message)).or_insert(0) += 1;
        }
        summary
    }

    pub fn export_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.logs())
    }

    /// The user keeps refusing location access
    pub fn has_recurring_permission_issues(&self) -> bool {
        let records = self.records.lock();
        let permission = records.iter().filter(|r| r.category == ErrorCategory::Permission).count();
        let denied = records
            .iter()
            .filter(|r| {
                r.category == ErrorCategory::Geolocation
                    && r.details.get("code").and_then(Value::as_u64)
                        == Some(u64::from(PositionError::PermissionDenied.code()))
            })
            .count();
        permission > 2 || denied > 2
    }
}

impl Default for ErrorLog {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorReporter for ErrorLog {
    fn report(&self, record: ErrorRecord) {
        warn!(
            category = %record.category.as_str(),
            error = %record.message,
            context = %record.context.as_deref().unwrap_or(""),
            details = %record.details,
            "error_reported"
        );
        let mut records = self.records.lock();
        records.push_front(record);
        records.truncate(self.capacity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_is_bounded_newest_first() {
        let log = ErrorLog::with_capacity(3);
        for i in 0..5 {
            log.report(ErrorRecord::new(ErrorCategory::Api, format!("e{i}"), None, Value::Null));
        }
        let messages: Vec<String> = log.logs().into_iter().map(|r| r.message).collect();
        assert_eq!(messages, vec!["e4", "e3", "e2"]);
    }

    #[test]
    fn test_geolocation_record_details() {
        let record = ErrorRecord::geolocation(&PositionError::Timeout(15_000), "startTracking");
        assert_eq!(record.category, ErrorCategory::Geolocation);
        assert_eq!(record.message, "Location request timed out");
        assert_eq!(record.context.as_deref(), Some("startTracking"));
        assert_eq!(record.details["code"], 3);
        assert!(record.details["suggestion"].as_str().unwrap().contains("try again"));
    }

    #[test]
    fn test_summary_and_category_filter() {
        let log = ErrorLog::new();
        log.report(ErrorRecord::geolocation(&PositionError::PermissionDenied, "a"));
        log.report(ErrorRecord::geolocation(&PositionError::PermissionDenied, "b"));
        log.report(ErrorRecord::new(ErrorCategory::Catalog, "missing", None, Value::Null));

        let summary = log.summary();
        assert_eq!(summary.get("geolocation:User denied location permission"), Some(&2));
        assert_eq!(summary.get("catalog:missing"), Some(&1));
        assert_eq!(log.by_category(ErrorCategory::Catalog).len(), 1);
    }

    #[test]
    fn test_recurring_permission_issues() {
        let log = ErrorLog::new();
        for _ in 0..2 {
            log.report(ErrorRecord::geolocation(&PositionError::PermissionDenied, "watch"));
        }
        assert!(!log.has_recurring_permission_issues());

        log.report(ErrorRecord::geolocation(&PositionError::PermissionDenied, "watch"));
        assert!(log.has_recurring_permission_issues());

        log.clear();
        assert!(log.is_empty());
        assert!(!log.has_recurring_permission_issues());
    }

    #[test]
    fn test_permission_records_count_towards_recurring_issues() {
        let log = ErrorLog::new();
        for _ in 0..3 {
            log.report(ErrorRecord::permission_denied("start_tracking"));
        }
        let records = log.by_category(ErrorCategory::Permission);
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].details["state"], "denied");
        assert!(log.has_recurring_permission_issues());
    }

    #[test]
    fn test_export_json() {
        let log = ErrorLog::new();
        log.report(ErrorRecord::new(ErrorCategory::Permission, "Permission geolocation was denied", None, Value::Null));
        let exported: Value = serde_json::from_str(&log.export_json().unwrap()).unwrap();
        assert_eq!(exported[0]["category"], "permission");
    }
}
