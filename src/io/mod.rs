//! IO modules - collaborator interfaces
//!
//! This module contains every seam the engine talks through:
//! - `positioning` - One-shot fixes and live sample subscriptions
//! - `zone_catalog` - Zone definitions by id
//! - `notifier` - Best-effort alert delivery
//! - `buddy` - Buddy-matching requests
//! - `error_report` - Structured error records

pub mod buddy;
pub mod error_report;
pub mod notifier;
pub mod positioning;
pub mod zone_catalog;

// Re-export commonly used types
pub use buddy::{BuddyMatcher, HttpBuddyMatcher, LogBuddyMatcher};
pub use error_report::{ErrorCategory, ErrorLog, ErrorRecord, ErrorReporter};
pub use notifier::{create_notification_channel, ChannelNotifier, LogNotifier, Notification, Notifier};
pub use positioning::{
    FeedItem, PositionOptions, PositionSource, PushSource, ReplaySource, Subscription,
    UnavailableSource,
};
pub use zone_catalog::{StaticZoneCatalog, ZoneCatalog, ZoneLoad};
