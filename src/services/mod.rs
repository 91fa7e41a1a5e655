//! Services - the geofence engine
//!
//! This module contains the engine pipeline and its lifecycle:
//! - `transition_tracker` - Entry/exit detection with per-zone cooldown
//! - `classifier` - Alert severity, message text and identity
//! - `escalation` - Auto-escalation policy and async buddy dispatch
//! - `demo_stream` - Synthetic fallback feed
//! - `session` - Location tracking session and its command runner

pub mod classifier;
pub mod demo_stream;
pub mod escalation;
pub mod session;
pub mod transition_tracker;

// Re-export commonly used types
pub use classifier::AlertClassifier;
pub use demo_stream::DemoPlan;
pub use escalation::{create_buddy_worker, should_escalate, BuddyCmd, BuddyDispatcher, BuddyWorker};
pub use session::{
    create_session_runner, Collaborators, LocationSession, SessionCommand, SessionHandle, SessionRunner,
    SessionSnapshot,
};
pub use transition_tracker::{Transition, TransitionKind, TransitionTracker};
