//! Infrastructure - configuration, metrics, time and errors
//!
//! This module contains infrastructure concerns:
//! - `config` - Application configuration (TOML loading, defaults)
//! - `metrics` - Lock-free metrics collection
//! - `clock` - Injectable clock and random source
//! - `error` - Error taxonomy

pub mod clock;
pub mod config;
pub mod error;
pub mod metrics;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, RandomSource, SeededRandom, SystemClock, ThreadRandom};
pub use config::Config;
pub use error::{EngineError, PositionError};
pub use metrics::Metrics;
