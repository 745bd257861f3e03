//! A3S Delta Core - Foundational Types
//!
//! Configuration, worklist entries, error taxonomy and events shared by the
//! A3S Delta runtime and CLI.

pub mod config;
pub mod error;
pub mod event;
pub mod worklist;

// Re-export commonly used types
pub use config::{DeltaConfig, LogLevel};
pub use error::{DeltaError, Result};
pub use event::{DeltaEvent, EventEmitter, EventPayload, Phase};
pub use worklist::{ImageEntry, RawEntry, WorkList};

/// A3S Delta version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
