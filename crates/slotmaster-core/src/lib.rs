//! slotmaster-core — shared types, configuration and size helpers.
//!
//! Used by the coordinator, the cluster client implementations and the
//! daemon binary.

pub mod config;
pub mod error;
pub mod size;
pub mod types;

pub use config::CoordinatorConfig;
pub use error::ConfigError;
pub use types::*;
