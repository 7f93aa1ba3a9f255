//! Core types for the tycoon action framework.
//!
//! This crate contains shared data structures that are used across all tycoon crates:
//! - Action status, result, flags, kind and replay record
//! - Engine configuration
//! - Error types

mod action;
mod config;
mod error;

pub use action::{
    ActionFlags, ActionKind, ActionRecord, ActionResult, ActionStatus, Coords, Money,
};
pub use config::{config_dir, config_path, ensure_config_dir, EngineConfig, NetworkMode};
pub use error::{ActionError, ConfigError};
