//! Error types shared across the tycoon crates.

use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No config directory found.
    #[error("Config directory not found")]
    NoConfigDir,

    /// IO error.
    #[error("IO error: {0}")]
    Io(String),

    /// Parse error.
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Errors raised while building an action from a request.
///
/// These never escape the executor; it turns them into failed results.
#[derive(Debug, Error)]
pub enum ActionError {
    /// The parameter payload did not match the action's fields.
    #[error("Invalid parameters for '{kind}': {message}")]
    InvalidParameters { kind: String, message: String },

    /// Parameters could not be serialised for the replay log.
    #[error("Could not serialise '{kind}': {message}")]
    Serialize { kind: String, message: String },
}
