//! Error types for the Plugin API.
//!
//! All public APIs return `Result<T, PluginError>` for explicit error handling.
//! Errors are also convertible to `mlua::Error` for use in Lua callbacks.

use std::path::PathBuf;

use thiserror::Error;

use crate::hooks::HookError;
use crate::storage::StorageError;

/// Error type for Plugin API operations.
#[derive(Debug, Error)]
pub enum PluginError {
    /// Plugin source could not be read.
    #[error("Could not read plugin '{path}': {message}")]
    Read { path: PathBuf, message: String },

    /// Plugin body ran but never called `park.register_plugin`.
    #[error("Plugin '{0}' did not call park.register_plugin")]
    NotRegistered(String),

    /// Plugin needs a newer API than this engine provides.
    #[error("Plugin '{plugin}' requires API version {required}, engine provides {provided}")]
    ApiVersion {
        plugin: String,
        required: i64,
        provided: i64,
    },

    /// A call that needs an owning plugin ran outside any plugin.
    #[error("No plugin is currently executing")]
    NoCurrentPlugin,

    /// Game state mutation attempted from a read-only context.
    #[error("Game state is not mutable in this context")]
    NotMutable,

    /// Custom action name already taken.
    #[error("Custom action '{name}' is already registered by '{owner}'")]
    DuplicateAction { name: String, owner: String },

    /// Custom action name collides with a built-in action.
    #[error("'{0}' is a built-in action")]
    BuiltinAction(String),

    /// Invalid handle (component was unregistered).
    #[error("Invalid handle (component was unregistered)")]
    InvalidHandle,

    /// Socket limit reached.
    #[error("Too many open sockets (limit {0})")]
    TooManySockets(usize),

    /// Socket operation failed.
    #[error("Socket error: {0}")]
    Socket(String),

    /// Value could not cross the script boundary.
    #[error("Value conversion failed: {0}")]
    Conversion(String),

    #[error(transparent)]
    Hook(#[from] HookError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// File watcher could not be started.
    #[error("Watch error: {0}")]
    Watch(String),

    /// Lua runtime error.
    #[error("Lua error: {0}")]
    Lua(#[from] mlua::Error),
}

impl From<PluginError> for mlua::Error {
    fn from(e: PluginError) -> Self {
        mlua::Error::RuntimeError(e.to_string())
    }
}

/// Result type alias for Plugin API operations.
pub type PluginResult<T> = Result<T, PluginError>;
