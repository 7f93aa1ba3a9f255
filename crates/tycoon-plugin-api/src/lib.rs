//! Plugin API for the tycoon simulation.
//!
//! This crate provides the Lua plugin system including:
//! - Plugin loading, starting, stopping and hot reload
//! - Action hooks that can veto or observe every top-level action
//! - Script-defined custom actions run through the action executor
//! - Intervals and timeouts driven by the engine's update tick
//! - Persistent shared storage and local TCP sockets

pub mod clock;
pub mod context;
pub mod custom_actions;
pub mod engine;
pub mod error;
pub mod handle;
pub mod hooks;
pub mod intervals;
pub mod lua;
#[cfg(feature = "network")]
pub mod sockets;
pub mod storage;
pub mod types;
pub mod watcher;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use context::{ExecutionFrame, ScriptExecutionInfo};
pub use engine::{EngineShared, ScriptEngine};
pub use error::{PluginError, PluginResult};
pub use handle::Handle;
pub use hooks::{HookEngine, HookError, HookType};
pub use lua::{register_park_api, LuaValueBridge, ValueBridge, API_VERSION};
pub use storage::{SharedStorage, StorageError};
pub use types::{LuaFunctionRef, Plugin, PluginId, PluginMetadata, PluginState, PluginType};

// Re-export tycoon_core types for convenience
pub use tycoon_core::{ActionResult, ActionStatus, EngineConfig, NetworkMode};
