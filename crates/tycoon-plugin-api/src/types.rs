//! Core types for the Plugin API.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use mlua::{Function, Lua, Result as LuaResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Lua Function Reference
// =============================================================================

/// Global counter for generating unique function keys.
static FUNCTION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A reference to a Lua function stored in the registry.
///
/// Lua functions are kept in the interpreter's named registry under a unique
/// string key; registries on the Rust side hold only the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LuaFunctionRef {
    /// The key used to look up this function in Lua's named registry.
    pub key: String,
}

impl LuaFunctionRef {
    /// Create a new function reference with a key.
    pub fn new(key: String) -> Self {
        Self { key }
    }

    /// Store a function under a fresh `{prefix}:{n}` key.
    pub fn store(lua: &Lua, func: Function, prefix: &str) -> LuaResult<Self> {
        let id = FUNCTION_COUNTER.fetch_add(1, Ordering::SeqCst);
        let key = format!("{}:{}", prefix, id);
        lua.set_named_registry_value(&key, func)?;
        tracing::debug!("Stored Lua function '{}'", key);
        Ok(Self { key })
    }

    pub fn function(&self, lua: &Lua) -> LuaResult<Function> {
        lua.named_registry_value::<Function>(&self.key)
    }

    /// Retrieve the function from the registry and call it.
    pub fn call<A, R>(&self, lua: &Lua, args: A) -> LuaResult<R>
    where
        A: mlua::IntoLuaMulti,
        R: mlua::FromLuaMulti,
    {
        self.function(lua)?.call(args)
    }

    /// Remove the function from the registry.
    pub fn cleanup(&self, lua: &Lua) -> LuaResult<()> {
        lua.unset_named_registry_value(&self.key)
    }
}

// =============================================================================
// Plugin
// =============================================================================

/// Identity of one loaded plugin instance. A reload gets a new id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PluginId(Uuid);

impl PluginId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PluginId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PluginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginType {
    /// Runs only on this machine.
    #[default]
    Local,
    /// Distributed to every peer of a replicated session.
    Remote,
    /// Loaded once and kept across park changes.
    Intransient,
}

impl FromStr for PluginType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(PluginType::Local),
            "remote" => Ok(PluginType::Remote),
            "intransient" => Ok(PluginType::Intransient),
            other => Err(format!(
                "Invalid plugin type '{}'. Expected 'local', 'remote', or 'intransient'",
                other
            )),
        }
    }
}

/// Fields passed to `park.register_plugin`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginMetadata {
    pub name: String,
    pub version: Option<String>,
    pub authors: Vec<String>,
    pub plugin_type: PluginType,
    pub licence: Option<String>,
    pub min_api_version: Option<i64>,
    pub target_api_version: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginState {
    Loaded,
    Started,
    Stopped,
}

/// Metadata and entry points captured during load.
#[derive(Debug, Clone)]
pub struct PluginRegistration {
    pub metadata: PluginMetadata,
    pub main: LuaFunctionRef,
    pub shutdown: Option<LuaFunctionRef>,
}

/// A loaded script module.
pub struct Plugin {
    id: PluginId,
    path: Option<PathBuf>,
    code: String,
    state: Mutex<PluginState>,
    registration: Mutex<Option<PluginRegistration>>,
}

impl Plugin {
    pub fn new(path: Option<PathBuf>, code: String) -> Self {
        Self {
            id: PluginId::new(),
            path,
            code,
            state: Mutex::new(PluginState::Loaded),
            registration: Mutex::new(None),
        }
    }

    pub fn id(&self) -> PluginId {
        self.id
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn has_path(&self) -> bool {
        self.path.is_some()
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn state(&self) -> PluginState {
        *self.state.lock()
    }

    pub(crate) fn set_state(&self, state: PluginState) {
        *self.state.lock() = state;
    }

    /// Registered name, falling back to the file name.
    pub fn name(&self) -> String {
        if let Some(reg) = self.registration.lock().as_ref() {
            return reg.metadata.name.clone();
        }
        self.path
            .as_ref()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "<network>".to_string())
    }

    pub fn metadata(&self) -> Option<PluginMetadata> {
        self.registration
            .lock()
            .as_ref()
            .map(|r| r.metadata.clone())
    }

    pub fn registration(&self) -> Option<PluginRegistration> {
        self.registration.lock().clone()
    }

    pub fn is_registered(&self) -> bool {
        self.registration.lock().is_some()
    }

    pub(crate) fn set_registration(&self, registration: PluginRegistration) {
        *self.registration.lock() = Some(registration);
    }

    pub(crate) fn take_registration(&self) -> Option<PluginRegistration> {
        self.registration.lock().take()
    }
}

impl fmt::Debug for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plugin")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("path", &self.path)
            .field("state", &self.state())
            .finish()
    }
}
