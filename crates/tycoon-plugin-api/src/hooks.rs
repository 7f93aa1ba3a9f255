//! Hook Engine.
//!
//! Plugins subscribe Lua callbacks to a [`HookType`]. Dispatch order is
//! subscription order across all plugins.
//!
//! ## Hook types
//!
//! - `action.query` - after a top-level action's query, before it is applied.
//!   Callbacks may veto by setting `event.result.error`. Runs read-only.
//! - `action.execute` - after a top-level action was applied.
//! - `interval.tick` - once per engine update.
//!
//! ## Error isolation
//!
//! A failing callback is logged with its plugin's name and the remaining
//! callbacks still run. The actual calling happens in the engine; this module
//! only stores subscriptions and hands out cloned snapshots of them.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::handle::{Handle, OwnedRegistry};
use crate::types::{LuaFunctionRef, Plugin, PluginId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookType {
    ActionQuery,
    ActionExecute,
    IntervalTick,
}

impl HookType {
    pub fn as_str(&self) -> &'static str {
        match self {
            HookType::ActionQuery => "action.query",
            HookType::ActionExecute => "action.execute",
            HookType::IntervalTick => "interval.tick",
        }
    }
}

impl fmt::Display for HookType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HookType {
    type Err = HookError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "action.query" => Ok(HookType::ActionQuery),
            "action.execute" => Ok(HookType::ActionExecute),
            "interval.tick" => Ok(HookType::IntervalTick),
            _ => Err(HookError::InvalidType(format!(
                "'{}'. Expected 'action.query', 'action.execute', or 'interval.tick'",
                s
            ))),
        }
    }
}

/// A registered hook entry.
#[derive(Debug, Clone)]
pub struct HookEntry {
    pub kind: HookType,
    pub owner: Arc<Plugin>,
    pub function: LuaFunctionRef,
}

/// Registry for storing hooks.
#[derive(Default)]
pub struct HookEngine {
    entries: RwLock<OwnedRegistry<HookEntry>>,
}

impl HookEngine {
    /// Create a new empty hook engine.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `function` to `kind` on behalf of `owner`.
    pub fn subscribe(&self, kind: HookType, owner: Arc<Plugin>, function: LuaFunctionRef) -> Handle {
        let owner_id = owner.id();
        let handle = self.entries.write().insert(
            owner_id,
            HookEntry {
                kind,
                owner,
                function,
            },
        );
        tracing::debug!("Added hook '{}' for plugin {} (id: {})", kind, owner_id, handle.raw());
        handle
    }

    /// Remove one subscription, if `owner` created it.
    pub fn unsubscribe(&self, owner: PluginId, handle: Handle) -> Option<HookEntry> {
        let removed = self.entries.write().remove_owned(owner, handle);
        if removed.is_some() {
            tracing::debug!("Removed hook (id: {})", handle.raw());
        }
        removed
    }

    /// Remove every subscription `owner` holds.
    pub fn unsubscribe_all(&self, owner: PluginId) -> Vec<HookEntry> {
        self.entries.write().remove_owner(owner)
    }

    /// Subscribers of `kind` in subscription order.
    pub fn subscribers(&self, kind: HookType) -> Vec<HookEntry> {
        self.entries
            .read()
            .iter()
            .filter(|(_, _, e)| e.kind == kind)
            .map(|(_, _, e)| e.clone())
            .collect()
    }

    pub fn has_subscribers(&self, kind: HookType) -> bool {
        self.entries.read().iter().any(|(_, _, e)| e.kind == kind)
    }

    pub fn count(&self, kind: HookType) -> usize {
        self.entries
            .read()
            .iter()
            .filter(|(_, _, e)| e.kind == kind)
            .count()
    }
}

/// Errors that can occur during hook operations.
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("Invalid hook type {0}")]
    InvalidType(String),
}
