//! Script-defined actions, keyed by name.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tycoon_core::ActionKind;

use crate::error::{PluginError, PluginResult};
use crate::types::{LuaFunctionRef, Plugin, PluginId};

#[derive(Debug, Clone)]
pub struct CustomActionInfo {
    pub owner: Arc<Plugin>,
    pub name: String,
    pub query: LuaFunctionRef,
    pub execute: LuaFunctionRef,
}

#[derive(Default)]
pub struct CustomActionRegistry {
    actions: RwLock<HashMap<String, CustomActionInfo>>,
}

impl CustomActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an action. Fails without side effects if the name is taken.
    pub fn register(&self, info: CustomActionInfo) -> PluginResult<()> {
        if !ActionKind::from(info.name.as_str()).is_custom() {
            return Err(PluginError::BuiltinAction(info.name));
        }
        let mut actions = self.actions.write();
        if let Some(existing) = actions.get(&info.name) {
            return Err(PluginError::DuplicateAction {
                name: info.name,
                owner: existing.owner.name(),
            });
        }
        tracing::info!(
            plugin = %info.owner.name(),
            "Registered custom action '{}'",
            info.name
        );
        actions.insert(info.name.clone(), info);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<CustomActionInfo> {
        self.actions.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.actions.read().contains_key(name)
    }

    /// Remove every action `owner` registered.
    pub fn unregister_plugin(&self, owner: PluginId) -> Vec<CustomActionInfo> {
        let mut actions = self.actions.write();
        let names: Vec<String> = actions
            .iter()
            .filter(|(_, info)| info.owner.id() == owner)
            .map(|(name, _)| name.clone())
            .collect();
        names
            .into_iter()
            .filter_map(|name| actions.remove(&name))
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.actions.read().keys().cloned().collect();
        names.sort();
        names
    }
}
