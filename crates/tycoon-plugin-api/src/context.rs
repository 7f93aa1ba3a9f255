//! Which plugin is running, and whether it may mutate the game.
//!
//! Every call into script code enters a [`PluginScope`]. The scope swaps in
//! the callee's plugin and mutability and puts the previous pair back when it
//! is dropped, so early returns, `?` and unwinding all restore it.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::types::Plugin;

#[derive(Debug, Clone, Default)]
pub struct ExecutionFrame {
    pub plugin: Option<Arc<Plugin>>,
    pub mutable: bool,
}

/// Per-engine record of the current script caller.
#[derive(Debug, Default)]
pub struct ScriptExecutionInfo {
    current: Mutex<ExecutionFrame>,
}

impl ScriptExecutionInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `plugin` current until the returned scope drops.
    pub fn enter(&self, plugin: Option<Arc<Plugin>>, mutable: bool) -> PluginScope<'_> {
        let previous = std::mem::replace(
            &mut *self.current.lock(),
            ExecutionFrame { plugin, mutable },
        );
        PluginScope {
            info: self,
            previous: Some(previous),
        }
    }

    pub fn current_plugin(&self) -> Option<Arc<Plugin>> {
        self.current.lock().plugin.clone()
    }

    pub fn is_mutable(&self) -> bool {
        self.current.lock().mutable
    }

    pub fn frame(&self) -> ExecutionFrame {
        self.current.lock().clone()
    }
}

/// Restores the previous execution frame on drop.
#[must_use = "the scope ends as soon as it is dropped"]
pub struct PluginScope<'a> {
    info: &'a ScriptExecutionInfo,
    previous: Option<ExecutionFrame>,
}

impl Drop for PluginScope<'_> {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            *self.info.current.lock() = previous;
        }
    }
}
