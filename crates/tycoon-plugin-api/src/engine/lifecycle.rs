//! Plugin loading, starting, stopping and reloading.
//!
//! ```text
//! load ──► Loaded ──start──► Started
//!            │                  │
//!            └──────stop────────┴──► Stopped (a reload makes a new Plugin)
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use mlua::Table;
use tycoon_core::NetworkMode;

use crate::error::{PluginError, PluginResult};
use crate::lua::API_VERSION;
use crate::types::{LuaFunctionRef, Plugin, PluginRegistration, PluginState, PluginType};

use super::ScriptEngine;

impl ScriptEngine {
    // =========================================================================
    // Loading
    // =========================================================================

    /// Load every `.lua` file under the plugin directory, skipping hidden
    /// files and directories. Failures are logged and skipped.
    pub fn load_plugins(&self) -> Vec<Arc<Plugin>> {
        let mut files = Vec::new();
        collect_plugin_files(&self.shared.config.plugin_dir, &mut files);
        files.sort();
        files
            .iter()
            .filter_map(|path| self.load_plugin(path).ok())
            .collect()
    }

    /// Parse and run a plugin file. On failure nothing stays registered.
    pub fn load_plugin(&self, path: &Path) -> PluginResult<Arc<Plugin>> {
        let code = std::fs::read_to_string(path).map_err(|e| {
            let err = PluginError::Read {
                path: path.to_path_buf(),
                message: e.to_string(),
            };
            tracing::error!("{}", err);
            err
        })?;
        self.load_code(Some(path.to_path_buf()), code)
    }

    /// Load and start a plugin a server sent us.
    pub fn add_network_plugin(&self, code: impl Into<String>) -> PluginResult<Arc<Plugin>> {
        let plugin = self.load_code(None, code.into())?;
        self.start_plugin(&plugin);
        Ok(plugin)
    }

    fn load_code(&self, path: Option<PathBuf>, code: String) -> PluginResult<Arc<Plugin>> {
        let plugin = Arc::new(Plugin::new(path, code));

        if let Err(e) = self.evaluate(&plugin) {
            let name = plugin.name();
            self.revoke(&plugin);
            if let Some(registration) = plugin.take_registration() {
                self.release_registration(&registration);
            }
            tracing::error!(plugin = %name, "Failed to load plugin: {}", e);
            return Err(e);
        }

        self.shared.plugins.write().push(Arc::clone(&plugin));
        tracing::info!(plugin = %plugin.name(), "Loaded plugin");
        Ok(plugin)
    }

    /// Run the plugin body in its own environment and check what it registered.
    fn evaluate(&self, plugin: &Arc<Plugin>) -> PluginResult<()> {
        let env: Table = self
            .lua
            .load("return setmetatable({}, { __index = _G })")
            .eval()?;
        {
            let _scope = self.shared.exec_info.enter(Some(Arc::clone(plugin)), false);
            self.lua
                .load(plugin.code())
                .set_name(format!("@{}", plugin.name()))
                .set_environment(env)
                .exec()?;
        }

        let metadata = plugin
            .metadata()
            .ok_or_else(|| PluginError::NotRegistered(plugin.name()))?;
        if let Some(required) = metadata.min_api_version {
            if required > API_VERSION {
                return Err(PluginError::ApiVersion {
                    plugin: metadata.name,
                    required,
                    provided: API_VERSION,
                });
            }
        }
        Ok(())
    }

    // =========================================================================
    // Starting
    // =========================================================================

    /// Run a loaded plugin's `main`. Returns whether it is now started.
    ///
    /// A failing `main` leaves the plugin loaded.
    pub fn start_plugin(&self, plugin: &Arc<Plugin>) -> bool {
        if plugin.state() != PluginState::Loaded {
            return plugin.state() == PluginState::Started;
        }
        let Some(registration) = plugin.registration() else {
            return false;
        };
        if !self.may_start(plugin, registration.metadata.plugin_type) {
            tracing::warn!(
                plugin = %plugin.name(),
                "Not starting remote plugin; the server provides it"
            );
            return false;
        }

        match self
            .shared
            .call_as::<_, ()>(&self.lua, plugin, true, &registration.main, ())
        {
            Ok(()) => {
                plugin.set_state(PluginState::Started);
                tracing::info!(plugin = %plugin.name(), "Started plugin");
                true
            }
            Err(e) => {
                tracing::error!(plugin = %plugin.name(), "Failed to start plugin: {}", e);
                false
            }
        }
    }

    /// Start every loaded plugin. Returns how many are running afterwards.
    pub fn start_plugins(&self) -> usize {
        self.plugins()
            .iter()
            .filter(|plugin| self.start_plugin(plugin))
            .count()
    }

    fn may_start(&self, plugin: &Plugin, plugin_type: PluginType) -> bool {
        !(self.shared.config.network_mode == NetworkMode::Client
            && plugin_type == PluginType::Remote
            && plugin.has_path())
    }

    // =========================================================================
    // Stopping
    // =========================================================================

    /// Stop a plugin and revoke everything it registered.
    ///
    /// Order: shutdown callback, custom actions, hooks, intervals, sockets,
    /// removal from the active set, then stopped notifications.
    pub fn stop_plugin(&self, plugin: &Arc<Plugin>) {
        if plugin.state() == PluginState::Stopped {
            return;
        }

        let registration = plugin.registration();
        if plugin.state() == PluginState::Started {
            if let Some(shutdown) = registration.as_ref().and_then(|r| r.shutdown.as_ref()) {
                if let Err(e) = self
                    .shared
                    .call_as::<_, ()>(&self.lua, plugin, true, shutdown, ())
                {
                    tracing::error!(plugin = %plugin.name(), "Shutdown failed: {}", e);
                }
            }
        }

        self.revoke(plugin);
        if let Some(registration) = &registration {
            self.release_registration(registration);
        }

        self.shared.plugins.write().retain(|p| p.id() != plugin.id());
        plugin.set_state(PluginState::Stopped);
        tracing::info!(plugin = %plugin.name(), "Stopped plugin");

        self.notify_stopped(plugin);
    }

    /// Stop, load again from the same source, and start the fresh plugin.
    pub fn reload_plugin(&self, plugin: &Arc<Plugin>) -> PluginResult<Arc<Plugin>> {
        tracing::info!(plugin = %plugin.name(), "Reloading plugin");
        self.stop_plugin(plugin);
        let fresh = match plugin.path() {
            Some(path) => self.load_plugin(path)?,
            None => self.load_code(None, plugin.code().to_string())?,
        };
        self.start_plugin(&fresh);
        Ok(fresh)
    }

    fn revoke(&self, plugin: &Plugin) {
        let id = plugin.id();
        for info in self.shared.custom_actions.unregister_plugin(id) {
            self.release(&info.query);
            self.release(&info.execute);
        }
        for entry in self.shared.hooks.unsubscribe_all(id) {
            self.release(&entry.function);
        }
        for interval in self.shared.intervals.remove_plugin(id) {
            self.release(&interval.callback);
        }
        #[cfg(feature = "network")]
        for socket in self.shared.sockets.remove_plugin(id) {
            for callback in socket.into_handlers() {
                self.release(&callback);
            }
        }
    }

    fn release_registration(&self, registration: &PluginRegistration) {
        self.release(&registration.main);
        if let Some(shutdown) = &registration.shutdown {
            self.release(shutdown);
        }
    }

    fn release(&self, function: &LuaFunctionRef) {
        if let Err(e) = function.cleanup(&self.lua) {
            tracing::debug!("Could not release '{}': {}", function.key, e);
        }
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'))
}

/// Whether `path` names a loadable script file.
pub(super) fn is_plugin_file(path: &Path) -> bool {
    !is_hidden(path) && path.extension().and_then(|e| e.to_str()) == Some("lua")
}

fn collect_plugin_files(dir: &Path, out: &mut Vec<PathBuf>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!("Could not scan {}: {}", dir.display(), e);
            return;
        }
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if is_hidden(&path) {
            continue;
        }
        if path.is_dir() {
            collect_plugin_files(&path, out);
        } else if is_plugin_file(&path) {
            out.push(path);
        }
    }
}
