//! Script Engine
//!
//! One [`ScriptEngine`] owns one interpreter and everything plugins can
//! register in it. It is explicitly constructed and explicitly shut down;
//! several engines can live side by side in one process.
//!
//! ## Update order
//!
//! ```text
//! update()
//!    │
//!    ▼
//! 1. drain console queue ── resolves EvalHandles
//!    │
//!    ▼
//! 2. hot reload drain ───── stop, load, start changed plugins
//!    │
//!    ▼
//! 3. interval.tick hooks, then due intervals
//!    │
//!    ▼
//! 4. socket service ─────── data / close / error handlers
//! ```
//!
//! No script code runs outside `update()` except callbacks reached through
//! the action executor, which runs on the same thread.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use mlua::{Lua, Result as LuaResult};
use parking_lot::{Mutex, RwLock};
use tycoon_actions::{ActionExecutor, ScriptBridge};
use tycoon_core::EngineConfig;
use tycoon_lua_runtime::{create_sandboxed_lua, eval_to_string, ConsoleHandle, EvalQueue};

use crate::clock::{Clock, SystemClock};
use crate::context::ScriptExecutionInfo;
use crate::custom_actions::CustomActionRegistry;
use crate::error::{PluginError, PluginResult};
use crate::hooks::{HookEngine, HookType};
use crate::intervals::IntervalScheduler;
use crate::lua::register_park_api;
#[cfg(feature = "network")]
use crate::sockets::SocketRegistry;
use crate::storage::SharedStorage;
use crate::types::{LuaFunctionRef, Plugin};
use crate::watcher::PluginWatcher;

mod bridge;
mod lifecycle;

use bridge::LuaActionBridge;

// =============================================================================
// Shared state
// =============================================================================

/// State reachable from the `park` API closures and the executor bridge.
pub struct EngineShared {
    pub(crate) exec_info: ScriptExecutionInfo,
    pub(crate) hooks: HookEngine,
    pub(crate) custom_actions: CustomActionRegistry,
    pub(crate) intervals: IntervalScheduler,
    #[cfg(feature = "network")]
    pub(crate) sockets: SocketRegistry,
    pub(crate) storage: SharedStorage,
    pub(crate) executor: Arc<ActionExecutor>,
    pub(crate) plugins: RwLock<Vec<Arc<Plugin>>>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) config: EngineConfig,
}

impl EngineShared {
    /// The plugin whose code is running, for calls that record an owner.
    pub(crate) fn current_plugin(&self) -> PluginResult<Arc<Plugin>> {
        self.exec_info
            .current_plugin()
            .ok_or(PluginError::NoCurrentPlugin)
    }

    /// Call a stored function as `owner`.
    pub(crate) fn call_as<A, R>(
        &self,
        lua: &Lua,
        owner: &Arc<Plugin>,
        mutable: bool,
        function: &LuaFunctionRef,
        args: A,
    ) -> LuaResult<R>
    where
        A: mlua::IntoLuaMulti,
        R: mlua::FromLuaMulti,
    {
        let _scope = self.exec_info.enter(Some(Arc::clone(owner)), mutable);
        function.call(lua, args)
    }
}

// =============================================================================
// Script Engine
// =============================================================================

type StoppedCallback = Arc<dyn Fn(&Plugin) + Send + Sync>;

pub struct ScriptEngine {
    lua: Lua,
    shared: Arc<EngineShared>,
    /// Kept alive here; the executor only holds it weakly.
    _bridge: Arc<dyn ScriptBridge>,
    console: EvalQueue,
    watcher: PluginWatcher,
    last_reload_drain: Mutex<Option<u64>>,
    stopped_subscribers: Mutex<Vec<(u64, StoppedCallback)>>,
    next_subscriber: AtomicU64,
}

impl ScriptEngine {
    pub fn new(config: EngineConfig, executor: Arc<ActionExecutor>) -> PluginResult<Self> {
        Self::with_clock(config, executor, Arc::new(SystemClock::new()))
    }

    pub fn with_clock(
        config: EngineConfig,
        executor: Arc<ActionExecutor>,
        clock: Arc<dyn Clock>,
    ) -> PluginResult<Self> {
        let lua = create_sandboxed_lua()?;
        let storage = SharedStorage::load(&config.shared_storage_path);

        let watcher = if config.hot_reload && config.plugin_dir.is_dir() {
            PluginWatcher::watch(&config.plugin_dir).unwrap_or_else(|e| {
                tracing::warn!("Hot reload disabled: {}", e);
                PluginWatcher::manual()
            })
        } else {
            PluginWatcher::manual()
        };

        let shared = Arc::new(EngineShared {
            exec_info: ScriptExecutionInfo::new(),
            hooks: HookEngine::new(),
            custom_actions: CustomActionRegistry::new(),
            intervals: IntervalScheduler::new(),
            #[cfg(feature = "network")]
            sockets: SocketRegistry::new(config.max_sockets),
            storage,
            executor: Arc::clone(&executor),
            plugins: RwLock::new(Vec::new()),
            clock,
            config,
        });
        register_park_api(&lua, Arc::clone(&shared))?;

        let bridge: Arc<dyn ScriptBridge> =
            Arc::new(LuaActionBridge::new(lua.clone(), Arc::clone(&shared)));
        executor.set_bridge(Arc::downgrade(&bridge));

        tracing::info!("Script engine initialised");
        Ok(Self {
            lua,
            shared,
            _bridge: bridge,
            console: EvalQueue::new(),
            watcher,
            last_reload_drain: Mutex::new(None),
            stopped_subscribers: Mutex::new(Vec::new()),
            next_subscriber: AtomicU64::new(1),
        })
    }

    pub fn lua(&self) -> &Lua {
        &self.lua
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    pub fn executor(&self) -> Arc<ActionExecutor> {
        Arc::clone(&self.shared.executor)
    }

    pub fn exec_info(&self) -> &ScriptExecutionInfo {
        &self.shared.exec_info
    }

    pub fn hooks(&self) -> &HookEngine {
        &self.shared.hooks
    }

    pub fn custom_actions(&self) -> &CustomActionRegistry {
        &self.shared.custom_actions
    }

    pub fn intervals(&self) -> &IntervalScheduler {
        &self.shared.intervals
    }

    #[cfg(feature = "network")]
    pub fn sockets(&self) -> &SocketRegistry {
        &self.shared.sockets
    }

    pub fn storage(&self) -> &SharedStorage {
        &self.shared.storage
    }

    pub fn watcher(&self) -> &PluginWatcher {
        &self.watcher
    }

    /// Queue console snippets from any thread.
    pub fn console_handle(&self) -> ConsoleHandle {
        self.console.handle()
    }

    /// Active plugins in load order.
    pub fn plugins(&self) -> Vec<Arc<Plugin>> {
        self.shared.plugins.read().clone()
    }

    pub fn plugin(&self, name: &str) -> Option<Arc<Plugin>> {
        self.shared
            .plugins
            .read()
            .iter()
            .find(|p| p.name() == name)
            .cloned()
    }

    // =========================================================================
    // Plugin-stopped notifications
    // =========================================================================

    pub fn subscribe_plugin_stopped(&self, callback: impl Fn(&Plugin) + Send + Sync + 'static) -> u64 {
        let id = self.next_subscriber.fetch_add(1, Ordering::SeqCst);
        self.stopped_subscribers.lock().push((id, Arc::new(callback)));
        id
    }

    pub fn unsubscribe_plugin_stopped(&self, id: u64) -> bool {
        let mut subscribers = self.stopped_subscribers.lock();
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        subscribers.len() != before
    }

    fn notify_stopped(&self, plugin: &Plugin) {
        let subscribers: Vec<StoppedCallback> = self
            .stopped_subscribers
            .lock()
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        for callback in subscribers {
            callback(plugin);
        }
    }

    // =========================================================================
    // Update
    // =========================================================================

    /// Run one cooperative tick.
    pub fn update(&self) {
        self.drain_console();
        self.drain_hot_reload();
        self.fire_intervals();
        #[cfg(feature = "network")]
        self.service_sockets();
    }

    fn drain_console(&self) {
        let count = self.console.drain(|code| {
            let _scope = self.shared.exec_info.enter(None, true);
            eval_to_string(&self.lua, code)
        });
        if count > 0 {
            tracing::debug!("Evaluated {} console snippets", count);
        }
    }

    fn drain_hot_reload(&self) {
        if !self.shared.config.hot_reload {
            return;
        }
        let now = self.shared.clock.now_ms();
        {
            let mut last = self.last_reload_drain.lock();
            if let Some(previous) = *last {
                if now.saturating_sub(previous) < self.shared.config.hot_reload_interval_ms {
                    return;
                }
            }
            *last = Some(now);
        }

        for path in self.watcher.drain() {
            let existing = self
                .plugins()
                .into_iter()
                .find(|p| p.path() == Some(path.as_path()));
            match existing {
                Some(plugin) => {
                    if let Err(e) = self.reload_plugin(&plugin) {
                        tracing::error!("Reload of {} failed: {}", path.display(), e);
                    }
                }
                None if lifecycle::is_plugin_file(&path) && path.is_file() => {
                    match self.load_plugin(&path) {
                        Ok(plugin) => {
                            self.start_plugin(&plugin);
                        }
                        Err(e) => tracing::error!("Loading new plugin failed: {}", e),
                    }
                }
                None => {}
            }
        }
    }

    fn fire_intervals(&self) {
        for entry in self.shared.hooks.subscribers(HookType::IntervalTick) {
            if let Err(e) = self
                .shared
                .call_as::<_, ()>(&self.lua, &entry.owner, true, &entry.function, ())
            {
                tracing::error!(plugin = %entry.owner.name(), "interval.tick hook failed: {}", e);
            }
        }

        let now = self.shared.clock.now_ms();
        for handle in self.shared.intervals.due(now) {
            // A callback may have cleared a later one.
            let Some(due) = self.shared.intervals.begin_fire(handle, now) else {
                continue;
            };
            if let Err(e) =
                self.shared
                    .call_as::<_, ()>(&self.lua, &due.owner, true, &due.callback, ())
            {
                tracing::error!(plugin = %due.owner.name(), "Interval {} failed: {}", handle.raw(), e);
            }
            if due.finished {
                let _ = due.callback.cleanup(&self.lua);
            }
        }
    }

    #[cfg(feature = "network")]
    fn service_sockets(&self) {
        for event in self.shared.sockets.service() {
            let payload = match event.payload.as_deref().map(|bytes| self.lua.create_string(bytes)) {
                Some(Ok(text)) => Some(text),
                Some(Err(e)) => {
                    tracing::error!("Socket {} payload dropped: {}", event.handle.raw(), e);
                    continue;
                }
                None => None,
            };
            if let Err(e) = self.shared.call_as::<_, ()>(
                &self.lua,
                &event.owner,
                true,
                &event.callback,
                payload,
            ) {
                tracing::error!(
                    plugin = %event.owner.name(),
                    "Socket {} {:?} handler failed: {}",
                    event.handle.raw(),
                    event.kind,
                    e
                );
            }
        }
    }

    /// Stop every plugin, flush storage and detach from the executor.
    pub fn shutdown(&self) {
        for plugin in self.plugins().into_iter().rev() {
            self.stop_plugin(&plugin);
        }
        if let Err(e) = self.shared.storage.save() {
            tracing::error!("Could not save shared storage: {}", e);
        }
        self.shared.executor.clear_bridge();
        tracing::info!("Script engine shut down");
    }
}
