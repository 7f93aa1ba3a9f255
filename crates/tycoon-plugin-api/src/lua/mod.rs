//! Lua bindings for the Plugin API.
//!
//! This module implements the `park` global namespace:
//! - `park.register_plugin(plugin)` - Register the loading plugin
//! - `park.subscribe(hook, fn)` / `park.unsubscribe(id)` - Hooks
//! - `park.register_action(name, query, execute)` - Custom actions
//! - `park.query_action(id, args)` / `park.execute_action(id, args)`
//! - `park.set_interval` / `park.set_timeout` / `park.clear_interval` / `park.clear_timeout`
//! - `park.money()` / `park.ride(id)` / `park.rides()` - Read-only park views
//! - `park.shared_storage` - Persistent key-value store
//! - `park.network.create_socket()` - Local TCP sockets (feature `network`)
//!
//! `print` is replaced so output lands in the log tagged with the plugin.

use std::sync::Arc;

use mlua::{Function, Lua, MultiValue, Result as LuaResult, Table, Value};
use tycoon_actions::world::Ride;
use tycoon_actions::ExecuteMode;
use tycoon_core::{ActionFlags, ActionKind};

use crate::custom_actions::CustomActionInfo;
use crate::engine::EngineShared;
use crate::error::PluginError;
use crate::handle::Handle;
use crate::hooks::HookType;
use crate::types::LuaFunctionRef;

pub mod bridge;
mod parse;
#[cfg(feature = "network")]
mod socket;

pub use bridge::{LuaValueBridge, ValueBridge};
pub use parse::parse_registration;

/// Version of the `park` API this engine provides.
pub const API_VERSION: i64 = 27;

/// Register the `park` API and the `print` override in a Lua state.
pub fn register_park_api(lua: &Lua, shared: Arc<EngineShared>) -> LuaResult<()> {
    let park = lua.create_table()?;
    park.set("api_version", API_VERSION)?;

    // park.register_plugin(plugin)
    {
        let shared = Arc::clone(&shared);
        let register_fn = lua.create_function(move |lua, table: Table| {
            let plugin = shared.current_plugin()?;
            if plugin.is_registered() {
                return Err(mlua::Error::RuntimeError(format!(
                    "Plugin '{}' is already registered",
                    plugin.name()
                )));
            }
            let registration = parse_registration(lua, table)?;
            plugin.set_registration(registration);
            Ok(())
        })?;
        park.set("register_plugin", register_fn)?;
    }

    // park.subscribe(hook, fn) -> id
    {
        let shared = Arc::clone(&shared);
        let subscribe_fn = lua.create_function(move |lua, (hook, callback): (String, Function)| {
            let plugin = shared.current_plugin()?;
            let kind = hook.parse::<HookType>().map_err(PluginError::from)?;
            let function = LuaFunctionRef::store(lua, callback, &format!("hook:{}", kind))?;
            Ok(shared.hooks.subscribe(kind, plugin, function).raw())
        })?;
        park.set("subscribe", subscribe_fn)?;
    }

    // park.unsubscribe(id) -> bool
    {
        let shared = Arc::clone(&shared);
        let unsubscribe_fn = lua.create_function(move |lua, id: u64| {
            let plugin = shared.current_plugin()?;
            let Some(handle) = Handle::from_raw(id) else {
                return Ok(false);
            };
            match shared.hooks.unsubscribe(plugin.id(), handle) {
                Some(entry) => {
                    entry.function.cleanup(lua)?;
                    Ok(true)
                }
                None => Ok(false),
            }
        })?;
        park.set("unsubscribe", unsubscribe_fn)?;
    }

    // park.register_action(name, query, execute)
    {
        let shared = Arc::clone(&shared);
        let register_action_fn = lua.create_function(
            move |lua, (name, query, execute): (String, Function, Function)| {
                let plugin = shared.current_plugin()?;
                let query = LuaFunctionRef::store(lua, query, &format!("action:{}:query", name))?;
                let execute =
                    LuaFunctionRef::store(lua, execute, &format!("action:{}:execute", name))?;
                let info = CustomActionInfo {
                    owner: plugin,
                    name,
                    query: query.clone(),
                    execute: execute.clone(),
                };
                if let Err(e) = shared.custom_actions.register(info) {
                    query.cleanup(lua)?;
                    execute.cleanup(lua)?;
                    return Err(e.into());
                }
                Ok(())
            },
        )?;
        park.set("register_action", register_action_fn)?;
    }

    // park.query_action(id, args) -> result
    {
        let shared = Arc::clone(&shared);
        let query_fn = lua.create_function(move |lua, (id, args): (String, Value)| {
            submit(lua, &shared, id, args, ExecuteMode::QueryOnly)
        })?;
        park.set("query_action", query_fn)?;
    }

    // park.execute_action(id, args) -> result
    {
        let shared = Arc::clone(&shared);
        let execute_fn = lua.create_function(move |lua, (id, args): (String, Value)| {
            if !shared.exec_info.is_mutable() {
                return Err(PluginError::NotMutable.into());
            }
            submit(lua, &shared, id, args, ExecuteMode::QueryThenApply)
        })?;
        park.set("execute_action", execute_fn)?;
    }

    // Timers
    for (name, repeat) in [("set_interval", true), ("set_timeout", false)] {
        let shared = Arc::clone(&shared);
        let add_fn = lua.create_function(move |lua, (callback, delay): (Function, u64)| {
            let plugin = shared.current_plugin()?;
            let callback = LuaFunctionRef::store(lua, callback, "interval")?;
            let now = shared.clock.now_ms();
            Ok(shared.intervals.add(plugin, delay, repeat, callback, now).raw())
        })?;
        park.set(name, add_fn)?;
    }
    for name in ["clear_interval", "clear_timeout"] {
        let shared = Arc::clone(&shared);
        let clear_fn = lua.create_function(move |lua, id: u64| {
            let plugin = shared.current_plugin()?;
            if let Some(interval) =
                Handle::from_raw(id).and_then(|h| shared.intervals.remove(plugin.id(), h))
            {
                interval.callback.cleanup(lua)?;
            }
            Ok(())
        })?;
        park.set(name, clear_fn)?;
    }

    // Park views
    {
        let shared = Arc::clone(&shared);
        let money_fn = lua.create_function(move |_, ()| Ok(shared.executor.world().lock().money))?;
        park.set("money", money_fn)?;
    }
    {
        let shared = Arc::clone(&shared);
        let ride_fn = lua.create_function(move |lua, id: u16| {
            let ride = shared.executor.world().lock().rides.get(&id).cloned();
            ride.map(|r| ride_to_table(lua, &r)).transpose()
        })?;
        park.set("ride", ride_fn)?;
    }
    {
        let shared = Arc::clone(&shared);
        let rides_fn = lua.create_function(move |lua, ()| {
            let rides: Vec<Ride> = shared.executor.world().lock().rides.values().cloned().collect();
            let list = lua.create_table_with_capacity(rides.len(), 0)?;
            for (i, ride) in rides.iter().enumerate() {
                list.raw_set(i + 1, ride_to_table(lua, ride)?)?;
            }
            Ok(list)
        })?;
        park.set("rides", rides_fn)?;
    }

    park.set("shared_storage", storage_table(lua, &shared)?)?;

    #[cfg(feature = "network")]
    park.set("network", socket::network_table(lua, &shared)?)?;

    lua.globals().set("park", park)?;

    // print(...) -> log
    {
        let shared = Arc::clone(&shared);
        let print_fn = lua.create_function(move |_, args: MultiValue| {
            let line = args
                .iter()
                .map(tycoon_lua_runtime::stringify)
                .collect::<Vec<_>>()
                .join("\t");
            let source = shared
                .exec_info
                .current_plugin()
                .map(|p| p.name())
                .unwrap_or_else(|| "console".to_string());
            tracing::info!(plugin = %source, "{}", line);
            Ok(())
        })?;
        lua.globals().set("print", print_fn)?;
    }

    Ok(())
}

fn submit(
    lua: &Lua,
    shared: &EngineShared,
    id: String,
    args: Value,
    mode: ExecuteMode,
) -> LuaResult<Table> {
    let params = LuaValueBridge::new(lua).decode(args)?;
    let result = shared
        .executor
        .submit_request(ActionKind::from(id), params, ActionFlags::empty(), mode);
    bridge::result_to_table(lua, &result)
}

fn ride_to_table(lua: &Lua, ride: &Ride) -> LuaResult<Table> {
    let table = lua.create_table()?;
    table.set("id", ride.id)?;
    table.set("name", ride.name.as_str())?;
    table.set("type", ride.ride_type)?;
    table.set("entry", ride.entry)?;
    table.set("mode", ride.mode)?;
    table.set("num_trains", ride.num_trains)?;
    table.set("cars_per_train", ride.cars_per_train)?;
    table.set("vehicle_colour", ride.vehicle_colour)?;
    table.set("ghost", ride.ghost)?;
    table.set("tiles", ride.tiles.len())?;
    Ok(table)
}

// park.shared_storage.get(key, default?) / set(key, value) / has(key)
fn storage_table(lua: &Lua, shared: &Arc<EngineShared>) -> LuaResult<Table> {
    let storage = lua.create_table()?;
    {
        let shared = Arc::clone(shared);
        let get_fn = lua.create_function(move |lua, (key, default): (String, Value)| {
            match shared.storage.get(&key) {
                Some(value) => Ok(LuaValueBridge::new(lua).encode(&value)?),
                None => Ok(default),
            }
        })?;
        storage.set("get", get_fn)?;
    }
    {
        let shared = Arc::clone(shared);
        let set_fn = lua.create_function(move |lua, (key, value): (String, Value)| {
            let value = LuaValueBridge::new(lua).decode(value)?;
            shared.storage.set(&key, value).map_err(PluginError::from)?;
            Ok(())
        })?;
        storage.set("set", set_fn)?;
    }
    {
        let shared = Arc::clone(shared);
        let has_fn = lua.create_function(move |_, key: String| Ok(shared.storage.has(&key)))?;
        storage.set("has", has_fn)?;
    }
    Ok(storage)
}
