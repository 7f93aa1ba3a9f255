//! The executor's view of the script engine.

use std::sync::Arc;

use mlua::{Lua, Table};
use tycoon_actions::{Phase, ScriptBridge};
use tycoon_core::{ActionRecord, ActionResult, ActionStatus};

use crate::error::PluginResult;
use crate::hooks::HookType;
use crate::lua::bridge::{apply_hook_result, result_from_value, result_to_table};
use crate::lua::{LuaValueBridge, ValueBridge};

use super::EngineShared;

pub(crate) struct LuaActionBridge {
    lua: Lua,
    shared: Arc<EngineShared>,
}

impl LuaActionBridge {
    pub(crate) fn new(lua: Lua, shared: Arc<EngineShared>) -> Self {
        Self { lua, shared }
    }

    fn hook_event(
        &self,
        kind: HookType,
        phase: Phase,
        record: &ActionRecord,
        result: &ActionResult,
    ) -> PluginResult<Table> {
        let event = self.lua.create_table()?;
        event.set("type", kind.as_str())?;
        event.set("action", record.kind.as_str())?;
        event.set("args", LuaValueBridge::new(&self.lua).encode(&record.params)?)?;
        event.set("flags", record.flags)?;
        event.set("is_execute", phase == Phase::Execute)?;
        event.set("result", result_to_table(&self.lua, result)?)?;
        Ok(event)
    }
}

impl ScriptBridge for LuaActionBridge {
    fn dispatch_action_hook(&self, phase: Phase, record: &ActionRecord, result: &mut ActionResult) {
        let kind = match phase {
            Phase::Query => HookType::ActionQuery,
            Phase::Execute => HookType::ActionExecute,
        };
        let subscribers = self.shared.hooks.subscribers(kind);
        if subscribers.is_empty() {
            return;
        }

        let event = match self.hook_event(kind, phase, record, result) {
            Ok(event) => event,
            Err(e) => {
                tracing::error!(hook = %kind, "Could not build hook event: {}", e);
                return;
            }
        };

        // Query hooks must not mutate the park.
        let mutable = phase == Phase::Execute;
        for entry in subscribers {
            if let Err(e) = self.shared.call_as::<_, ()>(
                &self.lua,
                &entry.owner,
                mutable,
                &entry.function,
                event.clone(),
            ) {
                tracing::error!(plugin = %entry.owner.name(), hook = %kind, "Hook failed: {}", e);
            }
        }

        match event.get::<Table>("result") {
            Ok(table) => {
                if let Err(e) = apply_hook_result(&table, phase, result) {
                    tracing::warn!(hook = %kind, "Ignoring hook result changes: {}", e);
                }
            }
            Err(e) => tracing::warn!(hook = %kind, "Hook replaced event.result: {}", e),
        }
    }

    fn query_or_execute_custom(
        &self,
        id: &str,
        args: &serde_json::Value,
        is_execute: bool,
    ) -> ActionResult {
        let Some(info) = self.shared.custom_actions.get(id) else {
            return ActionResult::fail(ActionStatus::NotFound, format!("Unknown action '{}'", id));
        };

        let args = match LuaValueBridge::new(&self.lua).encode(args) {
            Ok(args) => args,
            Err(e) => return ActionResult::fail(ActionStatus::InvalidParameters, e.to_string()),
        };
        let callback = if is_execute { &info.execute } else { &info.query };

        match self
            .shared
            .call_as::<_, mlua::Value>(&self.lua, &info.owner, is_execute, callback, args)
        {
            Ok(value) => result_from_value(value),
            Err(e) => {
                tracing::error!(
                    plugin = %info.owner.name(),
                    action = %id,
                    "Custom action {} failed: {}",
                    if is_execute { "execute" } else { "query" },
                    e
                );
                ActionResult::fail(ActionStatus::ScriptError, e.to_string())
            }
        }
    }
}
