//! Value Bridge between native values and Lua values.
//!
//! Native values are `serde_json::Value`s; every payload that crosses into a
//! script (action args, hook events, storage values) goes through
//! [`ValueBridge`]. The action-result table shape lives here too:
//!
//! ```lua
//! {
//!   error = "disallowed",      -- status name, absent when ok
//!   error_title = "string",    -- optional
//!   error_message = "string",  -- optional
//!   cost = 100,
//!   position = { x = 0, y = 0, z = 0 },
//!   entity_id = 3,             -- optional
//!   ...                        -- anything else lands in `extra`
//! }
//! ```

use mlua::{Lua, Table, Value};
use serde_json::{Map, Value as JsonValue};
use tycoon_actions::Phase;
use tycoon_core::{ActionResult, ActionStatus, Coords};

use crate::error::{PluginError, PluginResult};

/// Encode/decode capability for one interpreter.
pub trait ValueBridge {
    type Script;

    fn encode(&self, value: &JsonValue) -> PluginResult<Self::Script>;

    fn decode(&self, value: Self::Script) -> PluginResult<JsonValue>;
}

/// [`ValueBridge`] over an mlua state.
pub struct LuaValueBridge<'a> {
    lua: &'a Lua,
}

impl<'a> LuaValueBridge<'a> {
    pub fn new(lua: &'a Lua) -> Self {
        Self { lua }
    }
}

impl ValueBridge for LuaValueBridge<'_> {
    type Script = Value;

    fn encode(&self, value: &JsonValue) -> PluginResult<Value> {
        Ok(json_to_lua_value(self.lua, value)?)
    }

    fn decode(&self, value: Value) -> PluginResult<JsonValue> {
        lua_value_to_json(value, 0)
    }
}

/// Tables nested deeper than this are assumed to be cyclic.
const MAX_DEPTH: usize = 32;

/// Convert a Lua value to a JSON value.
///
/// Functions, threads and userdata cannot cross and are an error.
pub fn lua_value_to_json(value: Value, depth: usize) -> PluginResult<JsonValue> {
    match value {
        Value::Nil => Ok(JsonValue::Null),
        Value::Boolean(b) => Ok(JsonValue::Bool(b)),
        Value::Integer(i) => Ok(JsonValue::Number(i.into())),
        Value::Number(n) => Ok(serde_json::Number::from_f64(n)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null)),
        Value::String(s) => Ok(JsonValue::String(s.to_str()?.to_string())),
        Value::Table(t) => {
            if depth >= MAX_DEPTH {
                return Err(PluginError::Conversion("table nested too deeply".into()));
            }
            table_to_json(t, depth)
        }
        other => Err(PluginError::Conversion(format!(
            "a {} cannot be passed across the script boundary",
            other.type_name()
        ))),
    }
}

fn table_to_json(t: Table, depth: usize) -> PluginResult<JsonValue> {
    let len = t.raw_len();
    let mut count = 0;
    for pair in t.clone().pairs::<Value, Value>() {
        pair?;
        count += 1;
    }

    // A proper sequence becomes an array, anything else an object.
    if len > 0 && count == len {
        let mut arr = Vec::with_capacity(len);
        for i in 1..=len {
            arr.push(lua_value_to_json(t.raw_get(i)?, depth + 1)?);
        }
        return Ok(JsonValue::Array(arr));
    }

    let mut obj = Map::new();
    for pair in t.pairs::<Value, Value>() {
        let (k, v) = pair?;
        let key = match k {
            Value::String(s) => s.to_str()?.to_string(),
            Value::Integer(i) => i.to_string(),
            other => {
                return Err(PluginError::Conversion(format!(
                    "a {} cannot be used as a key",
                    other.type_name()
                )))
            }
        };
        obj.insert(key, lua_value_to_json(v, depth + 1)?);
    }
    Ok(JsonValue::Object(obj))
}

/// Convert a JSON value to a Lua value.
pub fn json_to_lua_value(lua: &Lua, value: &JsonValue) -> mlua::Result<Value> {
    match value {
        JsonValue::Null => Ok(Value::Nil),
        JsonValue::Bool(b) => Ok(Value::Boolean(*b)),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Value::Integer(i))
            } else if let Some(f) = n.as_f64() {
                Ok(Value::Number(f))
            } else {
                Ok(Value::Nil)
            }
        }
        JsonValue::String(s) => Ok(Value::String(lua.create_string(s)?)),
        JsonValue::Array(arr) => {
            let table = lua.create_table_with_capacity(arr.len(), 0)?;
            for (i, v) in arr.iter().enumerate() {
                table.raw_set(i + 1, json_to_lua_value(lua, v)?)?;
            }
            Ok(Value::Table(table))
        }
        JsonValue::Object(obj) => {
            let table = lua.create_table_with_capacity(0, obj.len())?;
            for (k, v) in obj {
                table.raw_set(k.as_str(), json_to_lua_value(lua, v)?)?;
            }
            Ok(Value::Table(table))
        }
    }
}

// =============================================================================
// Action results
// =============================================================================

const RESULT_FIELDS: &[&str] = &[
    "error",
    "error_title",
    "error_message",
    "cost",
    "position",
    "entity_id",
];

pub fn result_to_table(lua: &Lua, result: &ActionResult) -> mlua::Result<Table> {
    let table = lua.create_table()?;
    for (k, v) in &result.extra {
        table.set(k.as_str(), json_to_lua_value(lua, v)?)?;
    }
    if !result.is_ok() {
        table.set("error", result.status.as_str())?;
    }
    table.set("error_title", result.title.clone())?;
    table.set("error_message", result.message.clone())?;
    table.set("cost", result.cost)?;

    let position = lua.create_table()?;
    position.set("x", result.position.x)?;
    position.set("y", result.position.y)?;
    position.set("z", result.position.z)?;
    table.set("position", position)?;

    table.set("entity_id", result.entity_id)?;
    Ok(table)
}

/// Read what a script callback returned.
///
/// `nil` means success with no cost. Anything other than a table or nil is a
/// script error, as is an `error` field naming no known status.
pub fn result_from_value(value: Value) -> ActionResult {
    let table = match value {
        Value::Nil => return ActionResult::ok(),
        Value::Table(t) => t,
        other => {
            return ActionResult::fail(
                ActionStatus::ScriptError,
                format!("Action callback returned a {}, expected a table", other.type_name()),
            )
        }
    };
    match parse_result_table(&table) {
        Ok(result) => result,
        Err(e) => ActionResult::fail(ActionStatus::ScriptError, e.to_string()),
    }
}

fn parse_result_table(table: &Table) -> PluginResult<ActionResult> {
    let status = match table.get::<Option<String>>("error")? {
        Some(name) => name.parse::<ActionStatus>().map_err(PluginError::Conversion)?,
        None => ActionStatus::Ok,
    };

    let mut result = ActionResult {
        status,
        title: table.get("error_title")?,
        message: table.get("error_message")?,
        cost: table.get::<Option<i64>>("cost")?.unwrap_or(0),
        entity_id: table.get("entity_id")?,
        ..ActionResult::default()
    };
    if let Some(pos) = table.get::<Option<Table>>("position")? {
        result.position = Coords::new(
            pos.get::<Option<i32>>("x")?.unwrap_or(0),
            pos.get::<Option<i32>>("y")?.unwrap_or(0),
            pos.get::<Option<i32>>("z")?.unwrap_or(0),
        );
    }

    for pair in table.clone().pairs::<String, Value>() {
        let (key, value) = pair?;
        if RESULT_FIELDS.contains(&key.as_str()) {
            continue;
        }
        result.extra.insert(key, lua_value_to_json(value, 1)?);
    }
    Ok(result)
}

/// Copy the fields a hook may change from `table` onto `result`.
///
/// Query hooks may fail an ok result or rewrite a failure, but clearing
/// `error` never turns a failed result into a success. Execute hooks run
/// after the park changed and may only rewrite the title and message.
pub fn apply_hook_result(table: &Table, phase: Phase, result: &mut ActionResult) -> PluginResult<()> {
    if phase == Phase::Query {
        if let Some(name) = table.get::<Option<String>>("error")? {
            let status = name.parse::<ActionStatus>().map_err(PluginError::Conversion)?;
            if !status.is_ok() || result.is_ok() {
                result.status = status;
            }
        }
        if let Some(cost) = table.get::<Option<i64>>("cost")? {
            result.cost = cost;
        }
    }
    result.title = table.get("error_title")?;
    result.message = table.get("error_message")?;
    Ok(())
}
