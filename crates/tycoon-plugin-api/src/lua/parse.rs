//! Lua table parsing for plugin registration.

use mlua::{Function, Lua, Result as LuaResult, Table, Value};

use crate::types::{LuaFunctionRef, PluginMetadata, PluginRegistration, PluginType};

/// Parse the table passed to `park.register_plugin`.
///
/// Expected table shape:
/// ```lua
/// {
///   name = "string",                 -- required
///   version = "1.0",                 -- optional
///   authors = "me" | { "me", "you" },-- optional
///   type = "local",                  -- optional: "local" | "remote" | "intransient"
///   licence = "MIT",                 -- optional
///   min_api_version = 1,             -- optional
///   target_api_version = 27,         -- optional
///   main = function() end,           -- required
///   shutdown = function() end,       -- optional
/// }
/// ```
pub fn parse_registration(lua: &Lua, table: Table) -> LuaResult<PluginRegistration> {
    let name: String = table
        .get::<Option<String>>("name")?
        .filter(|n| !n.is_empty())
        .ok_or_else(|| mlua::Error::RuntimeError("Plugin missing required 'name'".into()))?;

    let plugin_type = match table.get::<Option<String>>("type")? {
        Some(s) => s.parse::<PluginType>().map_err(mlua::Error::RuntimeError)?,
        None => PluginType::Local,
    };

    let authors = match table.get::<Value>("authors")? {
        Value::Nil => Vec::new(),
        Value::String(s) => vec![s.to_str()?.to_string()],
        Value::Table(t) => t.sequence_values::<String>().collect::<LuaResult<_>>()?,
        _ => {
            return Err(mlua::Error::RuntimeError(
                "'authors' must be a string or a list of strings".into(),
            ))
        }
    };

    let main = table.get::<Option<Function>>("main")?.ok_or_else(|| {
        mlua::Error::RuntimeError(format!("Plugin '{}' missing required 'main' function", name))
    })?;
    let shutdown = table.get::<Option<Function>>("shutdown")?;

    let metadata = PluginMetadata {
        version: table.get("version")?,
        authors,
        plugin_type,
        licence: table.get("licence")?,
        min_api_version: table.get("min_api_version")?,
        target_api_version: table.get("target_api_version")?,
        name,
    };

    let prefix = format!("plugin:{}", metadata.name);
    let main = LuaFunctionRef::store(lua, main, &format!("{}:main", prefix))?;
    let shutdown = shutdown
        .map(|f| LuaFunctionRef::store(lua, f, &format!("{}:shutdown", prefix)))
        .transpose()?;

    Ok(PluginRegistration {
        metadata,
        main,
        shutdown,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_registration() {
        let lua = Lua::new();
        let table: Table = lua
            .load(
                r#"return {
                    name = "Ride Tools",
                    version = "1.2",
                    authors = { "Ada", "Grace" },
                    type = "remote",
                    min_api_version = 20,
                    main = function() end,
                    shutdown = function() end,
                }"#,
            )
            .eval()
            .unwrap();

        let reg = parse_registration(&lua, table).unwrap();
        assert_eq!(reg.metadata.name, "Ride Tools");
        assert_eq!(reg.metadata.authors, vec!["Ada", "Grace"]);
        assert_eq!(reg.metadata.plugin_type, PluginType::Remote);
        assert_eq!(reg.metadata.min_api_version, Some(20));
        assert!(reg.shutdown.is_some());
        assert!(reg.main.key.starts_with("plugin:Ride Tools:main"));
    }

    #[test]
    fn test_missing_main_is_rejected() {
        let lua = Lua::new();
        let table: Table = lua.load("return { name = 'x' }").eval().unwrap();
        assert!(parse_registration(&lua, table).is_err());
    }

    #[test]
    fn test_single_author_string() {
        let lua = Lua::new();
        let table: Table = lua
            .load("return { name = 'x', authors = 'Sam', main = function() end }")
            .eval()
            .unwrap();
        let reg = parse_registration(&lua, table).unwrap();
        assert_eq!(reg.metadata.authors, vec!["Sam"]);
        assert_eq!(reg.metadata.plugin_type, PluginType::Local);
    }
}
