//! Lua interpreter setup for the script engine.
//!
//! The engine owns a single interpreter and drives it from the simulation
//! thread. Other threads never touch it directly: console snippets go through
//! the [`EvalQueue`] and run during the engine's tick.

mod console;

use mlua::{Lua, LuaOptions, MultiValue, StdLib, Value};

pub use console::{ConsoleError, ConsoleHandle, EvalHandle, EvalOutcome, EvalQueue};

/// Standard libraries plugins may use. No `io`, `os`, `package`, or `debug`.
pub fn safe_stdlib() -> StdLib {
    StdLib::TABLE | StdLib::STRING | StdLib::MATH | StdLib::UTF8 | StdLib::COROUTINE
}

/// Globals removed from the base library.
const BLOCKED_GLOBALS: &[&str] = &["dofile", "loadfile", "collectgarbage"];

/// Create an interpreter with only the safe libraries loaded.
pub fn create_sandboxed_lua() -> mlua::Result<Lua> {
    let lua = Lua::new_with(safe_stdlib(), LuaOptions::default())?;
    let globals = lua.globals();
    for name in BLOCKED_GLOBALS {
        globals.set(*name, Value::Nil)?;
    }
    tracing::debug!("Created sandboxed Lua state");
    Ok(lua)
}

/// Evaluate a console snippet and render what it returns.
///
/// Expressions are tried first (`1 + 1` prints `2`), then the snippet is run
/// as a statement block.
pub fn eval_to_string(lua: &Lua, code: &str) -> Result<String, String> {
    let values = match lua
        .load(format!("return {}", code))
        .set_name("=console")
        .into_function()
    {
        Ok(func) => func.call::<MultiValue>(()),
        Err(_) => lua.load(code).set_name("=console").eval::<MultiValue>(),
    }
    .map_err(|e| e.to_string())?;

    Ok(values
        .iter()
        .map(stringify)
        .collect::<Vec<_>>()
        .join("\t"))
}

/// Render a Lua value for humans.
pub fn stringify(value: &Value) -> String {
    let mut out = String::new();
    write_value(&mut out, value, 0);
    out
}

const MAX_DEPTH: usize = 4;

fn write_value(out: &mut String, value: &Value, depth: usize) {
    match value {
        Value::Nil => out.push_str("nil"),
        Value::Boolean(b) => out.push_str(&b.to_string()),
        Value::Integer(i) => out.push_str(&i.to_string()),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => {
            let text = s.to_string_lossy();
            if depth == 0 {
                out.push_str(&text);
            } else {
                out.push('"');
                out.push_str(&text);
                out.push('"');
            }
        }
        Value::Table(t) => {
            if depth >= MAX_DEPTH {
                out.push_str("{...}");
                return;
            }
            let len = t.raw_len();
            let mut parts = Vec::new();
            for pair in t.clone().pairs::<Value, Value>() {
                let Ok((k, v)) = pair else { continue };
                let mut part = String::new();
                match &k {
                    Value::Integer(i) if *i >= 1 && (*i as usize) <= len => {}
                    Value::String(s) => {
                        part.push_str(&s.to_string_lossy());
                        part.push_str(" = ");
                    }
                    other => {
                        part.push('[');
                        write_value(&mut part, other, depth + 1);
                        part.push_str("] = ");
                    }
                }
                write_value(&mut part, &v, depth + 1);
                parts.push(part);
            }
            if parts.is_empty() {
                out.push_str("{}");
            } else {
                out.push_str("{ ");
                out.push_str(&parts.join(", "));
                out.push_str(" }");
            }
        }
        Value::Function(_) => out.push_str("function"),
        Value::Thread(_) => out.push_str("thread"),
        Value::UserData(_) | Value::LightUserData(_) => out.push_str("userdata"),
        Value::Error(e) => out.push_str(&e.to_string()),
        _ => out.push_str("<value>"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sandbox_hides_unsafe_libraries() {
        let lua = create_sandboxed_lua().unwrap();
        let hidden: bool = lua
            .load("return io == nil and os == nil and dofile == nil and package == nil")
            .eval()
            .unwrap();
        assert!(hidden);

        let has_string: bool = lua.load("return string.format ~= nil").eval().unwrap();
        assert!(has_string);
    }

    #[test]
    fn test_eval_expression() {
        let lua = create_sandboxed_lua().unwrap();
        assert_eq!(eval_to_string(&lua, "1 + 2"), Ok("3".to_string()));
        assert_eq!(eval_to_string(&lua, "'a', 2"), Ok("a\t2".to_string()));
    }

    #[test]
    fn test_eval_statement() {
        let lua = create_sandboxed_lua().unwrap();
        assert_eq!(eval_to_string(&lua, "x = 40"), Ok(String::new()));
        assert_eq!(eval_to_string(&lua, "x + 2"), Ok("42".to_string()));
    }

    #[test]
    fn test_eval_error_is_text() {
        let lua = create_sandboxed_lua().unwrap();
        let err = eval_to_string(&lua, "error('nope')").unwrap_err();
        assert!(err.contains("nope"));
    }

    #[test]
    fn test_stringify_table() {
        let lua = create_sandboxed_lua().unwrap();
        let value: Value = lua.load("return { 1, 'two' }").eval().unwrap();
        assert_eq!(stringify(&value), "{ 1, \"two\" }");

        let value: Value = lua.load("return { name = 'Mouse' }").eval().unwrap();
        assert_eq!(stringify(&value), "{ name = \"Mouse\" }");
    }
}
