use std::cell::Cell;
use std::rc::Rc;

use mlua::{Function, Lua, Table, Value};

use crate::runtime::{REG_GETMETATABLE, REG_TRACEBACK, error_message};

/// Build the message handler passed to every protected call
///
/// `runs` counts invocations so the caller can tell errors that never reached the
/// handler (allocation failures) from ordinary ones.
pub fn create(lua: &Lua, runs: Rc<Cell<u64>>) -> mlua::Result<Function> {
    lua.create_function(move |lua, error: Value| {
        runs.set(runs.get() + 1);
        Ok(describe(lua, error))
    })
}

/// Turn a raw error value into the final diagnostic, with a traceback when possible
fn describe(lua: &Lua, error: Value) -> String {
    let message = match error {
        Value::Error(err) => error_message(&err),
        value => match lua.coerce_string(value.clone()) {
            Ok(Some(text)) => text.to_string_lossy().to_string(),
            _ => {
                // A __tostring result is the whole message, no traceback
                if let Some(text) = tostring_metamethod(lua, &value) {
                    return text;
                }
                format!("(error object is a {} value)", type_name(&value))
            }
        },
    };
    traceback(lua, &message).unwrap_or(message)
}

fn tostring_metamethod(lua: &Lua, value: &Value) -> Option<String> {
    let getmetatable: Function = lua.named_registry_value(REG_GETMETATABLE).ok()?;
    let metatable: Option<Table> = getmetatable.call(value.clone()).ok()?;
    let method: Option<Function> = metatable?.raw_get("__tostring").ok()?;
    match method?.call::<Value>(value.clone()).ok()? {
        Value::String(text) => Some(text.to_string_lossy().to_string()),
        _ => None,
    }
}

fn traceback(lua: &Lua, message: &str) -> Option<String> {
    let traceback: Function = lua.named_registry_value(REG_TRACEBACK).ok()?;
    // Level 2 skips traceback itself and this handler
    traceback.call::<String>((message, 2)).ok()
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::LightUserData(_) => "userdata",
        other => other.type_name(),
    }
}
