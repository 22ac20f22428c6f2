pub mod warnings;

use std::fs;
use std::io::{self, Read};
use std::path::Path;

use mlua::{
    Function, HookTriggers, IntoLua, IntoLuaMulti, Lua, LuaOptions, MultiValue, StdLib, Table,
    Value, VmState,
};
use tracing::debug;

use crate::config::{
    CONTINUATION_PROMPT, CONTINUATION_PROMPT_GLOBAL, PRIMARY_PROMPT, PROMPT_GLOBAL,
};
use crate::driver::status::{Failure, Status};

/// Trailing text of a syntax error caused by the source ending early
pub const EOF_MARK: &str = "<eof>";

/// Message raised at a safe point after an interrupt
pub const INTERRUPTED_MESSAGE: &str = "interrupted!";

/// Message the runtime leaves behind for allocation failures
pub const MEMORY_ERROR_MESSAGE: &str = "not enough memory";

// Standard functions captured before any guest code can replace them
pub(crate) const REG_XPCALL: &str = "luai.xpcall";
pub(crate) const REG_TOSTRING: &str = "luai.tostring";
pub(crate) const REG_TRACEBACK: &str = "luai.traceback";
pub(crate) const REG_GETMETATABLE: &str = "luai.getmetatable";

/// Three-way result of compiling a piece of source
pub enum Compiled {
    Ready(Function),
    /// More input could still make the source valid
    Incomplete(Failure),
    Invalid(Failure),
}

/// Opaque handle to the embedded Lua state
pub struct LuaRuntime {
    lua: Lua,
}

impl LuaRuntime {
    /// Create a state with every standard library open
    ///
    /// With `ignore_env` the libraries are told to skip LUA_PATH/LUA_CPATH.
    pub fn new(ignore_env: bool) -> anyhow::Result<Self> {
        // The stand-alone interpreter is not sandboxed: debug and C modules stay available
        let lua = unsafe { Lua::unsafe_new_with(StdLib::NONE, LuaOptions::default()) };

        // Must be in the registry before 'package' is opened
        if ignore_env {
            lua.set_named_registry_value("LUA_NOENV", true)?;
        }
        lua.load_std_libs(StdLib::ALL)?;

        let globals = lua.globals();
        let debug_lib: Table = globals.get("debug")?;
        lua.set_named_registry_value(REG_XPCALL, globals.get::<Function>("xpcall")?)?;
        lua.set_named_registry_value(REG_TOSTRING, globals.get::<Function>("tostring")?)?;
        lua.set_named_registry_value(REG_TRACEBACK, debug_lib.get::<Function>("traceback")?)?;
        lua.set_named_registry_value(
            REG_GETMETATABLE,
            debug_lib.get::<Function>("getmetatable")?,
        )?;

        warnings::install(&lua);

        debug!(ignore_env, "lua state created");
        Ok(Self { lua })
    }

    pub(crate) fn lua(&self) -> &Lua {
        &self.lua
    }

    /// Compile source into a callable chunk
    pub fn compile(&self, source: &[u8], chunk_name: &str) -> Compiled {
        match self.lua.load(source).set_name(chunk_name).into_function() {
            Ok(chunk) => Compiled::Ready(chunk),
            Err(mlua::Error::SyntaxError { message, .. }) if message.ends_with(EOF_MARK) => {
                Compiled::Incomplete(Failure::new(Status::SyntaxIncomplete, message))
            }
            Err(mlua::Error::SyntaxError { message, .. }) => {
                Compiled::Invalid(Failure::new(Status::SyntaxError, message))
            }
            Err(err) => Compiled::Invalid(host_failure(&err)),
        }
    }

    /// Compile source, folding incomplete input into a plain syntax failure
    pub fn load(&self, source: &[u8], chunk_name: &str) -> Result<Function, Failure> {
        match self.compile(source, chunk_name) {
            Compiled::Ready(chunk) => Ok(chunk),
            Compiled::Incomplete(failure) | Compiled::Invalid(failure) => Err(failure),
        }
    }

    /// Load a file, or standard input when `path` is None
    pub fn load_file(&self, path: Option<&Path>) -> Result<Function, Failure> {
        let (display, chunk_name, contents) = match path {
            Some(path) => (
                path.display().to_string(),
                format!("@{}", path.display()),
                fs::read(path),
            ),
            None => {
                let mut buffer = Vec::new();
                let read = io::stdin().lock().read_to_end(&mut buffer).map(|_| buffer);
                ("stdin".to_string(), "=stdin".to_string(), read)
            }
        };

        let mut source = contents.map_err(|err| {
            Failure::new(Status::FileError, format!("cannot open {display}: {err}"))
        })?;

        // Skip a '#!' line but keep its newline so line numbers stay right
        if source.first() == Some(&b'#') {
            let end = source
                .iter()
                .position(|&byte| byte == b'\n')
                .unwrap_or(source.len());
            source.drain(..end);
        }

        self.load(&source, &chunk_name)
    }

    /// The protected-call primitive: `xpcall(func, handler, args...)`
    pub fn protected_call(
        &self,
        func: impl IntoLua,
        handler: &Function,
        args: impl IntoLuaMulti,
    ) -> mlua::Result<MultiValue> {
        let xpcall: Function = self.lua.named_registry_value(REG_XPCALL)?;
        xpcall.call::<MultiValue>((func, handler.clone(), args))
    }

    pub fn global<V: mlua::FromLua>(&self, name: &str) -> mlua::Result<V> {
        self.lua.globals().get::<V>(name)
    }

    pub fn set_global(&self, name: &str, value: impl IntoLua) -> mlua::Result<()> {
        self.lua.globals().set(name, value)
    }

    /// Build the global `arg` table with argv[base] at index 0
    pub fn install_arg_table<S: AsRef<str>>(&self, argv: &[S], base: isize) -> mlua::Result<()> {
        let positive = (argv.len() as isize - (base + 1)).max(0) as usize;
        let negative = (base + 1).max(0) as usize;
        let table = self.lua.create_table_with_capacity(positive, negative)?;
        for (index, arg) in argv.iter().enumerate() {
            table.raw_set(index as i64 - base as i64, arg.as_ref())?;
        }
        self.set_global("arg", table)
    }

    /// Values `arg[1]..arg[#arg]`, read back from the guest so earlier code may edit them
    pub fn script_args(&self) -> Result<MultiValue, Failure> {
        let Ok(Value::Table(arg)) = self.global::<Value>("arg") else {
            return Err(Failure::runtime("'arg' is not a table"));
        };
        let count = arg.len().map_err(|err| host_failure(&err))?;
        (1..=count)
            .map(|index| arg.raw_get::<Value>(index))
            .collect::<mlua::Result<MultiValue>>()
            .map_err(|err| host_failure(&err))
    }

    /// Prompt text: `_PROMPT`/`_PROMPT2` through `tostring`, or the built-in default
    pub fn prompt(&self, first_line: bool) -> String {
        let (global, default) = if first_line {
            (PROMPT_GLOBAL, PRIMARY_PROMPT)
        } else {
            (CONTINUATION_PROMPT_GLOBAL, CONTINUATION_PROMPT)
        };
        match self.global::<Value>(global) {
            Ok(Value::Nil) | Err(_) => default.to_string(),
            Ok(value) => self.tostring(value).unwrap_or_else(|_| default.to_string()),
        }
    }

    /// Render a value with the standard `tostring`
    pub fn tostring(&self, value: Value) -> mlua::Result<String> {
        let tostring: Function = self.lua.named_registry_value(REG_TOSTRING)?;
        let text = tostring.call::<mlua::String>(value)?;
        Ok(text.to_string_lossy().to_string())
    }

    /// Hand values to the guest's `print`
    pub fn print(&self, values: MultiValue) -> Result<(), Failure> {
        self.global::<Function>("print")
            .and_then(|print| print.call::<()>(values))
            .map_err(|err| {
                Failure::runtime(format!("error calling 'print' ({})", error_message(&err)))
            })
    }

    /// Restart the collector in generational mode
    pub fn gc_generational(&self) {
        self.lua.gc_restart();
        self.lua.gc_gen(0, 0);
        debug!("collector switched to generational mode");
    }

    /// Equivalent of `warn("@on")`
    pub fn enable_warnings(&self) {
        self.lua.warning("@on", false);
    }

    /// Install a count hook that raises an interrupt when `should_stop` says so
    pub fn install_safe_point<F>(&self, interval: u32, should_stop: F)
    where
        F: Fn() -> bool + 'static,
    {
        let triggers = HookTriggers::new().every_nth_instruction(interval);
        self.lua.set_hook(triggers, move |_lua, _debug| {
            if should_stop() {
                Err(mlua::Error::runtime(INTERRUPTED_MESSAGE))
            } else {
                Ok(VmState::Continue)
            }
        });
    }

    pub fn remove_safe_point(&self) {
        self.lua.remove_hook();
    }
}

/// Best plain-text rendering of a host-side error
pub fn error_message(err: &mlua::Error) -> String {
    match err {
        mlua::Error::RuntimeError(message) | mlua::Error::MemoryError(message) => message.clone(),
        mlua::Error::SyntaxError { message, .. } => message.clone(),
        mlua::Error::CallbackError { cause, .. } => error_message(cause),
        other => other.to_string(),
    }
}

/// Map an error raised outside the message handler's reach
pub fn host_failure(err: &mlua::Error) -> Failure {
    let status = match err {
        mlua::Error::MemoryError(_) => Status::OutOfMemory,
        _ => Status::RuntimeError,
    };
    Failure::new(status, error_message(err))
}
