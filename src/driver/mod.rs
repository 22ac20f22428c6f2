pub mod handler;
pub mod interrupt;
pub mod library;
pub mod status;

use std::cell::{Cell, RefCell};
use std::path::Path;
use std::rc::Rc;

use mlua::{Function, IntoLua, IntoLuaMulti, MultiValue, Value};
use tracing::debug;

use crate::config::{INIT_VAR, INIT_VAR_VERSIONED};
use crate::runtime::{INTERRUPTED_MESSAGE, LuaRuntime, MEMORY_ERROR_MESSAGE, host_failure};
use interrupt::InterruptHook;
use status::{Failure, Status};

/// Chunk name for `-e` code
pub const COMMAND_LINE_CHUNK: &str = "=(command line)";

/// Execution context shared by every component that runs guest code
pub struct Driver {
    runtime: LuaRuntime,
    interrupt: InterruptHook,
    handler: Function,
    handler_runs: Rc<Cell<u64>>,
    /// Prefix for diagnostics; cleared while the REPL runs
    progname: RefCell<Option<String>>,
}

impl Driver {
    pub fn new(runtime: LuaRuntime, progname: &str) -> anyhow::Result<Self> {
        let handler_runs = Rc::new(Cell::new(0));
        let handler = handler::create(runtime.lua(), Rc::clone(&handler_runs))?;
        Ok(Self {
            runtime,
            interrupt: InterruptHook::default(),
            handler,
            handler_runs,
            progname: RefCell::new(Some(progname.to_string())),
        })
    }

    pub fn runtime(&self) -> &LuaRuntime {
        &self.runtime
    }

    /// Run `func(args...)` so that any failure comes back as a status
    ///
    /// SIGINT is routed to the cooperative interrupt for the duration of the call.
    pub fn guarded_call(
        &self,
        func: impl IntoLua,
        args: impl IntoLuaMulti,
    ) -> Result<MultiValue, Failure> {
        let runs_before = self.handler_runs.get();

        let scope = self.interrupt.enter(&self.runtime);
        let outcome = self.runtime.protected_call(func, &self.handler, args);
        let interrupted = scope.take_observed();
        drop(scope);

        let mut values = outcome.map_err(|err| host_failure(&err))?;
        if let Some(Value::Boolean(true)) = values.pop_front() {
            debug!(results = values.len(), "guarded call succeeded");
            return Ok(values);
        }

        let message = match values.pop_front() {
            Some(Value::String(text)) => text.to_string_lossy().to_string(),
            _ => "(error message not a string)".to_string(),
        };
        // Guest code may have caught the interrupt and failed for another reason
        let status = if interrupted && message.starts_with(INTERRUPTED_MESSAGE) {
            Status::Interrupted
        } else if self.handler_runs.get() == runs_before && message == MEMORY_ERROR_MESSAGE {
            Status::OutOfMemory
        } else {
            Status::RuntimeError
        };
        debug!(?status, "guarded call failed");
        Err(Failure::new(status, message))
    }

    /// Print a diagnostic line, prefixed with the program name when there is one
    pub fn message(&self, text: &str) {
        match self.progname.borrow().as_deref() {
            Some(progname) => eprintln!("{progname}: {text}"),
            None => eprintln!("{text}"),
        }
    }

    /// Print the failure, if any, and hand the result back
    pub fn report<T>(&self, result: Result<T, Failure>) -> Result<T, Failure> {
        if let Err(failure) = &result {
            self.message(&failure.message);
        }
        result
    }

    /// Drop the program-name prefix until the guard goes away
    pub fn without_progname(&self) -> ProgramNameGuard<'_> {
        let saved = self.progname.borrow_mut().take();
        ProgramNameGuard {
            driver: self,
            saved,
        }
    }

    fn run_chunk(&self, chunk: Result<Function, Failure>) -> Result<(), Failure> {
        let result = chunk.and_then(|chunk| self.guarded_call(chunk, ()).map(|_| ()));
        self.report(result)
    }

    /// Run a file, or standard input when `path` is None
    pub fn do_file(&self, path: Option<&Path>) -> Result<(), Failure> {
        self.run_chunk(self.runtime.load_file(path))
    }

    pub fn do_string(&self, code: &str, chunk_name: &str) -> Result<(), Failure> {
        self.run_chunk(self.runtime.load(code.as_bytes(), chunk_name))
    }

    /// Run the script at `argv[index]`, passing it `arg[1..#arg]`
    pub fn run_script<S: AsRef<str>>(&self, argv: &[S], index: usize) -> Result<(), Failure> {
        let name = argv[index].as_ref();
        // '-' is stdin unless it came right after '--'
        let from_stdin = name == "-" && (index == 0 || argv[index - 1].as_ref() != "--");
        let path = (!from_stdin).then(|| Path::new(name));

        let result = self.runtime.load_file(path).and_then(|chunk| {
            let args = self.runtime.script_args()?;
            self.guarded_call(chunk, args).map(|_| ())
        });
        self.report(result)
    }

    /// Run LUA_INIT_5_4 (or LUA_INIT) from the process environment
    pub fn run_init(&self) -> Result<(), Failure> {
        self.run_init_with(|name| {
            std::env::var_os(name).map(|value| value.to_string_lossy().into_owned())
        })
    }

    /// Run the init code found through `lookup`; no variable at all is fine
    pub fn run_init_with<F>(&self, lookup: F) -> Result<(), Failure>
    where
        F: Fn(&str) -> Option<String>,
    {
        let Some((name, value)) = [INIT_VAR_VERSIONED, INIT_VAR]
            .into_iter()
            .find_map(|name| lookup(name).map(|value| (name, value)))
        else {
            return Ok(());
        };

        debug!(variable = name, "running init code");
        match value.strip_prefix('@') {
            Some(path) => self.do_file(Some(Path::new(path))),
            None => self.do_string(&value, &format!("={name}")),
        }
    }
}

/// Restores the program name on drop
pub struct ProgramNameGuard<'a> {
    driver: &'a Driver,
    saved: Option<String>,
}

impl Drop for ProgramNameGuard<'_> {
    fn drop(&mut self) {
        *self.driver.progname.borrow_mut() = self.saved.take();
    }
}
