use crossterm::tty::IsTty;
use tracing::debug;

use crate::args::{self, Action, ScriptIndex};
use crate::config::{COPYRIGHT, Settings};
use crate::driver::library::LibraryLoadError;
use crate::driver::status::Failure;
use crate::driver::{COMMAND_LINE_CHUNK, Driver};
use crate::repl;
use crate::runtime::LuaRuntime;

/// Why the start-up sequence stopped early
enum Abort {
    /// Already printed by the driver
    Reported,
    /// Host-side trouble nobody has printed yet
    Host(anyhow::Error),
}

impl From<Failure> for Abort {
    fn from(_: Failure) -> Self {
        Abort::Reported
    }
}

impl From<LibraryLoadError> for Abort {
    fn from(err: LibraryLoadError) -> Self {
        debug!(
            global = %err.global,
            module = %err.module,
            status = ?err.status(),
            "library load stopped start-up"
        );
        Abort::Reported
    }
}

/// Run the whole interpreter; true when every step succeeded
pub fn run<S: AsRef<str>>(argv: &[S], settings: &Settings) -> bool {
    let progname = settings.progname.as_str();

    let classification = match args::classify(argv) {
        Ok(classification) => classification,
        Err(bad) => {
            debug!(index = bad.index(), kind = ?bad.kind(), "bad option");
            eprintln!("{progname}: {bad}");
            eprintln!("{}", args::usage(progname));
            return false;
        }
    };
    debug!(?classification, "arguments classified");

    let flags = classification.flags;
    if flags.show_version {
        print_version();
    }

    let runtime = match LuaRuntime::new(flags.ignore_env) {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("{progname}: cannot create state: {err}");
            return false;
        }
    };

    match start(runtime, argv, classification, settings) {
        Ok(()) => true,
        Err(Abort::Reported) => false,
        Err(Abort::Host(err)) => {
            eprintln!("{progname}: {err:#}");
            false
        }
    }
}

fn start<S: AsRef<str>>(
    runtime: LuaRuntime,
    argv: &[S],
    classification: args::Classification,
    settings: &Settings,
) -> Result<(), Abort> {
    let args::Classification { flags, script } = classification;

    runtime
        .install_arg_table(argv, script.base())
        .map_err(|err| Abort::Host(err.into()))?;
    runtime.gc_generational();

    let driver = Driver::new(runtime, &settings.progname).map_err(Abort::Host)?;

    if !flags.ignore_env {
        driver.run_init()?;
    }

    for action in args::actions(argv, script.option_limit(argv.len())) {
        match action {
            Action::Execute(code) => driver.do_string(code, COMMAND_LINE_CHUNK)?,
            Action::Library(spec) => driver.load_library(spec)?,
            Action::EnableWarnings => driver.runtime().enable_warnings(),
        }
    }

    if let ScriptIndex::At(index) = script {
        driver.run_script(argv, index)?;
    }

    if flags.interactive {
        repl::run(&driver, settings).map_err(Abort::Host)?;
    } else if !matches!(script, ScriptIndex::At(_)) && !flags.has_inline_code && !flags.show_version
    {
        if std::io::stdin().is_tty() {
            print_version();
            repl::run(&driver, settings).map_err(Abort::Host)?;
        } else {
            driver.do_file(None)?;
        }
    }
    Ok(())
}

fn print_version() {
    println!("{COPYRIGHT}");
}
