use std::path::PathBuf;

/// Program name used in diagnostics when argv[0] is missing or empty
pub const DEFAULT_PROGNAME: &str = "lua";

/// Version-qualified init variable, tried first
pub const INIT_VAR_VERSIONED: &str = "LUA_INIT_5_4";
/// Plain init variable, tried second
pub const INIT_VAR: &str = "LUA_INIT";

pub const PRIMARY_PROMPT: &str = "> ";
pub const CONTINUATION_PROMPT: &str = ">> ";

/// Globals that override the prompts
pub const PROMPT_GLOBAL: &str = "_PROMPT";
pub const CONTINUATION_PROMPT_GLOBAL: &str = "_PROMPT2";

/// Banner printed for -v/-i and before an implicit REPL
pub const COPYRIGHT: &str = "Lua 5.4  Copyright (C) 1994-2025 Lua.org, PUC-Rio";

/// Environment variable holding the tracing filter
pub const LOG_ENV: &str = "LUAI_LOG";
/// Environment variable overriding the history file location
pub const HISTORY_ENV: &str = "LUAI_HISTORY";
const HISTORY_FILE: &str = ".luai_history";
const HISTORY_CAPACITY: usize = 1000;

/// Settings read once from the process environment at start-up
#[derive(Debug, Clone)]
pub struct Settings {
    pub progname: String,
    pub history_path: Option<PathBuf>,
    pub history_capacity: usize,
}

impl Settings {
    /// Build settings from argv[0] and the environment
    pub fn from_env(argv0: Option<&str>) -> Self {
        let progname = match argv0 {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => DEFAULT_PROGNAME.to_string(),
        };

        // LUAI_HISTORY wins; otherwise keep the history next to the user's home
        let history_path = match std::env::var_os(HISTORY_ENV) {
            Some(path) if !path.is_empty() => Some(PathBuf::from(path)),
            _ => match home::home_dir() {
                Some(dir) if !dir.as_os_str().is_empty() => Some(dir.join(HISTORY_FILE)),
                _ => None,
            },
        };

        Self {
            progname,
            history_path,
            history_capacity: HISTORY_CAPACITY,
        }
    }
}
