mod args;
mod config;
mod driver;
mod entry;
mod logging;
mod repl;
mod runtime;

use std::process::ExitCode;

use config::Settings;

fn main() -> ExitCode {
    logging::init();

    let argv: Vec<String> = std::env::args_os()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect();
    let settings = Settings::from_env(argv.first().map(String::as_str));

    if entry::run(&argv, &settings) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
