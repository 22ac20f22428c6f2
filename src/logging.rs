use tracing_subscriber::EnvFilter;

use crate::config::LOG_ENV;

/// Install the stderr subscriber; silent unless LUAI_LOG asks for output
pub fn init() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("off"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
