// 📝 Logging - tracing subscriber setup shared by the CLI and the server

use tracing_subscriber::EnvFilter;

/// Environment variable that overrides the log filter (e.g. `TBX_LOG=debug`)
pub const LOG_ENV: &str = "TBX_LOG";

/// Initialize the global subscriber. `TBX_LOG` wins over `default_level`.
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
