use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter, e.g. `dbweave_core=debug`.
pub const LOG_ENV: &str = "DBWEAVE_LOG";

/// Install the stderr subscriber. `DBWEAVE_LOG` overrides the default
/// `info` filter; `json` switches to one JSON object per event.
pub fn init(json: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    // Keep a subscriber that is already installed.
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
