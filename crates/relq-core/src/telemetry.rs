use tracing_subscriber::EnvFilter;

/// Initialize the tracing subscriber for structured logging.
///
/// - Debug builds: pretty-printed human-readable output
/// - Release builds: JSON-formatted output for log aggregation
///
/// `RUST_LOG` takes precedence when set; otherwise `default_directive`
/// (the `LOG_LEVEL` configuration value) is used.
pub fn init_tracing(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive.to_string()));

    if cfg!(debug_assertions) {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    }
}
