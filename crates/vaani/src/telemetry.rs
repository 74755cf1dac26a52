use tracing_subscriber::EnvFilter;

/// Installs the global tracing subscriber for the process.
///
/// The filter is taken from `RUST_LOG` when set, falling back to the level
/// configured via `VAANI_LOG_LEVEL`. Safe to call more than once; later calls
/// are ignored once a subscriber is installed.
pub fn init(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.to_string()));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .with_ansi(false)
        .try_init();
}
