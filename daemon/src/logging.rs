use tracing_subscriber::EnvFilter;

/// Installs the global `tracing` subscriber. Library crates never do this
/// themselves — only the binary, once, at startup.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
}
