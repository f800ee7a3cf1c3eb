//! Logging initialization.

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "stocksback=info";

/// Initialize tracing for the process. Output goes to stderr so command
/// results on stdout stay machine readable.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("stocksback=debug")
        } else {
            EnvFilter::new(DEFAULT_FILTER)
        }
    });

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
