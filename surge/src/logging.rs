use tracing_subscriber::EnvFilter;

/// Used when `RUST_LOG` is unset.
pub(crate) const DEFAULT_FILTER: &str = "surge=info";

fn default_filter(verbose: u8) -> &'static str {
    match verbose {
        0 => DEFAULT_FILTER,
        1 => "surge=debug",
        _ => "surge=trace",
    }
}

/// Logs go to stderr so stdout stays clean for the summary and NDJSON output.
pub(crate) fn init(verbose: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
