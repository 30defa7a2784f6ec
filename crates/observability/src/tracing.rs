//! Tracing/logging initialization.
//!
//! The filter comes from `RUST_LOG` and defaults to `info`. Whichever `init*`
//! runs first wins; later calls leave the installed subscriber alone.

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info";

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// JSON logs with timestamps, one object per line, written to stderr.
pub fn init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter())
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Compact human-readable logs on stderr.
pub fn init_pretty() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter())
        .compact()
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    #[test]
    fn repeated_init_is_a_no_op() {
        super::init();
        super::init();
        super::init_pretty();
        ::tracing::info!("still logging");
    }
}
