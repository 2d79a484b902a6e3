//! Logging setup for binaries and tests that use the scheduler.

use tracing_subscriber::EnvFilter;

/// Filter applied when `RUST_LOG` is unset: scheduler lifecycle at `info`,
/// everything else at `warn`.
pub const DEFAULT_LOG_FILTER: &str = "warn,prometheus_job_scheduler=info";

/// Install a fmt subscriber with [`DEFAULT_LOG_FILTER`] unless one is
/// already installed.
pub fn init_tracing() {
    let _ = init_tracing_with(DEFAULT_LOG_FILTER);
}

/// Install a fmt subscriber that tags every line with the thread name, so
/// worker output (`{prefix}-{id}`) is attributable. `RUST_LOG` wins over
/// `fallback_filter` when set.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init_tracing_with(fallback_filter: &str) -> bool {
    if tracing::dispatcher::has_been_set() {
        return false;
    }
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_install_is_refused() {
        init_tracing();
        assert!(tracing::dispatcher::has_been_set());
        assert!(!init_tracing_with("debug"));
    }
}
