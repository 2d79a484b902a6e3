//! Worker count resolution.

/// Logical CPUs kept free for the OS and the foreground thread.
pub const RESERVED_CPUS: usize = 2;

/// Default worker count: `max(1, logical_cpus - 2)`.
#[must_use]
pub fn default_worker_count() -> usize {
    num_cpus::get().saturating_sub(RESERVED_CPUS).max(1)
}

/// Resolve a requested worker count. Non-positive requests fall back to
/// [`default_worker_count`].
#[must_use]
pub fn resolve_worker_count(requested: i64) -> usize {
    if requested <= 0 {
        return default_worker_count();
    }
    usize::try_from(requested).unwrap_or(usize::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_at_least_one() {
        assert!(default_worker_count() >= 1);
    }

    #[test]
    fn test_non_positive_requests_use_default() {
        assert_eq!(resolve_worker_count(0), default_worker_count());
        assert_eq!(resolve_worker_count(-7), default_worker_count());
    }

    #[test]
    fn test_positive_request_is_kept() {
        assert_eq!(resolve_worker_count(3), 3);
    }
}
