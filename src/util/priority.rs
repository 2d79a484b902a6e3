//! Job priority bands.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Priority of a queued job.
///
/// **Lower values are more urgent.** `Priority(0)` is serviced before every
/// other priority and `Priority(255)` after every other priority. Jobs with
/// equal priority are serviced in arrival order.
///
/// ```
/// use prometheus_job_scheduler::util::Priority;
///
/// assert!(Priority::HIGHEST < Priority::NORMAL);
/// assert!(Priority::HIGHEST.is_more_urgent_than(Priority::LOW));
/// assert_eq!(Priority::default(), Priority::NORMAL);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Priority(pub u8);

impl Priority {
    /// Most urgent band. Parallel batches are always queued here.
    pub const HIGHEST: Self = Self(0);
    /// Above the default band.
    pub const HIGH: Self = Self(64);
    /// Default mid band.
    pub const NORMAL: Self = Self(128);
    /// Below the default band.
    pub const LOW: Self = Self(192);
    /// Least urgent band.
    pub const LOWEST: Self = Self(u8::MAX);

    /// Create a priority from its numeric value.
    #[must_use]
    pub const fn new(value: u8) -> Self {
        Self(value)
    }

    /// Numeric value of this priority.
    #[must_use]
    pub const fn value(self) -> u8 {
        self.0
    }

    /// Whether `self` is dequeued before `other`.
    #[must_use]
    pub const fn is_more_urgent_than(self, other: Self) -> bool {
        self.0 < other.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::NORMAL
    }
}

impl From<u8> for Priority {
    fn from(value: u8) -> Self {
        Self(value)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lower_value_is_more_urgent() {
        assert!(Priority::HIGHEST.is_more_urgent_than(Priority::HIGH));
        assert!(Priority::HIGH.is_more_urgent_than(Priority::NORMAL));
        assert!(Priority::NORMAL.is_more_urgent_than(Priority::LOW));
        assert!(Priority::LOW.is_more_urgent_than(Priority::LOWEST));
        assert!(!Priority::NORMAL.is_more_urgent_than(Priority::NORMAL));
    }

    #[test]
    fn test_serde_is_plain_number() {
        let json = serde_json::to_string(&Priority::new(7)).unwrap();
        assert_eq!(json, "7");
        let parsed: Priority = serde_json::from_str("200").unwrap();
        assert_eq!(parsed, Priority(200));
    }
}
