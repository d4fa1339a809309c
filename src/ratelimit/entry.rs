//! Per-key fixed-window state.

use std::time::Duration;

/// Admission state for one key within its current window.
///
/// `count` is at least 1 once the entry exists: an entry is only ever
/// created by an admitted call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitEntry {
    /// Calls admitted in the current window
    pub count: u64,
    /// Epoch millis at which the window closes
    pub window_end: u64,
}

impl RateLimitEntry {
    /// Open a fresh window at `now` with one admitted call.
    pub fn open(now: u64, window_ms: u64) -> Self {
        Self {
            count: 1,
            window_end: now.saturating_add(window_ms),
        }
    }

    /// Whether the window has closed. A call landing exactly on
    /// `window_end` still belongs to the old window.
    pub fn is_expired(&self, now: u64) -> bool {
        now > self.window_end
    }

    /// Time left until the window closes.
    pub fn resets_in(&self, now: u64) -> Duration {
        Duration::from_millis(self.window_end.saturating_sub(now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_starts_at_one() {
        let entry = RateLimitEntry::open(1_000, 500);
        assert_eq!(entry.count, 1);
        assert_eq!(entry.window_end, 1_500);
    }

    #[test]
    fn test_expiry_is_strict() {
        let entry = RateLimitEntry::open(0, 1_000);
        assert!(!entry.is_expired(999));
        assert!(!entry.is_expired(1_000));
        assert!(entry.is_expired(1_001));
    }

    #[test]
    fn test_resets_in() {
        let entry = RateLimitEntry::open(0, 1_000);
        assert_eq!(entry.resets_in(250), Duration::from_millis(750));
        assert_eq!(entry.resets_in(5_000), Duration::ZERO);
    }

    #[test]
    fn test_open_saturates() {
        let entry = RateLimitEntry::open(u64::MAX - 1, 10);
        assert_eq!(entry.window_end, u64::MAX);
    }
}
