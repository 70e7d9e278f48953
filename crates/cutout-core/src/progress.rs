//! Progress mapping for a single transformation run.
//!
//! The transformation reports raw `(current, total)` unit counts with no
//! ordering guarantee. [`ProgressTracker`] turns them into a percentage
//! that never moves backwards within a run.

/// Convert a `(current, total)` report to a rounded percentage.
///
/// Returns `None` when `total` is zero. The result is clamped to
/// `0..=100` so over-reporting transformations cannot overflow the bar.
#[must_use]
pub fn percent_of(current: u64, total: u64) -> Option<u8> {
    if total == 0 {
        return None;
    }
    let current = u128::from(current.min(total));
    let total = u128::from(total);
    // Round half up: (200c + t) / 2t == round(100c / t).
    let percent = (current * 200 + total) / (total * 2);
    u8::try_from(percent.min(100)).ok()
}

/// Monotonic percentage for one transformation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressTracker {
    percent: u8,
}

impl ProgressTracker {
    /// A tracker at 0%.
    #[must_use]
    pub const fn new() -> Self {
        Self { percent: 0 }
    }

    /// Current percentage, `0..=100`.
    #[must_use]
    pub const fn percent(self) -> u8 {
        self.percent
    }

    /// Apply a raw report.
    ///
    /// Reports with `total == 0` are ignored. A report below the highest
    /// value seen keeps the displayed percentage where it is. Returns
    /// `true` when the percentage changed.
    pub fn report(&mut self, current: u64, total: u64) -> bool {
        match percent_of(current, total) {
            Some(percent) if percent > self.percent => {
                self.percent = percent;
                true
            }
            _ => false,
        }
    }

    /// Back to 0% for a new run.
    pub const fn reset(&mut self) {
        self.percent = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_rounds_to_nearest() {
        assert_eq!(percent_of(50, 100), Some(50));
        assert_eq!(percent_of(1, 3), Some(33));
        assert_eq!(percent_of(2, 3), Some(67));
        assert_eq!(percent_of(1, 200), Some(1)); // 0.5 rounds up
        assert_eq!(percent_of(0, 7), Some(0));
        assert_eq!(percent_of(7, 7), Some(100));
    }

    #[test]
    fn zero_total_is_ignored() {
        assert_eq!(percent_of(5, 0), None);
        let mut tracker = ProgressTracker::new();
        tracker.report(30, 100);
        assert!(!tracker.report(5, 0));
        assert_eq!(tracker.percent(), 30);
    }

    #[test]
    fn over_reporting_clamps_to_100() {
        assert_eq!(percent_of(250, 100), Some(100));
        assert_eq!(percent_of(u64::MAX, u64::MAX), Some(100));
    }

    #[test]
    fn tracker_never_regresses() {
        let mut tracker = ProgressTracker::new();
        assert!(tracker.report(60, 100));
        assert!(!tracker.report(20, 100));
        assert_eq!(tracker.percent(), 60);
        assert!(tracker.report(3, 4));
        assert_eq!(tracker.percent(), 75);
    }

    #[test]
    fn per_stage_counters_do_not_pull_progress_back() {
        // A transformation that restarts its counter for a second phase.
        let mut tracker = ProgressTracker::new();
        for current in 0..=10 {
            tracker.report(current, 10);
        }
        tracker.report(1, 10);
        assert_eq!(tracker.percent(), 100);
    }

    #[test]
    fn reset_returns_to_zero() {
        let mut tracker = ProgressTracker::new();
        tracker.report(9, 10);
        tracker.reset();
        assert_eq!(tracker.percent(), 0);
    }
}
