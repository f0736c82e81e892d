//! Cooperative cancellation and stop conditions.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::StopPolicy;

/// Shared stop request flag, polled by the loop at every iteration.
#[derive(Debug, Clone, Default)]
pub struct StopToken {
    flag: Arc<AtomicBool>,
}

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Clear an earlier request. Do this before the token is armed for a
    /// new run, never while one is active.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Why a run ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    UserRequested,
    /// Force exceeded `max_force`; torque was cut.
    Overload,
    /// Force collapsed relative to the previous reading.
    SampleBreak,
    TravelLimit,
}

impl StopReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UserRequested => "user_requested",
            Self::Overload => "overload",
            Self::SampleBreak => "sample_break",
            Self::TravelLimit => "travel_limit",
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl StopPolicy {
    #[inline]
    pub fn is_overload(&self, weight: f64) -> bool {
        weight > self.max_force
    }

    /// `previous` is the last non-zero reading.
    #[inline]
    pub fn is_break(&self, previous: f64, weight: f64) -> bool {
        self.break_ratio > 0.0 && previous > self.break_floor && weight < previous * self.break_ratio
    }

    #[inline]
    pub fn is_travel_limit(&self, position: i32) -> bool {
        position >= self.travel_limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(10.0, 0.05, true)]
    #[case(10.0, 1.0, false)] // exactly ratio, not below
    #[case(0.5, 0.01, false)] // previous not above floor
    #[case(0.6, 0.01, true)]
    #[case(150.0, 149.0, false)]
    fn break_detection(#[case] prev: f64, #[case] w: f64, #[case] expected: bool) {
        assert_eq!(StopPolicy::default().is_break(prev, w), expected);
    }

    #[test]
    fn zero_ratio_disables_break_detection() {
        let p = StopPolicy {
            break_ratio: 0.0,
            ..StopPolicy::default()
        };
        assert!(!p.is_break(100.0, 0.0));
    }

    #[test]
    fn limits_are_inclusive_for_travel_exclusive_for_force() {
        let p = StopPolicy::default();
        assert!(!p.is_overload(200.0));
        assert!(p.is_overload(200.01));
        assert!(p.is_travel_limit(1000));
        assert!(!p.is_travel_limit(999));
    }

    #[test]
    fn token_clones_share_flag() {
        let t = StopToken::new();
        let c = t.clone();
        c.request();
        assert!(t.is_requested());
        t.reset();
        assert!(!c.is_requested());
    }
}
