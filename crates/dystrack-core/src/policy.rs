//! Bounded retry and file-stability policies.
//!
//! Pure, deterministic state machines. Callers own the clock and the sleeping.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ─── Retry Policy ────────────────────────────────────────────────

/// Bound and backoff for sending one payload through a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryPolicy {
    /// Regular send attempts before the fallback engages (default 3).
    pub max_attempts: u32,
    /// Delay before the second attempt in milliseconds (default 200).
    pub initial_backoff_ms: u64,
    /// Backoff multiplier per further attempt (default 2.0).
    pub multiplier: f64,
    /// Upper bound for a single delay in milliseconds (default 2000).
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 200,
            multiplier: 2.0,
            max_backoff_ms: 2_000,
        }
    }
}

impl RetryPolicy {
    /// Policy without delays, for hosts that drive their own clock.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff_ms: 0,
            multiplier: 1.0,
            max_backoff_ms: 0,
        }
    }

    /// Delay to wait before the 1-based `attempt`. The first attempt never waits.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let exp = (attempt - 2).min(16) as i32;
        let raw = (self.initial_backoff_ms as f64) * self.multiplier.max(1.0).powi(exp);
        Duration::from_millis((raw as u64).min(self.max_backoff_ms))
    }
}

// ─── File Stability ──────────────────────────────────────────────

/// How long to wait for the microscope to finish writing an image file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StabilityPolicy {
    /// Interval between size checks in milliseconds (default 2000).
    pub check_interval_ms: u64,
    /// Consecutive unchanged sizes required to call the file complete (default 1).
    pub stable_checks: u32,
    /// Hard bound on size checks before giving up (default 30).
    pub max_checks: u32,
}

impl Default for StabilityPolicy {
    fn default() -> Self {
        Self {
            check_interval_ms: 2_000,
            stable_checks: 1,
            max_checks: 30,
        }
    }
}

impl StabilityPolicy {
    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }
}

/// Decision after observing one file size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StabilityStep {
    /// Keep waiting; the file grew or has not been stable long enough.
    Wait,
    /// Size unchanged for the required number of checks.
    Stable { size: u64 },
    /// Check budget used up while the file was still changing.
    Exhausted { last_size: u64 },
}

/// Tracks successive size observations of a file being written.
#[derive(Debug, Clone)]
pub struct StabilityTracker {
    policy: StabilityPolicy,
    last_size: Option<u64>,
    unchanged: u32,
    checks: u32,
}

impl StabilityTracker {
    pub fn new(policy: StabilityPolicy) -> Self {
        Self {
            policy,
            last_size: None,
            unchanged: 0,
            checks: 0,
        }
    }

    pub fn observe(&mut self, size: u64) -> StabilityStep {
        self.checks += 1;
        match self.last_size {
            Some(prev) if prev == size => self.unchanged += 1,
            _ => self.unchanged = 0,
        }
        self.last_size = Some(size);

        if self.unchanged >= self.policy.stable_checks.max(1) {
            return StabilityStep::Stable { size };
        }
        if self.checks >= self.policy.max_checks.max(1) {
            return StabilityStep::Exhausted { last_size: size };
        }
        StabilityStep::Wait
    }

    pub fn checks(&self) -> u32 {
        self.checks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_attempt_never_waits() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_before(0), Duration::ZERO);
        assert_eq!(policy.delay_before(1), Duration::ZERO);
    }

    #[test]
    fn backoff_grows_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_before(2), Duration::from_millis(200));
        assert_eq!(policy.delay_before(3), Duration::from_millis(400));
        assert_eq!(policy.delay_before(10), Duration::from_millis(2_000));
    }

    #[test]
    fn immediate_policy_has_no_delay() {
        let policy = RetryPolicy::immediate(3);
        assert_eq!(policy.delay_before(3), Duration::ZERO);
    }

    #[test]
    fn retry_policy_fills_missing_fields() {
        let policy: RetryPolicy = serde_json::from_str(r#"{"max_attempts": 5}"#).expect("parse");
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.initial_backoff_ms, 200);
    }

    #[test]
    fn growing_file_waits_then_stabilizes() {
        let mut tracker = StabilityTracker::new(StabilityPolicy::default());
        assert_eq!(tracker.observe(100), StabilityStep::Wait);
        assert_eq!(tracker.observe(250), StabilityStep::Wait);
        assert_eq!(tracker.observe(250), StabilityStep::Stable { size: 250 });
        assert_eq!(tracker.checks(), 3);
    }

    #[test]
    fn stable_checks_requires_repeats() {
        let policy = StabilityPolicy {
            stable_checks: 2,
            ..Default::default()
        };
        let mut tracker = StabilityTracker::new(policy);
        assert_eq!(tracker.observe(10), StabilityStep::Wait);
        assert_eq!(tracker.observe(10), StabilityStep::Wait);
        assert_eq!(tracker.observe(10), StabilityStep::Stable { size: 10 });
    }

    #[test]
    fn shrinking_resets_stability() {
        let mut tracker = StabilityTracker::new(StabilityPolicy::default());
        tracker.observe(10);
        assert_eq!(tracker.observe(5), StabilityStep::Wait);
        assert_eq!(tracker.observe(5), StabilityStep::Stable { size: 5 });
    }

    #[test]
    fn ever_growing_file_exhausts_budget() {
        let policy = StabilityPolicy {
            max_checks: 3,
            ..Default::default()
        };
        let mut tracker = StabilityTracker::new(policy);
        assert_eq!(tracker.observe(1), StabilityStep::Wait);
        assert_eq!(tracker.observe(2), StabilityStep::Wait);
        assert_eq!(tracker.observe(3), StabilityStep::Exhausted { last_size: 3 });
    }
}
