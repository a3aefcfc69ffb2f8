use std::time::Duration;
use tracing::{debug, info};

/// Default delay before the first retry
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Upper bound for any retry delay
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(30_000);

/// Exponential backoff policy shared by the gaze transport and the video stream.
///
/// `delay(n) = min(base * 2^n, max)`. No jitter is applied, so the sequence is
/// fully deterministic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay for attempt 0
    pub base_delay: Duration,
    /// Cap applied to every attempt
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl ReconnectPolicy {
    /// Create a policy with custom bounds
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
        }
    }

    /// Delay to wait before retry number `attempt` (0-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let max_ms = self.max_delay.as_millis() as u64;

        // 2^n overflows long before it matters; saturate and let the cap win
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let delay_ms = base_ms.saturating_mul(factor).min(max_ms);

        Duration::from_millis(delay_ms)
    }

    /// Delay in whole milliseconds
    pub fn delay_ms(&self, attempt: u32) -> u64 {
        self.delay(attempt).as_millis() as u64
    }
}

/// Per-component retry counter.
///
/// Each reconnecting component owns its own counter; it is never shared.
#[derive(Debug, Default)]
pub struct ReconnectAttempts {
    component: &'static str,
    count: u32,
}

impl ReconnectAttempts {
    /// Create a counter for the named component
    pub fn new(component: &'static str) -> Self {
        Self { component, count: 0 }
    }

    /// Current attempt number
    pub fn current(&self) -> u32 {
        self.count
    }

    /// Delay for the current attempt, then advance the counter
    pub fn next_delay(&mut self, policy: &ReconnectPolicy) -> Duration {
        let delay = policy.delay(self.count);
        debug!(
            "{} retry #{} scheduled in {:?}",
            self.component,
            self.count + 1,
            delay
        );
        self.count = self.count.saturating_add(1);
        delay
    }

    /// Count a failed attempt without scheduling a retry
    pub fn record_failure(&mut self) -> u32 {
        self.count = self.count.saturating_add(1);
        debug!("{} attempt #{} failed", self.component, self.count);
        self.count
    }

    /// Reset after a successful connection
    pub fn reset(&mut self) {
        if self.count > 0 {
            info!(
                "{} connected after {} retries, reset retry count",
                self.component, self.count
            );
        }
        self.count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_backoff_sequence() {
        let policy = ReconnectPolicy::default();
        let delays: Vec<u64> = (0..6).map(|n| policy.delay_ms(n)).collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 16000, 30000]);
    }

    #[test]
    fn test_backoff_is_monotonic_and_capped() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_ms(0), 1000);

        for n in 0..200 {
            assert!(policy.delay(n) <= policy.delay(n + 1));
            assert!(policy.delay_ms(n) <= 30_000);
        }
        assert_eq!(policy.delay_ms(u32::MAX), 30_000);
    }

    #[test]
    fn test_attempt_counter_advances_and_resets() {
        let policy = ReconnectPolicy::default();
        let mut attempts = ReconnectAttempts::new("video_stream");

        assert_eq!(attempts.next_delay(&policy), Duration::from_millis(1000));
        assert_eq!(attempts.next_delay(&policy), Duration::from_millis(2000));
        assert_eq!(attempts.current(), 2);

        attempts.reset();
        assert_eq!(attempts.current(), 0);
        assert_eq!(attempts.next_delay(&policy), Duration::from_millis(1000));
    }

    #[test]
    fn test_recorded_failures_feed_the_policy() {
        let policy = ReconnectPolicy::default();
        let mut attempts = ReconnectAttempts::new("gaze_transport");

        assert_eq!(attempts.record_failure(), 1);
        assert_eq!(attempts.record_failure(), 2);
        assert_eq!(policy.delay(attempts.current()), Duration::from_millis(4000));

        attempts.reset();
        assert_eq!(attempts.current(), 0);
    }

    #[test]
    fn test_custom_policy_bounds() {
        let policy = ReconnectPolicy::new(Duration::from_millis(250), Duration::from_millis(1500));
        let delays: Vec<u64> = (0..5).map(|n| policy.delay_ms(n)).collect();
        assert_eq!(delays, vec![250, 500, 1000, 1500, 1500]);
    }
}
