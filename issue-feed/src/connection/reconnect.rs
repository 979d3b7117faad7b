//! Fixed-delay reconnection policy with an attempt cap.

use std::time::Duration;

/// What to do after a connection failure.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetryDecision {
    RetryAfter { delay: Duration, attempt: u32 },
    Exhausted,
}

/// Attempt counter for automatic reconnection.
///
/// The delay is constant between attempts. `attempt` only goes back to zero on a
/// successful connection or on a manual reset after exhaustion.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReconnectPolicy {
    attempt: u32,
    max_attempts: u32,
    delay: Duration,
}

impl ReconnectPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            attempt: 0,
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempt >= self.max_attempts
    }

    /// Consumes one attempt if any are left.
    pub fn next_retry(&mut self) -> RetryDecision {
        if self.is_exhausted() {
            return RetryDecision::Exhausted;
        }
        self.attempt += 1;
        RetryDecision::RetryAfter {
            delay: self.delay,
            attempt: self.attempt,
        }
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::{ReconnectPolicy, RetryDecision};
    use std::time::Duration;

    #[test]
    fn delay_stays_constant_across_attempts() {
        let mut policy = ReconnectPolicy::new(3, Duration::from_millis(250));

        for expected_attempt in 1..=3 {
            assert_eq!(
                policy.next_retry(),
                RetryDecision::RetryAfter {
                    delay: Duration::from_millis(250),
                    attempt: expected_attempt,
                }
            );
        }
        assert_eq!(policy.next_retry(), RetryDecision::Exhausted);
        assert_eq!(policy.attempt(), 3);
    }

    #[test]
    fn reset_allows_retries_again() {
        let mut policy = ReconnectPolicy::new(1, Duration::from_millis(10));
        policy.next_retry();
        assert!(policy.is_exhausted());

        policy.reset();

        assert!(!policy.is_exhausted());
        assert_eq!(policy.attempt(), 0);
    }

    #[test]
    fn zero_max_attempts_is_raised_to_one() {
        let policy = ReconnectPolicy::new(0, Duration::ZERO);

        assert_eq!(policy.max_attempts(), 1);
    }
}
