//! Retry policy: how many attempts, and how long to wait between them.

use std::time::Duration;

use crate::domain::ChannelError;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total deliveries allowed per task, the first one included.
    pub max_attempts: u32,

    /// Delay after the first failure.
    pub base_delay: Duration,

    pub multiplier: f64,

    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

/// What to do with a task whose delivery just failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    GiveUp,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Delay before the next attempt, given `attempts` deliveries already
    /// made (1-indexed): `base_delay * multiplier^(attempts - 1)`, capped.
    ///
    /// With base 1s, multiplier 2.0: 1s, 2s, 4s, 8s, ...
    pub fn next_delay(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs)
    }

    pub fn decide(&self, attempts: u32, error: &ChannelError) -> RetryDecision {
        if !error.is_transient() || attempts >= self.max_attempts {
            return RetryDecision::GiveUp;
        }
        RetryDecision::RetryAfter(self.next_delay(attempts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            multiplier: 2.0,
            max_delay: Duration::from_secs(10),
        }
    }

    #[test]
    fn exponential_backoff_increases_until_the_cap() {
        let policy = policy();
        assert_eq!(policy.next_delay(1), Duration::from_secs(2));
        assert_eq!(policy.next_delay(2), Duration::from_secs(4));
        assert_eq!(policy.next_delay(3), Duration::from_secs(8));
        assert_eq!(policy.next_delay(4), Duration::from_secs(10));
        assert_eq!(policy.next_delay(u32::MAX), Duration::from_secs(10));
    }

    #[test]
    fn zero_attempts_uses_the_base_delay() {
        assert_eq!(policy().next_delay(0), Duration::from_secs(2));
    }

    #[test]
    fn transient_errors_retry_until_max_attempts() {
        let policy = policy();
        let err = ChannelError::unreachable("down");
        assert_eq!(
            policy.decide(1, &err),
            RetryDecision::RetryAfter(Duration::from_secs(2))
        );
        assert_eq!(
            policy.decide(2, &err),
            RetryDecision::RetryAfter(Duration::from_secs(4))
        );
        assert_eq!(policy.decide(3, &err), RetryDecision::GiveUp);
    }

    #[test]
    fn provider_rejection_is_retried_within_budget() {
        let err = ChannelError::rejected("unknown recipient");
        assert_eq!(
            policy().decide(1, &err),
            RetryDecision::RetryAfter(Duration::from_secs(2))
        );
        assert_eq!(policy().decide(3, &err), RetryDecision::GiveUp);
    }

    #[test]
    fn wiring_errors_never_retry() {
        let err = ChannelError::NotRegistered(crate::domain::Channel::Email);
        assert_eq!(policy().decide(1, &err), RetryDecision::GiveUp);
    }

    #[test]
    fn single_attempt_policy_gives_up_immediately() {
        let policy = RetryPolicy {
            max_attempts: 1,
            ..policy()
        };
        let err = ChannelError::unreachable("down");
        assert_eq!(policy.decide(1, &err), RetryDecision::GiveUp);
    }
}
