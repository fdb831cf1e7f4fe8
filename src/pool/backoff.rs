//! Exponential backoff used to space out retries of unhealthy hosts.

use std::time::Duration;

use rand::{Rng, SeedableRng, rngs::StdRng};

/// Default delay before an unhealthy host is retried for the first time.
pub const DEFAULT_RETRY_BASE: Duration = Duration::from_secs(30);
/// Default upper bound on the delay between retries of one host.
pub const DEFAULT_RETRY_CAP: Duration = Duration::from_secs(900);

/// How long an unhealthy host sits out before it is eligible again.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base: Duration,
    pub cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base: DEFAULT_RETRY_BASE,
            cap: DEFAULT_RETRY_CAP,
        }
    }
}

/// Produces jittered delays that double per consecutive failure.
pub(crate) struct Backoff {
    policy: RetryPolicy,
    rng: StdRng,
}

impl Backoff {
    pub(crate) fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            rng: StdRng::from_entropy(),
        }
    }

    /// Delay after the `failures`-th consecutive failure (1-based).
    ///
    /// The result lies in `[d/2, d]` where `d = base * 2^(failures-1)`,
    /// clamped to the policy cap.
    pub(crate) fn delay(&mut self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(31);
        let ceiling = self
            .policy
            .base
            .saturating_mul(1u32 << exponent)
            .min(self.policy.cap);
        let max_ms = ceiling.as_millis().min(u128::from(u64::MAX)) as u64;
        if max_ms < 2 {
            return ceiling;
        }
        Duration::from_millis(self.rng.gen_range(max_ms / 2..=max_ms))
    }
}
