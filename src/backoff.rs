//! Exponential backoff with jitter, shared by broker reconnection and task
//! restarts.

use std::time::Duration;

use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    jitter: bool,
}

impl Backoff {
    pub const fn new(base: Duration, max: Duration) -> Backoff {
        Backoff {
            base,
            max,
            jitter: true,
        }
    }

    pub const fn without_jitter(self) -> Backoff {
        Backoff {
            jitter: false,
            ..self
        }
    }

    /// Upper bound of the delay before retry `attempt` (0-based):
    /// `base * 2^attempt`, capped at `max`.
    pub fn ceiling(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(20));
        self.base.saturating_mul(factor).min(self.max)
    }

    /// Delay before retry `attempt`. With jitter the delay is drawn from the
    /// upper half of `[0, ceiling]`, so it never collapses to zero.
    pub fn delay(&self, attempt: u32) -> Duration {
        let ceiling = self.ceiling(attempt);
        if !self.jitter {
            return ceiling;
        }

        let half_ms = u64::try_from(ceiling.as_millis() / 2).unwrap_or(u64::MAX / 2);
        let jitter_ms = rand::thread_rng().gen_range(0..=half_ms);
        Duration::from_millis(half_ms + jitter_ms)
    }
}
