use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::time::Duration;

/// At most one acquisition per `window`.
/// A GCRA limiter with a burst of one: after a successful acquire at `t`,
/// every attempt before `t + window` fails and does not extend the window.
pub struct Cooldown {
    /// `None` when the window is zero, which never limits.
    limiter: Option<DefaultDirectRateLimiter>,
    window: Duration,
}

impl Cooldown {
    pub fn new(window: Duration) -> Self {
        let limiter = Quota::with_period(window)
            .map(|quota| RateLimiter::direct(quota.allow_burst(NonZeroU32::MIN)));

        Self { limiter, window }
    }

    /// Take the slot if the window has elapsed since the last success.
    pub fn try_acquire(&self) -> bool {
        match &self.limiter {
            Some(limiter) => limiter.check().is_ok(),
            None => true,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

impl std::fmt::Debug for Cooldown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cooldown")
            .field("window", &self.window)
            .finish()
    }
}
