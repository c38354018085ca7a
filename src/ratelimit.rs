use std::time::Duration;

use governor::{DefaultDirectRateLimiter, Quota};

/// Spaces outbound calls at least `interval` apart.
///
/// One limiter is shared by every caller that talks to the same upstream, so
/// concurrent enrichment workers draw from a single budget.
pub struct RateLimiter {
    inner: Option<DefaultDirectRateLimiter>,
    interval: Duration,
}

impl RateLimiter {
    /// A zero interval disables throttling.
    pub fn new(interval: Duration) -> Self {
        // Burst of one: a grant is only available `interval` after the last.
        let inner = Quota::with_period(interval).map(DefaultDirectRateLimiter::direct);
        RateLimiter { inner, interval }
    }

    pub fn unlimited() -> Self {
        RateLimiter::new(Duration::ZERO)
    }

    /// Wait until the next call is allowed.
    pub async fn acquire(&self) {
        if let Some(limiter) = &self.inner {
            limiter.until_ready().await;
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}
