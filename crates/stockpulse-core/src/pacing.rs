use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Inclusive bounds for the random pause inserted before an upstream call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JitterRange {
    pub min: Duration,
    pub max: Duration,
}

impl JitterRange {
    pub fn new(min: Duration, max: Duration) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    pub fn sample(self) -> Duration {
        let min_ms = self.min.as_millis() as u64;
        let max_ms = self.max.as_millis() as u64;
        Duration::from_millis(fastrand::u64(min_ms..=max_ms))
    }
}

/// Rate budget and jitter applied to one upstream.
#[derive(Debug, Clone, PartialEq)]
pub struct PacingPolicy {
    pub quota_window: Duration,
    pub quota_limit: u32,
    pub jitter: Option<JitterRange>,
}

impl Default for PacingPolicy {
    fn default() -> Self {
        Self {
            quota_window: Duration::from_secs(60),
            quota_limit: 30,
            jitter: Some(JitterRange::new(
                Duration::from_secs(1),
                Duration::from_secs(3),
            )),
        }
    }
}

impl PacingPolicy {
    /// No quota and no jitter.
    pub fn unpaced() -> Self {
        Self {
            quota_window: Duration::ZERO,
            quota_limit: 0,
            jitter: None,
        }
    }
}

/// Waits for rate budget and then sleeps a random jitter before each upstream call.
///
/// Cloned pacers share the same rate budget. The jitter is drawn per call.
#[derive(Clone)]
pub struct RequestPacer {
    limiter: Option<Arc<DirectRateLimiter>>,
    jitter: Option<JitterRange>,
}

impl std::fmt::Debug for RequestPacer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestPacer")
            .field("rate_limited", &self.limiter.is_some())
            .field("jitter", &self.jitter)
            .finish()
    }
}

impl RequestPacer {
    pub fn from_policy(policy: &PacingPolicy) -> Self {
        let limiter = (policy.quota_limit > 0 && !policy.quota_window.is_zero()).then(|| {
            Arc::new(RateLimiter::direct(quota_from_window(
                policy.quota_window,
                policy.quota_limit,
            )))
        });

        Self {
            limiter,
            jitter: policy.jitter,
        }
    }

    pub fn disabled() -> Self {
        Self {
            limiter: None,
            jitter: None,
        }
    }

    /// Non-blocking budget probe, used for diagnostics.
    pub fn has_budget(&self) -> bool {
        self.limiter
            .as_ref()
            .map_or(true, |limiter| limiter.check().is_ok())
    }

    pub async fn pace(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }

        if let Some(jitter) = self.jitter {
            let delay = jitter.sample();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }
}

fn quota_from_window(quota_window: Duration, quota_limit: u32) -> Quota {
    let burst = NonZeroU32::new(quota_limit).unwrap_or(NonZeroU32::MIN);

    let seconds_per_cell = (quota_window.as_secs_f64() / f64::from(burst.get())).max(0.001);
    let period = Duration::from_secs_f64(seconds_per_cell);

    Quota::with_period(period)
        .unwrap_or_else(|| Quota::per_second(burst))
        .allow_burst(burst)
}
