use std::time::Duration;

use crate::pacing::PacingPolicy;
use crate::retry::RetryPolicy;

/// Retry, pacing and timeout settings shared by the providers and the auxiliary client.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderPolicy {
    pub retry: RetryPolicy,
    pub pacing: PacingPolicy,
    /// Timeout for one market backend call.
    pub request_timeout: Duration,
    /// Timeout for one exchange endpoint call.
    pub auxiliary_timeout: Duration,
}

impl Default for ProviderPolicy {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            pacing: PacingPolicy::default(),
            request_timeout: Duration::from_secs(20),
            auxiliary_timeout: Duration::from_secs(10),
        }
    }
}

impl ProviderPolicy {
    /// Three immediate attempts, no pacing. Used by offline tests and tooling.
    pub fn immediate() -> Self {
        Self {
            retry: RetryPolicy::immediate(3),
            pacing: PacingPolicy::unpaced(),
            ..Self::default()
        }
    }

    pub fn request_timeout_ms(&self) -> u64 {
        duration_ms(self.request_timeout)
    }

    pub fn auxiliary_timeout_ms(&self) -> u64 {
        duration_ms(self.auxiliary_timeout)
    }
}

fn duration_ms(duration: Duration) -> u64 {
    duration.as_millis().min(u128::from(u64::MAX)) as u64
}
