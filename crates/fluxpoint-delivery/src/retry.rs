//! In-process retry schedule with exponential backoff and jitter.
//!
//! Covers only the bounded retries the worker performs within a single
//! lease; durable rescheduling across leases belongs to the store.

use std::time::Duration;

use rand::Rng;

/// Schedule for in-process retries within one delivery.
#[derive(Debug, Clone)]
pub struct RetrySchedule {
    /// Retries after the first attempt. Total attempts per delivery are
    /// `immediate_retry_max + 1`.
    pub immediate_retry_max: u32,

    /// Base delay for exponential backoff calculation.
    pub base_delay: Duration,

    /// Jitter fraction applied to each delay (0.0 to 1.0).
    pub jitter_factor: f64,
}

impl Default for RetrySchedule {
    fn default() -> Self {
        Self {
            immediate_retry_max: crate::DEFAULT_IMMEDIATE_RETRY_MAX,
            base_delay: Duration::from_secs(1),
            jitter_factor: 0.2,
        }
    }
}

impl RetrySchedule {
    /// Delay before retry `retry_index` (1-based).
    ///
    /// The unjittered delay doubles per retry: `base_delay * 2^(k-1)`.
    /// Jitter is a uniform offset within `±jitter_factor` of that attempt's
    /// delay.
    pub fn delay_for(&self, retry_index: u32) -> Duration {
        let exponent = retry_index.saturating_sub(1).min(20);
        let delay = self.base_delay.saturating_mul(2_u32.saturating_pow(exponent));
        jittered(delay, self.jitter_factor)
    }
}

/// Applies a uniform `±factor` jitter to a duration.
///
/// Randomizing retry and poll timing spreads load when many workers share
/// one store. Millisecond granularity matches the configured delays.
pub fn jittered(duration: Duration, factor: f64) -> Duration {
    if factor <= 0.0 {
        return duration;
    }

    let clamped = factor.clamp(0.0, 1.0);
    let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let span = (millis as f64 * clamped) as u64;
    if span == 0 {
        return duration;
    }

    let offset = rand::rng().random_range(0..=span * 2);
    Duration::from_millis(millis.saturating_sub(span).saturating_add(offset))
}
