//! Backoff policy for transient failures.

use std::time::Duration;

use largo_config::TransferSettings;
use rand::Rng;
use tokio::sync::watch;

/// Retry bound and delay schedule shared by the executor and the verifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Ceiling for computed delays.
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Policy taken from transfer settings.
    #[must_use]
    pub fn from_settings(settings: &TransferSettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            base_delay: settings.base_retry_delay,
            max_delay: settings.max_retry_delay,
        }
    }

    /// Whether another attempt is allowed after `attempts` have failed.
    #[must_use]
    pub const fn allows_retry(&self, attempts: u32) -> bool {
        attempts <= self.max_retries
    }

    /// Delay before retry number `retry` (1-based).
    ///
    /// A server-supplied `Retry-After` wins; otherwise the delay doubles from the base
    /// and is jittered into the upper half of its range. Both are capped at `max_delay`.
    #[must_use]
    pub fn delay(&self, retry: u32, retry_after: Option<Duration>) -> Duration {
        if let Some(requested) = retry_after {
            return requested.min(self.max_delay);
        }
        let exponent = retry.saturating_sub(1).min(16);
        let capped = self
            .base_delay
            .saturating_mul(1_u32 << exponent)
            .min(self.max_delay);
        let millis = u64::try_from(capped.as_millis()).unwrap_or(u64::MAX);
        if millis < 2 {
            return capped;
        }
        let jittered = rand::rng().random_range(millis / 2..=millis);
        Duration::from_millis(jittered)
    }
}

/// Sleep for `delay` unless `cancel` turns `true` first.
///
/// Returns `false` when cancelled. A closed channel never cancels.
pub(crate) async fn backoff(delay: Duration, cancel: &mut watch::Receiver<bool>) -> bool {
    let flagged = tokio::select! {
        () = tokio::time::sleep(delay) => return true,
        flagged = cancel.wait_for(|cancelled| *cancelled) => flagged.is_ok(),
    };
    if flagged {
        return false;
    }
    tokio::time::sleep(delay).await;
    true
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&TransferSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(base_ms: u64, max_ms: u64) -> RetryPolicy {
        RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(base_ms),
            max_delay: Duration::from_millis(max_ms),
        }
    }

    #[test]
    fn retry_bound_counts_retries_after_the_first_attempt() {
        let policy = policy(0, 0);
        assert!(policy.allows_retry(1));
        assert!(policy.allows_retry(2));
        assert!(!policy.allows_retry(3));
    }

    #[test]
    fn delays_grow_within_jitter_band_and_cap() {
        let policy = policy(100, 1_000);
        for retry in 1..=8 {
            let ceiling = Duration::from_millis(100)
                .saturating_mul(1 << (retry - 1))
                .min(Duration::from_millis(1_000));
            let delay = policy.delay(retry, None);
            assert!(delay <= ceiling, "retry {retry}: {delay:?} > {ceiling:?}");
            assert!(delay >= ceiling / 2, "retry {retry}: {delay:?} < half of {ceiling:?}");
        }
    }

    #[test]
    fn retry_after_overrides_schedule_within_the_cap() {
        let policy = policy(100, 1_000);
        assert_eq!(
            policy.delay(1, Some(Duration::from_millis(700))),
            Duration::from_millis(700)
        );
        assert_eq!(
            policy.delay(1, Some(Duration::from_secs(3_600))),
            Duration::from_secs(1)
        );
        assert_eq!(self::policy(0, 0).delay(5, None), Duration::ZERO);
    }

    #[tokio::test]
    async fn backoff_wakes_on_cancellation() {
        let (cancel_tx, mut cancel) = watch::channel(false);
        let sleeper = tokio::spawn(async move { backoff(Duration::from_secs(3_600), &mut cancel).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel_tx.send_replace(true);
        let finished = tokio::time::timeout(Duration::from_secs(5), sleeper).await;
        assert!(matches!(finished, Ok(Ok(false))));
    }

    #[tokio::test]
    async fn backoff_sleeps_through_a_closed_channel() {
        let (cancel_tx, mut cancel) = watch::channel(false);
        drop(cancel_tx);
        assert!(backoff(Duration::from_millis(10), &mut cancel).await);
    }
}
