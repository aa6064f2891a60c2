// Path: crates/attest-chain-client/src/retry.rs
//! The exponential-backoff retry policy shared by every chain client
//! instance (`spec.md` §4.4, and §9's redesign flag against "ad-hoc
//! utilities scattered across files" — one value type, reused, instead of
//! a bespoke loop per RPC call site).

use std::time::Duration;

/// An exponential backoff schedule capped at `max_backoff`, bounded to at
/// most `max_attempts` total tries.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub max_backoff: Duration,
    pub base_backoff: Duration,
}

impl RetryPolicy {
    /// `spec.md` §4.4 defaults: `MAX_RPC_BACKOFF` = 30s, `MAX_RPC_ATTEMPTS` = 5.
    pub fn from_env_defaults(max_backoff: Duration, max_attempts: u32) -> Self {
        Self {
            max_attempts,
            max_backoff,
            base_backoff: Duration::from_millis(200),
        }
    }

    /// The backoff duration before attempt number `attempt` (1-indexed),
    /// doubling each time and capped at `max_backoff`.
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(20);
        let scaled = self
            .base_backoff
            .saturating_mul(1u32.checked_shl(shift).unwrap_or(u32::MAX));
        scaled.min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_env_defaults(Duration::from_secs(30), 5)
    }
}

/// Runs `op` until it succeeds, `is_transient` says the error is
/// permanent, or `policy.max_attempts` attempts have been made.
///
/// On exhaustion, the last error is returned as-is; the caller is
/// responsible for reclassifying a transient error as `RPC_PERMANENT`
/// once retries are exhausted (`spec.md` §7).
pub async fn retry_transient<T, E, F, Fut>(
    policy: &RetryPolicy,
    is_transient: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if is_transient(&err) && attempt < policy.max_attempts => {
                let delay = policy.backoff_for_attempt(attempt);
                tracing::warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "retrying transient RPC error"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::from_env_defaults(Duration::from_secs(1), 10);
        assert_eq!(policy.backoff_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.backoff_for_attempt(2), Duration::from_millis(400));
        assert_eq!(policy.backoff_for_attempt(3), Duration::from_millis(800));
        assert_eq!(policy.backoff_for_attempt(10), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn retries_transient_then_succeeds() {
        let policy = RetryPolicy::from_env_defaults(Duration::from_millis(10), 5);
        let mut calls = 0;
        let result: Result<u32, String> = retry_transient(
            &policy,
            |_| true,
            || {
                calls += 1;
                let attempt = calls;
                async move {
                    if attempt < 3 {
                        Err("transient".to_string())
                    } else {
                        Ok(42)
                    }
                }
            },
        )
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn permanent_error_is_not_retried() {
        let policy = RetryPolicy::from_env_defaults(Duration::from_millis(10), 5);
        let mut calls = 0;
        let result: Result<u32, String> = retry_transient(&policy, |_| false, || {
            calls += 1;
            async move { Err("permanent".to_string()) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn exhausts_after_max_attempts() {
        let policy = RetryPolicy::from_env_defaults(Duration::from_millis(1), 3);
        let mut calls = 0;
        let result: Result<u32, String> = retry_transient(&policy, |_| true, || {
            calls += 1;
            async move { Err("transient".to_string()) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls, 3);
    }
}
