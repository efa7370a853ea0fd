//! Bounded retries with exponential backoff for remote calls.
//!
//! Every attempt runs under the policy's deadline; a missed deadline counts
//! as a transient network timeout. Permanent failures return at once, and
//! retrying stops as soon as the caller reports the device went offline.

use bridge_traits::content::SourceError;
use core_runtime::config::FetchPolicy;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// The last error seen, and how many attempts were made before giving up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryFailure {
    pub error: SourceError,
    pub attempts: u32,
}

/// Delay before the retry that follows attempt number `attempt` (1-based).
///
/// A server hint replaces the exponential delay; both are capped at
/// `max_delay`.
pub fn backoff_delay(policy: &FetchPolicy, attempt: u32, hint: Option<Duration>) -> Duration {
    let computed = hint.unwrap_or_else(|| {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        policy.base_delay.saturating_mul(factor)
    });
    computed.min(policy.max_delay)
}

/// Run `op` until it succeeds, fails permanently, runs out of attempts, or
/// `keep_trying` returns false.
///
/// Returns the value together with the number of attempts it took.
pub async fn fetch_with_retry<T, F, Fut, C>(
    policy: &FetchPolicy,
    key: &str,
    keep_trying: C,
    mut op: F,
) -> Result<(T, u32), RetryFailure>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SourceError>>,
    C: Fn() -> bool,
{
    let mut attempt = 0;

    loop {
        attempt += 1;
        let outcome = match tokio::time::timeout(policy.timeout, op()).await {
            Ok(outcome) => outcome,
            Err(_) => Err(SourceError::timeout(format!(
                "no response within {}ms",
                policy.timeout.as_millis()
            ))),
        };

        let error = match outcome {
            Ok(value) => {
                debug!(key, attempt, "Remote call succeeded");
                return Ok((value, attempt));
            }
            Err(error) => error,
        };

        if !error.is_transient() {
            debug!(key, attempt, error = %error, "Permanent remote failure");
            return Err(RetryFailure {
                error,
                attempts: attempt,
            });
        }
        if attempt >= policy.max_attempts {
            warn!(key, attempts = attempt, error = %error, "Remote call failed, attempts exhausted");
            return Err(RetryFailure {
                error,
                attempts: attempt,
            });
        }
        if !keep_trying() {
            debug!(key, attempt, "Went offline, abandoning retries");
            return Err(RetryFailure {
                error,
                attempts: attempt,
            });
        }

        let delay = backoff_delay(policy, attempt, error.retry_after());
        warn!(
            key,
            attempt,
            max_attempts = policy.max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Remote call failed, retrying"
        );
        tokio::time::sleep(delay).await;

        if !keep_trying() {
            debug!(key, attempt, "Went offline during backoff");
            return Err(RetryFailure {
                error,
                attempts: attempt,
            });
        }
    }
}
