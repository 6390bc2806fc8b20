//! Retry with exponential backoff and jitter for external calls.
//!
//! Every attempt runs under the policy's call timeout, so no call site can
//! block indefinitely. Only errors classified as transient are retried.

use std::future::Future;
use std::time::Duration;

use lumen_common::{LumenError, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    /// Upper bound of the random extra delay, as a fraction of the base delay
    pub jitter: f64,
    /// Timeout applied to each individual attempt
    pub call_timeout_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter: 0.25,
            call_timeout_ms: 60_000,
        }
    }
}

impl RetryPolicy {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// Delay before the retry that follows failure number `failures`
    /// (0-based), capped at `max_delay_ms`.
    pub fn backoff_delay(&self, failures: u32) -> Duration {
        let base = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(failures as i32);
        let jitter = if self.jitter > 0.0 {
            base * rand::thread_rng().gen_range(0.0..self.jitter)
        } else {
            0.0
        };
        let delay = ((base + jitter) as u64).min(self.max_delay_ms);
        Duration::from_millis(delay)
    }
}

/// Extract a `retry-after: N` hint (seconds) from a provider error message.
pub fn parse_retry_after(error_msg: &str) -> Option<Duration> {
    let lower = error_msg.to_lowercase();
    let pos = lower.find("retry-after")?;
    lower[pos..]
        .split_whitespace()
        .skip(1)
        .find_map(|word| {
            word.trim_matches(|c: char| !c.is_ascii_digit())
                .parse::<u64>()
                .ok()
        })
        .map(Duration::from_secs)
}

/// Run `call` until it succeeds, fails terminally, or the policy's attempts
/// are exhausted. The last error is returned on exhaustion.
pub async fn retry_transient<T, F, Fut>(policy: &RetryPolicy, operation: &str, mut call: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;

        let outcome = match tokio::time::timeout(policy.call_timeout(), call()).await {
            Ok(result) => result,
            Err(_) => Err(LumenError::Timeout(format!(
                "{operation} exceeded {}ms",
                policy.call_timeout_ms
            ))),
        };

        let error = match outcome {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if attempt >= max_attempts || !error.is_transient() {
            return Err(error);
        }

        let delay = match &error {
            LumenError::Llm { message, .. } => parse_retry_after(message)
                .map(|d| d.min(Duration::from_millis(policy.max_delay_ms))),
            _ => None,
        }
        .unwrap_or_else(|| policy.backoff_delay(attempt - 1));

        warn!(
            operation,
            attempt,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Retrying transient failure"
        );

        tokio::time::sleep(delay).await;
    }
}
