//! Retry/backoff controller
//!
//! Runs one acquisition attempt at a time with a hard cap on attempts.
//! Non-retriable errors end the loop immediately; retriable ones wait
//! `base_delay * 2^k` after attempt `k` unless it was the last attempt.
//! Every wait and every attempt is raced against the cancellation token.

use crate::error::AcquireError;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Attempt cap and backoff base
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Wait after failed attempt `attempt` (zero-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Upper bound of all backoff sleeps in one acquisition
    pub fn max_total_delay(&self) -> Duration {
        (0..self.max_attempts.saturating_sub(1))
            .map(|k| self.delay_for(k))
            .fold(Duration::ZERO, Duration::saturating_add)
    }
}

/// Why an acquisition ended without success
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireFailure {
    /// A non-retriable error (not found, invalid content, filesystem, cancelled)
    Terminal { attempts: u32, error: AcquireError },
    /// Every attempt hit a retriable error
    Exhausted { attempts: u32, last_error: AcquireError },
}

impl AcquireFailure {
    pub fn error(&self) -> &AcquireError {
        match self {
            AcquireFailure::Terminal { error, .. } => error,
            AcquireFailure::Exhausted { last_error, .. } => last_error,
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            AcquireFailure::Terminal { attempts, .. } | AcquireFailure::Exhausted { attempts, .. } => {
                *attempts
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.error(), AcquireError::Cancelled)
    }

    /// Short label for log fields
    pub fn kind(&self) -> &'static str {
        match self {
            AcquireFailure::Terminal { error, .. } => error.kind(),
            AcquireFailure::Exhausted { .. } => "exhausted",
        }
    }
}

impl std::fmt::Display for AcquireFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AcquireFailure::Terminal { attempts, error } => {
                write!(f, "{} (after {} attempt(s))", error, attempts)
            }
            AcquireFailure::Exhausted {
                attempts,
                last_error,
            } => write!(f, "exhausted {} attempts, last error: {}", attempts, last_error),
        }
    }
}

/// Run `operation` under `policy`
///
/// `operation` receives the zero-based attempt number.
pub async fn retry_with_backoff<F, Fut, T>(
    operation_name: &str,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T, AcquireFailure>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, AcquireError>>,
{
    let start_time = Instant::now();
    let max_attempts = policy.max_attempts.max(1);

    for attempt in 0..max_attempts {
        if cancel.is_cancelled() {
            return Err(AcquireFailure::Terminal {
                attempts: attempt,
                error: AcquireError::Cancelled,
            });
        }

        if attempt > 0 {
            tracing::debug!(operation = operation_name, attempt, "Retrying acquisition");
        }

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AcquireError::Cancelled),
            result = operation(attempt) => result,
        };

        let err = match result {
            Ok(value) => {
                if attempt > 0 {
                    tracing::debug!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = start_time.elapsed().as_millis() as u64,
                        "Acquisition succeeded after retry"
                    );
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if !err.is_retriable() {
            return Err(AcquireFailure::Terminal {
                attempts: attempt + 1,
                error: err,
            });
        }

        if attempt + 1 >= max_attempts {
            tracing::warn!(
                operation = operation_name,
                attempts = attempt + 1,
                elapsed_ms = start_time.elapsed().as_millis() as u64,
                error = %err.truncated_reason(),
                "Retry budget exhausted"
            );
            return Err(AcquireFailure::Exhausted {
                attempts: attempt + 1,
                last_error: err,
            });
        }

        let backoff = policy.delay_for(attempt);
        if matches!(err, AcquireError::QuotaExceeded(_)) {
            tracing::warn!(
                operation = operation_name,
                attempt,
                backoff_ms = backoff.as_millis() as u64,
                error = %err.truncated_reason(),
                "Quota exceeded; retrying may burn budget without succeeding"
            );
        } else {
            tracing::warn!(
                operation = operation_name,
                attempt,
                backoff_ms = backoff.as_millis() as u64,
                error = %err.truncated_reason(),
                "Transient failure, will retry after backoff"
            );
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(AcquireFailure::Terminal {
                    attempts: attempt + 1,
                    error: AcquireError::Cancelled,
                });
            }
            _ = tokio::time::sleep(backoff) => {}
        }
    }

    // max_attempts >= 1, so the loop always returns
    Err(AcquireFailure::Exhausted {
        attempts: max_attempts,
        last_error: AcquireError::Transient("no attempt made".to_string()),
    })
}
