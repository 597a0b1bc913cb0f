//! Bounded per-stage retry.
//!
//! Every stage runs through `run_stage`, which re-attempts failed stages up
//! to the configured bound with a fixed delay between attempts. Only errors
//! the stage marks as retryable are retried; schema and input errors fail
//! immediately since identical input reproduces the same failure.

use std::future::Future;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::RetryConfig;
use crate::emit;
use crate::metrics::events::{StageCompleted, StageDuration, StageRetried, StageStatus};

/// Classifies errors by whether a retry could plausibly succeed.
pub trait Retryable {
    /// Check if retrying the failed operation could plausibly succeed.
    fn is_retryable(&self) -> bool;
}

/// Retry bounds applied to each stage.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the first failed attempt.
    pub max_retries: usize,
    /// Wait between attempts.
    pub delay: Duration,
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries as usize,
            delay: config.delay(),
        }
    }
}

/// Run one stage attempt-by-attempt under the retry policy.
///
/// Returns the stage result plus the number of retries performed. A
/// shutdown during the between-attempt wait stops retrying and surfaces
/// the last failure.
pub async fn run_stage<T, E, F, Fut>(
    stage: &'static str,
    policy: &RetryPolicy,
    shutdown: &CancellationToken,
    mut attempt: F,
) -> Result<(T, usize), E>
where
    E: Retryable + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut retries = 0usize;
    loop {
        let started = Instant::now();
        let result = attempt().await;
        emit!(StageDuration {
            stage,
            duration: started.elapsed(),
        });

        let error = match result {
            Ok(value) => {
                emit!(StageCompleted {
                    stage,
                    status: StageStatus::Success,
                });
                return Ok((value, retries));
            }
            Err(error) => error,
        };

        if retries >= policy.max_retries || !error.is_retryable() {
            emit!(StageCompleted {
                stage,
                status: StageStatus::Failed,
            });
            return Err(error);
        }

        retries += 1;
        warn!(
            "Stage {stage} failed (attempt {} of {}), retrying in {:?}: {error}",
            retries,
            policy.max_retries + 1,
            policy.delay
        );
        emit!(StageRetried { stage });

        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                warn!("Shutdown requested while waiting to retry stage {stage}");
                emit!(StageCompleted {
                    stage,
                    status: StageStatus::Failed,
                });
                return Err(error);
            }
            _ = tokio::time::sleep(policy.delay) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct FlakyError {
        retryable: bool,
    }

    impl fmt::Display for FlakyError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "flaky")
        }
    }

    impl Retryable for FlakyError {
        fn is_retryable(&self) -> bool {
            self.retryable
        }
    }

    fn policy(max_retries: usize) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            delay: Duration::from_millis(0),
        }
    }

    #[tokio::test]
    async fn test_success_needs_no_retry() {
        let shutdown = CancellationToken::new();
        let (value, retries) = run_stage("stage", &policy(1), &shutdown, || async {
            Ok::<_, FlakyError>(42)
        })
        .await
        .unwrap();

        assert_eq!(value, 42);
        assert_eq!(retries, 0);
    }

    #[tokio::test]
    async fn test_retryable_error_is_retried_within_bound() {
        let shutdown = CancellationToken::new();
        let attempts = AtomicUsize::new(0);

        let (value, retries) = run_stage("stage", &policy(2), &shutdown, || {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 2 {
                    Err(FlakyError { retryable: true })
                } else {
                    Ok(attempt)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(value, 2);
        assert_eq!(retries, 2);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_bound_is_enforced() {
        let shutdown = CancellationToken::new();
        let attempts = AtomicUsize::new(0);

        let result: Result<((), usize), FlakyError> =
            run_stage("stage", &policy(1), &shutdown, || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(FlakyError { retryable: true }) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_non_retryable_error_fails_immediately() {
        let shutdown = CancellationToken::new();
        let attempts = AtomicUsize::new(0);

        let result: Result<((), usize), FlakyError> =
            run_stage("stage", &policy(5), &shutdown, || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(FlakyError { retryable: false }) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_shutdown_stops_retrying() {
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        let attempts = AtomicUsize::new(0);

        let result: Result<((), usize), FlakyError> = run_stage(
            "stage",
            &RetryPolicy {
                max_retries: 5,
                delay: Duration::from_secs(3600),
            },
            &shutdown,
            || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(FlakyError { retryable: true }) }
            },
        )
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
