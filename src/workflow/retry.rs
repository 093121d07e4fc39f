use std::future::Future;

use tracing::warn;

use crate::core::config::RetryPolicy;
use crate::core::models::StepResult;

/// How one attempt of a workflow step failed.
#[derive(Debug)]
pub enum StepError {
    /// Worth another attempt while budget remains.
    Transient(String),
    /// Retrying cannot change the outcome; fail the step now.
    Definitive {
        reason: String,
        alert_message: Option<String>,
    },
}

impl StepError {
    pub fn transient(reason: impl Into<String>) -> Self {
        Self::Transient(reason.into())
    }

    pub fn definitive(reason: impl Into<String>) -> Self {
        Self::Definitive {
            reason: reason.into(),
            alert_message: None,
        }
    }

    pub fn definitive_with_alert(reason: impl Into<String>, alert: impl Into<String>) -> Self {
        Self::Definitive {
            reason: reason.into(),
            alert_message: Some(alert.into()),
        }
    }
}

/// Runs one step under its retry policy. Transient failures are
/// retried after the policy delay until the attempt budget runs out;
/// a definitive failure ends the step immediately.
pub async fn run_step<F, Fut>(step: &str, policy: &RetryPolicy, mut attempt: F) -> StepResult
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<StepResult, StepError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut last_reason = String::new();

    for attempt_number in 1..=max_attempts {
        match attempt().await {
            Ok(result) => return result,
            Err(StepError::Transient(reason)) => {
                warn!(
                    "[{}] attempt {}/{} failed: {}",
                    step, attempt_number, max_attempts, reason
                );
                last_reason = reason;
                if attempt_number < max_attempts {
                    tokio::time::sleep(policy.delay).await;
                }
            }
            Err(StepError::Definitive {
                reason,
                alert_message,
            }) => {
                warn!("[{}] failed definitively: {}", step, reason);
                let mut result = StepResult::failed(step, reason);
                result.alert_message = alert_message;
                return result;
            }
        }
    }

    StepResult::failed(step, last_reason)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_in = Arc::clone(&calls);

        let result = run_step("demo", &fast_policy(3), move || {
            let calls = Arc::clone(&calls_in);
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(StepError::transient("not ready"))
                } else {
                    Ok(StepResult::succeeded("demo"))
                }
            }
        })
        .await;

        assert!(result.success);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_definitive_failure_skips_remaining_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_in = Arc::clone(&calls);

        let result = run_step("demo", &fast_policy(5), move || {
            let calls = Arc::clone(&calls_in);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(StepError::definitive_with_alert("rejected", "Invalid parameter"))
            }
        })
        .await;

        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("rejected"));
        assert_eq!(result.alert_message.as_deref(), Some("Invalid parameter"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhaustion_reports_last_transient_reason() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_in = Arc::clone(&calls);

        let result = run_step("demo", &fast_policy(2), move || {
            let calls = Arc::clone(&calls_in);
            async move {
                let attempt = calls.fetch_add(1, Ordering::SeqCst) + 1;
                Err(StepError::transient(format!("attempt {} flaked", attempt)))
            }
        })
        .await;

        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("attempt 2 flaked"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
