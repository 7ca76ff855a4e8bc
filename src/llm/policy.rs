//! Timeout and bounded retry around a backend call.

use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use super::LlmBackend;
use crate::config::LlmSettings;

/// Every attempt failed or timed out.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("text generation failed after {attempts} attempt(s): {last_error}")]
pub struct UpstreamError {
    pub attempts: u32,
    pub last_error: String,
}

/// How a generation call is made: at most `max_attempts` tries, each bounded
/// by `timeout`, with `retry_backoff` between tries. Only errors and timeouts
/// are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationPolicy {
    pub timeout: Duration,
    pub max_attempts: u32,
    pub retry_backoff: Duration,
}

impl Default for GenerationPolicy {
    fn default() -> Self {
        Self::from(&LlmSettings::default())
    }
}

impl From<&LlmSettings> for GenerationPolicy {
    fn from(settings: &LlmSettings) -> Self {
        Self {
            timeout: settings.timeout(),
            max_attempts: settings.max_attempts.max(1),
            retry_backoff: settings.retry_backoff(),
        }
    }
}

impl GenerationPolicy {
    pub async fn generate(&self, backend: &dyn LlmBackend, prompt: &str) -> Result<String, UpstreamError> {
        let attempts = self.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match tokio::time::timeout(self.timeout, backend.generate(prompt)).await {
                Ok(Ok(text)) => {
                    info!(backend = backend.backend_name(), attempt, chars = text.chars().count(), "text generated");
                    return Ok(text);
                }
                Ok(Err(e)) => last_error = format!("{e:#}"),
                Err(_) => last_error = format!("timed out after {:?}", self.timeout),
            }
            warn!(
                backend = backend.backend_name(),
                attempt,
                max_attempts = attempts,
                error = %last_error,
                "text generation attempt failed"
            );
            if attempt < attempts {
                tokio::time::sleep(self.retry_backoff).await;
            }
        }

        Err(UpstreamError {
            attempts,
            last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails (or stalls) for the first `failures` calls, then answers.
    struct Flaky {
        calls: AtomicU32,
        failures: u32,
        stall: bool,
    }

    impl Flaky {
        fn new(failures: u32, stall: bool) -> Self {
            Self {
                calls: AtomicU32::new(0),
                failures,
                stall,
            }
        }
    }

    #[async_trait]
    impl LlmBackend for Flaky {
        async fn generate(&self, _prompt: &str) -> anyhow::Result<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                if self.stall {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
                anyhow::bail!("boom {n}");
            }
            Ok("answer".to_string())
        }

        fn backend_name(&self) -> &'static str {
            "flaky"
        }
    }

    fn policy(max_attempts: u32) -> GenerationPolicy {
        GenerationPolicy {
            timeout: Duration::from_millis(50),
            max_attempts,
            retry_backoff: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_single_attempt_by_default() {
        assert_eq!(GenerationPolicy::default().max_attempts, 1);
        assert_eq!(GenerationPolicy::default().timeout, Duration::from_secs(30));

        let backend = Flaky::new(1, false);
        let err = policy(1).generate(&backend, "p").await.unwrap_err();
        assert_eq!(err.attempts, 1);
        assert_eq!(err.last_error, "boom 0");
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let backend = Flaky::new(2, false);
        let text = policy(3).generate(&backend, "p").await.unwrap();
        assert_eq!(text, "answer");
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_timeouts_are_retried_then_surface() {
        let backend = Flaky::new(10, true);
        let err = policy(2).generate(&backend, "p").await.unwrap_err();
        assert_eq!(err.attempts, 2);
        assert!(err.last_error.contains("timed out"));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_success_is_not_retried() {
        let backend = Flaky::new(0, false);
        policy(5).generate(&backend, "p").await.unwrap();
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_zero_attempts_setting_clamped() {
        let settings = LlmSettings {
            max_attempts: 0,
            ..LlmSettings::default()
        };
        assert_eq!(GenerationPolicy::from(&settings).max_attempts, 1);
    }
}
