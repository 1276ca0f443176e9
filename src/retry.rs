use tokio::time::Duration;

use crate::types::{ErrorKind, RetryConfig, SummarizerError};

/// Map an error message onto the error taxonomy by keyword.
pub fn classify_message(message: &str) -> ErrorKind {
    let lower = message.to_lowercase();
    if lower.contains("rate limit")
        || lower.contains("429")
        || lower.contains("503")
        || lower.contains("overloaded")
    {
        ErrorKind::RateLimit
    } else if lower.contains("timeout") {
        ErrorKind::Timeout
    } else {
        ErrorKind::ApiError
    }
}

/// Classify a pipeline error, trusting an explicit kind when one is carried.
pub fn classify_error(error: &SummarizerError) -> ErrorKind {
    match error {
        SummarizerError::Llm { kind, .. } => *kind,
        SummarizerError::Timeout { .. } => ErrorKind::Timeout,
        SummarizerError::CircuitOpen => ErrorKind::ApiError,
        SummarizerError::TruncatedResponse { .. } => ErrorKind::LengthLimit,
        other => classify_message(&other.to_string()),
    }
}

/// Decides whether a failed batch attempt is retried and how long to back off.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    /// Kinds the orchestrator retries automatically within a run.
    pub fn should_retry(&self, kind: ErrorKind, attempt: u32) -> bool {
        if attempt + 1 >= self.config.max_attempts {
            return false;
        }
        matches!(kind, ErrorKind::Timeout | ErrorKind::RateLimit)
    }

    /// Kinds worth re-enqueueing by the caller, reported on `BatchFailure`.
    pub fn is_retryable(&self, kind: ErrorKind) -> bool {
        matches!(
            kind,
            ErrorKind::Timeout | ErrorKind::RateLimit | ErrorKind::ValidationError
        )
    }

    /// Linear backoff scaled by attempt number; rate limits use their own,
    /// larger base delay.
    pub fn backoff_delay(&self, kind: ErrorKind, attempt: u32) -> Duration {
        let base = match kind {
            ErrorKind::RateLimit => self.config.rate_limit_base_delay_ms,
            _ => self.config.base_delay_ms,
        };
        Duration::from_millis(base * (attempt as u64 + 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_classification() {
        assert_eq!(classify_message("Rate limit exceeded"), ErrorKind::RateLimit);
        assert_eq!(classify_message("HTTP 429 from upstream"), ErrorKind::RateLimit);
        assert_eq!(classify_message("got 503 service unavailable"), ErrorKind::RateLimit);
        assert_eq!(classify_message("model overloaded, try later"), ErrorKind::RateLimit);
        assert_eq!(classify_message("request timeout after 30s"), ErrorKind::Timeout);
        assert_eq!(classify_message("boom"), ErrorKind::ApiError);
    }

    #[test]
    fn retries_timeout_and_rate_limit_only() {
        let policy = RetryPolicy::new(RetryConfig {
            max_attempts: 3,
            ..Default::default()
        });

        assert!(policy.should_retry(ErrorKind::Timeout, 0));
        assert!(policy.should_retry(ErrorKind::RateLimit, 1));
        assert!(!policy.should_retry(ErrorKind::ApiError, 0));
        assert!(!policy.should_retry(ErrorKind::SafetyBlocked, 0));
        // Attempt budget exhausted.
        assert!(!policy.should_retry(ErrorKind::Timeout, 2));
    }

    #[test]
    fn backoff_scales_linearly_with_attempts() {
        let policy = RetryPolicy::new(RetryConfig {
            max_attempts: 5,
            base_delay_ms: 100,
            rate_limit_base_delay_ms: 1_000,
        });

        assert_eq!(policy.backoff_delay(ErrorKind::Timeout, 0), Duration::from_millis(100));
        assert_eq!(policy.backoff_delay(ErrorKind::Timeout, 2), Duration::from_millis(300));
        assert_eq!(
            policy.backoff_delay(ErrorKind::RateLimit, 1),
            Duration::from_millis(2_000)
        );
    }

    #[test]
    fn validation_errors_flagged_retryable_for_caller() {
        let policy = RetryPolicy::new(RetryConfig::default());
        assert!(policy.is_retryable(ErrorKind::ValidationError));
        assert!(!policy.is_retryable(ErrorKind::ApiError));
        assert!(!policy.is_retryable(ErrorKind::LengthLimit));
    }
}
