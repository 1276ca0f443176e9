use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Immutable unit of work submitted to the LLM.
///
/// `id` must be stable and unique within a batch; reconciliation keys on it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArticleInput {
    pub id: String,
    pub title: String,
    pub content: String,
}

/// A feed entry after extraction and normalization, ready for persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedPost {
    pub title: String,
    pub url: String,
    pub content: String,
    pub published_at: Option<DateTime<Utc>>,
    pub thumbnail: Option<String>,
}

/// A token-budget-bounded group of articles. Membership is immutable once built.
#[derive(Debug, Clone)]
pub struct Batch {
    pub items: Vec<ArticleInput>,
    pub estimated_tokens: usize,
}

/// A batch at submission time. Created by the orchestrator, consumed exactly once.
#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub id: String,
    pub posts: Vec<ArticleInput>,
    pub estimated_tokens: usize,
    pub priority: i32,
}

/// Error taxonomy for everything that can go wrong between us and the LLM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    Timeout,
    RateLimit,
    ApiError,
    ValidationError,
    SafetyBlocked,
    LengthLimit,
    ContentError,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::RateLimit => "RATE_LIMIT",
            ErrorKind::ApiError => "API_ERROR",
            ErrorKind::ValidationError => "VALIDATION_ERROR",
            ErrorKind::SafetyBlocked => "SAFETY_BLOCKED",
            ErrorKind::LengthLimit => "LENGTH_LIMIT",
            ErrorKind::ContentError => "CONTENT_ERROR",
        };
        write!(f, "{}", s)
    }
}

/// One decoded (or synthesized) outcome for a single article id. After
/// reconciliation every submitted `ArticleInput.id` has exactly one of these;
/// unknown response ids are appended as "Unknown ID" failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryResultWithId {
    pub id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<ErrorKind>,
}

impl SummaryResultWithId {
    /// Synthetic failure carrying a reason and classification.
    pub fn failure(id: impl Into<String>, reason: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            id: id.into(),
            success: false,
            summary: None,
            preview: None,
            categories: None,
            error: Some(reason.into()),
            error_type: Some(kind),
        }
    }
}

/// A post that could not be summarized, with enough context to re-enqueue it.
#[derive(Debug, Clone)]
pub struct BatchFailure {
    pub post: ArticleInput,
    pub reason: String,
    pub retryable: bool,
    pub error_type: ErrorKind,
}

/// A successfully summarized post.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizedPost {
    pub id: String,
    pub title: String,
    pub summary: String,
    pub preview: String,
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchMetrics {
    pub total_items: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub api_call_count: u32,
    pub tokens_used: usize,
    pub duration_ms: u64,
}

/// Present on a `BatchResult` when the response stream was cut off and only
/// part of the batch could be recovered. The caller decides whether to split
/// and resubmit; that policy is outside this crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TruncationInfo {
    pub expected: usize,
    pub recovered: usize,
}

/// Outcome of one `BatchRequest`. Every submitted post lands in exactly one
/// of `successes`/`failures`; unknown response ids add extra failure records.
#[derive(Debug, Clone)]
pub struct BatchResult {
    pub request_id: String,
    pub successes: Vec<SummarizedPost>,
    pub failures: Vec<BatchFailure>,
    pub metrics: BatchMetrics,
    pub truncation: Option<TruncationInfo>,
}

/// Everything the batch builder needs to price an article and close a batch.
#[derive(Debug, Clone)]
pub struct BatchBuilderConfig {
    pub max_tokens_per_request: usize,
    pub max_batch_size: usize,
    pub base_prompt_tokens: usize,
    pub avg_tokens_per_summary: usize,
    pub json_overhead_tokens: usize,
    /// Fraction of the token budget usable for input, leaving headroom for output.
    pub output_safety_margin: f64,
    /// Average Latin-script characters per token.
    pub tokens_per_char: f64,
}

impl Default for BatchBuilderConfig {
    fn default() -> Self {
        Self {
            max_tokens_per_request: 28_000,
            max_batch_size: 10,
            base_prompt_tokens: 500,
            avg_tokens_per_summary: 400,
            json_overhead_tokens: 50,
            output_safety_margin: 0.8,
            tokens_per_char: 2.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub rate_limit_base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            rate_limit_base_delay_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    /// Failures only trip the breaker once at least this many calls were seen.
    pub min_call_volume: u32,
    pub cooldown: std::time::Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            min_call_volume: 5,
            cooldown: std::time::Duration::from_secs(30),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    pub fn with_cooldown(mut self, cooldown: std::time::Duration) -> Self {
        self.cooldown = cooldown;
        self
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub requests_per_minute: u32,
    pub requests_per_day: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 15,
            requests_per_day: 1_000,
        }
    }
}

/// Tuning for feed fetches: spacing, jitter, retries.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_delay_seconds: u64,
    pub max_redirects: usize,
    /// Minimum spacing between requests to the same host.
    pub min_host_interval_ms: u64,
    pub jitter_min_ms: u64,
    pub jitter_max_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "blog-summarizer/0.1".to_string(),
            timeout_seconds: 30,
            max_retries: 3,
            retry_delay_seconds: 5,
            max_redirects: 5,
            min_host_interval_ms: 1_000,
            jitter_min_ms: 200,
            jitter_max_ms: 1_200,
        }
    }
}

/// Top-level orchestrator configuration.
#[derive(Debug, Clone)]
pub struct SummarizerConfig {
    pub model: String,
    pub concurrency_limit: usize,
    pub timeout_ms: u64,
    pub valid_categories: Vec<String>,
    pub retry: RetryConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub rate_limit: RateLimitConfig,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.0-flash".to_string(),
            concurrency_limit: 3,
            timeout_ms: 120_000,
            valid_categories: vec![
                "AI".to_string(),
                "Backend".to_string(),
                "Frontend".to_string(),
                "DevOps".to_string(),
                "Mobile".to_string(),
                "Security".to_string(),
                "Data".to_string(),
                "Career".to_string(),
            ],
            retry: RetryConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SummarizerError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Feed parse error: {0}")]
    FeedParse(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("LLM error ({kind}): {message}")]
    Llm { kind: ErrorKind, message: String },

    #[error("Batch attempt timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("LLM service unavailable (circuit breaker open)")]
    CircuitOpen,

    #[error("Response truncated: recovered {recovered} of {expected} results")]
    TruncatedResponse { expected: usize, recovered: usize },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("General error: {0}")]
    General(String),
}

pub type Result<T> = std::result::Result<T, SummarizerError>;
