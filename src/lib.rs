pub mod batch;
pub mod circuit_breaker;
pub mod extractor;
pub mod feed;
pub mod fetcher;
pub mod llm;
pub mod orchestrator;
pub mod processor;
pub mod prompt;
pub mod rate_limit;
pub mod repository;
pub mod retry;
pub mod streaming;
pub mod types;

pub use batch::BatchBuilder;
pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use extractor::extract_structured_text;
pub use feed::{FeedParser, FeedStrategy, HtmlSourceRules};
pub use fetcher::{Fetcher, HttpFetch, ReqwestFetch};
pub use llm::{ChunkStream, LlmClient, MockLlmClient};
pub use orchestrator::BatchSummarizer;
pub use processor::BatchResponseProcessor;
pub use prompt::{build_batch_prompt, LlmRequest};
pub use rate_limit::ApiRateLimiter;
pub use repository::PostRepository;
pub use retry::RetryPolicy;
pub use streaming::StreamingJsonParser;
pub use types::*;
