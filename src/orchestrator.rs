use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use futures::StreamExt;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::circuit_breaker::CircuitBreaker;
use crate::llm::LlmClient;
use crate::processor::BatchResponseProcessor;
use crate::prompt::build_batch_prompt;
use crate::rate_limit::ApiRateLimiter;
use crate::retry::{classify_error, RetryPolicy};
use crate::streaming::StreamingJsonParser;
use crate::types::{
    ArticleInput, Batch, BatchFailure, BatchMetrics, BatchRequest, BatchResult, ErrorKind,
    Result, SummarizedPost, SummarizerConfig, SummarizerError, SummaryResultWithId,
    TruncationInfo,
};

/// Bound on in-flight parsed results between the network read loop and the
/// reconciling consumer, so a stalled consumer backpressures the producer.
const RESULT_CHANNEL_CAPACITY: usize = 32;

/// Sum-typed element of the in-flight result stream: a completed result
/// object, or a stream-level interruption signal carried out-of-band.
#[derive(Debug)]
enum StreamEvent {
    Item(SummaryResultWithId),
    Interrupted { kind: ErrorKind, message: String },
}

struct AttemptOutcome {
    outcomes: Vec<SummaryResultWithId>,
    truncation: Option<TruncationInfo>,
}

struct AttemptFailure {
    kind: ErrorKind,
    message: String,
    truncation: Option<TruncationInfo>,
}

/// Owns the spawned stream-reader task for one attempt. Dropping the guard
/// before `join` aborts the reader, so a cancelled attempt (deadline, caller
/// drop) releases the upstream stream instead of draining it detached.
struct ProducerGuard {
    handle: Option<JoinHandle<String>>,
}

impl ProducerGuard {
    fn new(handle: JoinHandle<String>) -> Self {
        Self {
            handle: Some(handle),
        }
    }

    async fn join(mut self) -> Result<String> {
        match self.handle.take() {
            Some(handle) => handle
                .await
                .map_err(|e| SummarizerError::General(format!("stream reader panicked: {}", e))),
            None => Err(SummarizerError::General(
                "stream reader already joined".to_string(),
            )),
        }
    }
}

impl Drop for ProducerGuard {
    fn drop(&mut self) {
        if let Some(handle) = &self.handle {
            handle.abort();
        }
    }
}

/// Top-level coordinator for asynchronous batch summarization: bounded
/// concurrency, circuit-breaker gating, per-batch retry loop with classified
/// backoff, and metrics assembly.
pub struct BatchSummarizer {
    client: Arc<dyn LlmClient>,
    config: SummarizerConfig,
    processor: BatchResponseProcessor,
    retry_policy: RetryPolicy,
    breaker: Arc<CircuitBreaker>,
    rate_limiter: Arc<ApiRateLimiter>,
    semaphore: Arc<Semaphore>,
}

impl BatchSummarizer {
    pub fn new(client: Arc<dyn LlmClient>, config: SummarizerConfig) -> Self {
        let breaker = Arc::new(CircuitBreaker::new(config.circuit_breaker.clone()));
        Self::with_circuit_breaker(client, config, breaker)
    }

    /// Build with an externally shared circuit breaker, e.g. when several
    /// pipelines gate on the same upstream service.
    pub fn with_circuit_breaker(
        client: Arc<dyn LlmClient>,
        config: SummarizerConfig,
        breaker: Arc<CircuitBreaker>,
    ) -> Self {
        Self {
            processor: BatchResponseProcessor::new(&config.valid_categories),
            retry_policy: RetryPolicy::new(config.retry.clone()),
            rate_limiter: Arc::new(ApiRateLimiter::new(config.rate_limit.clone())),
            semaphore: Arc::new(Semaphore::new(config.concurrency_limit.max(1))),
            breaker,
            client,
            config,
        }
    }

    pub fn circuit_breaker(&self) -> Arc<CircuitBreaker> {
        Arc::clone(&self.breaker)
    }

    /// Process every batch with default priority. The returned list always
    /// has exactly one `BatchResult` per input batch, in dispatch order.
    pub async fn process_batches(&self, batches: Vec<Batch>) -> Vec<BatchResult> {
        let prioritized = batches.into_iter().map(|batch| (batch, 0)).collect();
        self.process_batches_with_priorities(prioritized).await
    }

    /// Process batches with explicit priorities; higher dispatches first.
    pub async fn process_batches_with_priorities(
        &self,
        batches: Vec<(Batch, i32)>,
    ) -> Vec<BatchResult> {
        let mut requests: Vec<BatchRequest> = batches
            .into_iter()
            .map(|(batch, priority)| BatchRequest {
                id: Uuid::new_v4().to_string(),
                posts: batch.items,
                estimated_tokens: batch.estimated_tokens,
                priority,
            })
            .collect();
        requests.sort_by(|a, b| b.priority.cmp(&a.priority));

        info!(
            "Dispatching {} batch requests (concurrency limit {})",
            requests.len(),
            self.config.concurrency_limit
        );

        let tasks = requests
            .into_iter()
            .map(|request| self.process_single(request));
        join_all(tasks).await
    }

    async fn process_single(&self, request: BatchRequest) -> BatchResult {
        let started = Instant::now();
        let mut api_calls = 0u32;

        let attempt_result = self.run_attempts(&request, &mut api_calls).await;

        // Duration is logged whatever happened to the batch.
        let duration_ms = started.elapsed().as_millis() as u64;
        info!(
            "Batch {} finished in {}ms ({} posts, {} api calls)",
            request.id,
            duration_ms,
            request.posts.len(),
            api_calls
        );

        match attempt_result {
            Ok(outcome) => self.assemble(request, outcome, api_calls, duration_ms),
            Err(failure) => self.fail_all(request, failure, api_calls, duration_ms),
        }
    }

    /// Per-batch attempt loop: breaker gate, then a concurrency slot and a
    /// rate-limit slot, then the timed call. The slot is scoped to one
    /// attempt and released before any backoff sleep, so a batch waiting out
    /// a delay never starves queued batches.
    async fn run_attempts(
        &self,
        request: &BatchRequest,
        api_calls: &mut u32,
    ) -> std::result::Result<AttemptOutcome, AttemptFailure> {
        let mut attempt = 0u32;
        let mut last_kind;
        let mut last_message;

        loop {
            if !self.breaker.try_acquire() {
                warn!("Circuit open; failing batch {} fast", request.id);
                return Err(AttemptFailure {
                    kind: ErrorKind::ApiError,
                    message: "LLM service unavailable (circuit breaker open)".to_string(),
                    truncation: None,
                });
            }

            let attempt_result = {
                let _permit = match self.semaphore.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return Err(AttemptFailure {
                            kind: ErrorKind::ApiError,
                            message: "worker pool closed".to_string(),
                            truncation: None,
                        })
                    }
                };

                self.rate_limiter.acquire().await;
                *api_calls += 1;

                let deadline = Duration::from_millis(self.config.timeout_ms);
                timeout(deadline, self.execute_attempt(request)).await
            };

            match attempt_result {
                Err(_elapsed) => {
                    self.breaker.record_failure();
                    last_kind = ErrorKind::Timeout;
                    last_message =
                        format!("Batch attempt timed out after {}ms", self.config.timeout_ms);
                }
                Ok(Ok(outcome)) => {
                    self.breaker.record_success();
                    return Ok(outcome);
                }
                Ok(Err(SummarizerError::TruncatedResponse {
                    expected,
                    recovered,
                })) => {
                    // The service answered; the response shape is the
                    // problem. Not retried.
                    self.breaker.record_success();
                    return Err(AttemptFailure {
                        kind: ErrorKind::LengthLimit,
                        message: format!(
                            "Response truncated: recovered {} of {} results",
                            recovered, expected
                        ),
                        truncation: Some(TruncationInfo {
                            expected,
                            recovered,
                        }),
                    });
                }
                Ok(Err(error)) => {
                    self.breaker.record_failure();
                    last_kind = classify_error(&error);
                    last_message = error.to_string();
                }
            }

            if self.retry_policy.should_retry(last_kind, attempt) {
                let delay = self.retry_policy.backoff_delay(last_kind, attempt);
                debug!(
                    "Retrying batch {} after {:?} ({})",
                    request.id, delay, last_kind
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }

            return Err(AttemptFailure {
                kind: last_kind,
                message: last_message,
                truncation: None,
            });
        }
    }

    /// One streaming call: producer task reads chunks through the
    /// incremental parser and pushes completed objects onto a bounded
    /// channel; this side consumes them and reconciles at stream end.
    async fn execute_attempt(&self, request: &BatchRequest) -> Result<AttemptOutcome> {
        let llm_request = build_batch_prompt(
            &request.posts,
            &self.config.valid_categories,
            &self.config.model,
        );
        let stream = self.client.stream_generate(&llm_request).await?;

        let (tx, mut rx) = mpsc::channel::<StreamEvent>(RESULT_CHANNEL_CAPACITY);
        let producer = ProducerGuard::new(tokio::spawn(async move {
            let mut stream = stream;
            let mut parser = StreamingJsonParser::new();
            let mut raw = String::new();

            while let Some(item) = stream.next().await {
                match item {
                    Ok(chunk) => {
                        raw.push_str(&chunk);
                        for result in parser.process(&chunk) {
                            if tx.send(StreamEvent::Item(result)).await.is_err() {
                                return raw;
                            }
                        }
                    }
                    Err(error) => {
                        let kind = classify_error(&error);
                        let _ = tx
                            .send(StreamEvent::Interrupted {
                                kind,
                                message: error.to_string(),
                            })
                            .await;
                        break;
                    }
                }
            }
            raw
        }));

        let mut decoded: Vec<SummaryResultWithId> = Vec::new();
        let mut interruption: Option<(ErrorKind, String)> = None;
        while let Some(event) = rx.recv().await {
            match event {
                StreamEvent::Item(result) => decoded.push(result),
                StreamEvent::Interrupted { kind, message } => {
                    interruption = Some((kind, message));
                }
            }
        }

        let raw = producer.join().await?;

        match interruption {
            Some((kind, message)) => match kind {
                ErrorKind::SafetyBlocked | ErrorKind::LengthLimit | ErrorKind::ContentError => {
                    warn!(
                        "Stream interrupted ({}) for batch {}: {}; attempting recovery",
                        kind, request.id, message
                    );
                    let combined =
                        self.processor
                            .recover_truncated(&raw, &request.posts, decoded)?;
                    let recovered = combined.len();
                    let outcomes = self.processor.process(&request.posts, combined);
                    Ok(AttemptOutcome {
                        outcomes,
                        truncation: Some(TruncationInfo {
                            expected: request.posts.len(),
                            recovered,
                        }),
                    })
                }
                _ => Err(SummarizerError::Llm { kind, message }),
            },
            None => {
                let outcomes = self.processor.process(&request.posts, decoded);
                Ok(AttemptOutcome {
                    outcomes,
                    truncation: None,
                })
            }
        }
    }

    /// Partition reconciled outcomes into successes and failures. Outcomes
    /// carry one entry per submitted post, in input order, plus any
    /// unknown-id failure records the processor appended.
    fn assemble(
        &self,
        request: BatchRequest,
        outcome: AttemptOutcome,
        api_calls: u32,
        duration_ms: u64,
    ) -> BatchResult {
        let posts_by_id: HashMap<&str, &ArticleInput> = request
            .posts
            .iter()
            .map(|post| (post.id.as_str(), post))
            .collect();

        let mut successes = Vec::new();
        let mut failures = Vec::new();

        for result in outcome.outcomes {
            match posts_by_id.get(result.id.as_str()).copied() {
                Some(post) if result.success => {
                    successes.push(SummarizedPost {
                        id: result.id,
                        title: post.title.clone(),
                        summary: result.summary.unwrap_or_default(),
                        preview: result.preview.unwrap_or_default(),
                        categories: result.categories.unwrap_or_default(),
                    });
                }
                Some(post) => failures.push(self.failure_for(post, result)),
                None => {
                    // No submitted article matches; keep the record on a stub.
                    let stub = ArticleInput {
                        id: result.id.clone(),
                        title: String::new(),
                        content: String::new(),
                    };
                    failures.push(self.failure_for(&stub, result));
                }
            }
        }

        let metrics = BatchMetrics {
            total_items: request.posts.len(),
            success_count: successes.len(),
            failure_count: failures.len(),
            api_call_count: api_calls,
            tokens_used: request.estimated_tokens,
            duration_ms,
        };

        BatchResult {
            request_id: request.id,
            successes,
            failures,
            metrics,
            truncation: outcome.truncation,
        }
    }

    /// Resolve the whole batch as failed with the last known error.
    fn fail_all(
        &self,
        request: BatchRequest,
        failure: AttemptFailure,
        api_calls: u32,
        duration_ms: u64,
    ) -> BatchResult {
        let retryable = self.retry_policy.is_retryable(failure.kind);
        let failures: Vec<BatchFailure> = request
            .posts
            .iter()
            .map(|post| BatchFailure {
                post: post.clone(),
                reason: failure.message.clone(),
                retryable,
                error_type: failure.kind,
            })
            .collect();

        let metrics = BatchMetrics {
            total_items: request.posts.len(),
            success_count: 0,
            failure_count: failures.len(),
            api_call_count: api_calls,
            tokens_used: request.estimated_tokens,
            duration_ms,
        };

        BatchResult {
            request_id: request.id,
            successes: Vec::new(),
            failures,
            metrics,
            truncation: failure.truncation,
        }
    }

    fn failure_for(&self, post: &ArticleInput, result: SummaryResultWithId) -> BatchFailure {
        let kind = result.error_type.unwrap_or(ErrorKind::ApiError);
        BatchFailure {
            post: post.clone(),
            reason: result
                .error
                .unwrap_or_else(|| "unknown failure".to_string()),
            retryable: self.retry_policy.is_retryable(kind),
            error_type: kind,
        }
    }
}
