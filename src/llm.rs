use std::pin::Pin;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream::{self, Stream};
use tokio::time::Duration;

use crate::prompt::LlmRequest;
use crate::types::{Result, SummarizerError};

/// A live token stream from the LLM. Items are text chunks; an `Err` item is
/// a stream-level interruption (safety block, length limit, transport error)
/// carrying its classification.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// The injected LLM capability: submit a prompt + schema + model identifier,
/// receive a stream of text chunks. Transport and auth live behind this trait.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn stream_generate(&self, request: &LlmRequest) -> Result<ChunkStream>;
}

/// Scripted LLM client for tests and local development.
///
/// Each call pops the next scripted response; a response is a sequence of
/// chunk outcomes replayed in order with an optional delay between chunks.
pub struct MockLlmClient {
    responses: Mutex<Vec<Vec<Result<String>>>>,
    chunk_delay: Duration,
    call_count: Mutex<u32>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(Vec::new()),
            chunk_delay: Duration::from_millis(0),
            call_count: Mutex::new(0),
        }
    }

    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    /// Queue a response made of plain text chunks.
    pub fn push_response(self, chunks: Vec<&str>) -> Self {
        self.responses
            .lock()
            .expect("mock responses lock")
            .push(chunks.into_iter().map(|c| Ok(c.to_string())).collect());
        self
    }

    /// Queue a response that fails partway through.
    pub fn push_response_with_error(self, chunks: Vec<&str>, error: SummarizerError) -> Self {
        let mut scripted: Vec<Result<String>> =
            chunks.into_iter().map(|c| Ok(c.to_string())).collect();
        scripted.push(Err(error));
        self.responses
            .lock()
            .expect("mock responses lock")
            .push(scripted);
        self
    }

    /// Number of times `stream_generate` was invoked.
    pub fn calls(&self) -> u32 {
        *self.call_count.lock().expect("mock call count lock")
    }
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn stream_generate(&self, _request: &LlmRequest) -> Result<ChunkStream> {
        *self.call_count.lock().expect("mock call count lock") += 1;

        let scripted = {
            let mut responses = self.responses.lock().expect("mock responses lock");
            if responses.is_empty() {
                return Err(SummarizerError::General(
                    "mock has no scripted responses left".to_string(),
                ));
            }
            responses.remove(0)
        };

        let delay = self.chunk_delay;
        let stream = stream::unfold(scripted.into_iter(), move |mut iter| async move {
            let item = iter.next()?;
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            Some((item, iter))
        });

        Ok(Box::pin(stream))
    }
}
