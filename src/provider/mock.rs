//! Scripted provider for tests and offline runs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::error::{ProviderError, ProviderResult};
use super::{ChunkStream, GenerateChunk, Generation, GenerationConfig, TextProvider, TokenUsage};

/// What a matched prompt should produce.
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Stream these chunks, optionally pausing between them.
    Stream {
        chunks: Vec<String>,
        chunk_delay: Duration,
    },
    /// Fail the stream before any chunk.
    Error { message: String },
    /// Stream some chunks, then fail.
    ErrorAfter {
        chunks: Vec<String>,
        message: String,
    },
}

#[derive(Debug, Clone)]
struct MockRule {
    matcher: String,
    behavior: MockBehavior,
}

/// Prompt-substring-scripted [`TextProvider`]. The first matching rule
/// wins; unmatched prompts stream one generic chunk.
#[derive(Debug, Default)]
pub struct MockProvider {
    model: String,
    rules: Mutex<Vec<MockRule>>,
    prompt_log: Mutex<Vec<String>>,
    calls: AtomicU64,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            model: "mock-model".to_string(),
            ..Default::default()
        }
    }

    /// Registers a behavior for prompts containing `matcher`.
    pub fn script(self, matcher: impl Into<String>, behavior: MockBehavior) -> Self {
        self.rules.lock().push(MockRule {
            matcher: matcher.into(),
            behavior,
        });
        self
    }

    /// Shorthand: stream `chunks` for prompts containing `matcher`.
    pub fn script_chunks(self, matcher: impl Into<String>, chunks: &[&str]) -> Self {
        self.script(
            matcher,
            MockBehavior::Stream {
                chunks: chunks.iter().map(|c| c.to_string()).collect(),
                chunk_delay: Duration::ZERO,
            },
        )
    }

    /// Total number of `generate`/`generate_stream` calls served.
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Every prompt seen, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompt_log.lock().clone()
    }

    fn record(&self, prompt: &str) -> MockBehavior {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.prompt_log.lock().push(prompt.to_string());

        self.rules
            .lock()
            .iter()
            .find(|rule| prompt.contains(&rule.matcher))
            .map(|rule| rule.behavior.clone())
            .unwrap_or(MockBehavior::Stream {
                chunks: vec!["{}".to_string()],
                chunk_delay: Duration::ZERO,
            })
    }

    fn usage_for(prompt: &str, text: &str) -> super::UsageMetadata {
        // Rough 4-chars-per-token accounting, deterministic for assertions.
        super::UsageMetadata {
            prompt_token_count: (prompt.len() / 4) as i64,
            candidates_token_count: (text.len() / 4) as i64,
            total_token_count: ((prompt.len() + text.len()) / 4) as i64,
        }
    }
}

#[async_trait]
impl TextProvider for MockProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str, _config: &GenerationConfig) -> ProviderResult<Generation> {
        match self.record(prompt) {
            MockBehavior::Stream { chunks, .. } => {
                let text = chunks.concat();
                let usage = TokenUsage::from_metadata(&Self::usage_for(prompt, &text));
                Ok(Generation { text, usage })
            }
            MockBehavior::Error { message } | MockBehavior::ErrorAfter { message, .. } => {
                Err(ProviderError::Http {
                    status: 500,
                    message,
                })
            }
        }
    }

    async fn generate_stream(
        &self,
        prompt: &str,
        _config: &GenerationConfig,
    ) -> ProviderResult<ChunkStream> {
        let behavior = self.record(prompt);
        let prompt = prompt.to_string();

        match behavior {
            MockBehavior::Error { message } => Err(ProviderError::Http {
                status: 500,
                message,
            }),
            MockBehavior::Stream {
                chunks,
                chunk_delay,
            } => {
                let full_text = chunks.concat();
                let stream = async_stream::stream! {
                    let last = chunks.len().saturating_sub(1);
                    for (i, text) in chunks.into_iter().enumerate() {
                        if !chunk_delay.is_zero() {
                            tokio::time::sleep(chunk_delay).await;
                        }
                        let mut chunk = GenerateChunk::from_text(text);
                        if i == last {
                            chunk.usage_metadata = Some(Self::usage_for(&prompt, &full_text));
                        }
                        yield Ok(chunk);
                    }
                };
                Ok(Box::pin(stream))
            }
            MockBehavior::ErrorAfter { chunks, message } => {
                let stream = async_stream::stream! {
                    for text in chunks {
                        yield Ok(GenerateChunk::from_text(text));
                    }
                    yield Err(ProviderError::Stream(message));
                };
                Ok(Box::pin(stream))
            }
        }
    }
}
