//! Generative backend adapter.
//!
//! The backend is a black-box streaming text generator speaking the
//! `{candidates: [{content: {parts: [{text}]}}]}` wire shape. The engine
//! only needs two operations: a synchronous [`TextProvider::generate`] and
//! a lazy [`TextProvider::generate_stream`].

pub mod error;
pub mod gemini;
#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use error::{ProviderError, ProviderResult};
pub use gemini::GeminiProvider;
#[cfg(any(test, feature = "mock"))]
pub use mock::{MockBehavior, MockProvider};

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use serde::{Deserialize, Serialize};

/// Sampling configuration for one generation call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<i32>,
}

impl GenerationConfig {
    /// Low-temperature configuration used by the classifier's first pass.
    pub fn deterministic() -> Self {
        Self {
            temperature: Some(0.1),
            ..Default::default()
        }
    }
}

/// One text part of a candidate's content.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Candidate content: an ordered list of parts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkContent {
    #[serde(default)]
    pub parts: Vec<ChunkPart>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// One generation candidate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<ChunkContent>,
}

/// Token accounting reported by the backend.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    #[serde(default)]
    pub prompt_token_count: i64,
    #[serde(default)]
    pub candidates_token_count: i64,
    #[serde(default)]
    pub total_token_count: i64,
}

/// One chunk of a (streamed) generation response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateChunk {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_metadata: Option<UsageMetadata>,
}

impl GenerateChunk {
    /// Builds a single-text chunk; mock and replay paths use this.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            candidates: vec![Candidate {
                content: Some(ChunkContent {
                    parts: vec![ChunkPart {
                        text: Some(text.into()),
                    }],
                    role: Some("model".to_string()),
                }),
            }],
            usage_metadata: None,
        }
    }

    /// Text of the first candidate's first text part, the only part the
    /// engine consumes.
    pub fn first_text(&self) -> Option<&str> {
        self.candidates
            .first()?
            .content
            .as_ref()?
            .parts
            .iter()
            .find_map(|p| p.text.as_deref())
    }
}

/// Aggregated token counts for one or more calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
}

impl TokenUsage {
    pub fn total(&self) -> i64 {
        self.prompt_tokens + self.completion_tokens
    }

    pub fn add(&mut self, other: TokenUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
    }

    pub fn from_metadata(meta: &UsageMetadata) -> Self {
        Self {
            prompt_tokens: meta.prompt_token_count,
            completion_tokens: meta.candidates_token_count,
        }
    }
}

/// Fully-collected generation result.
#[derive(Debug, Clone, Default)]
pub struct Generation {
    pub text: String,
    pub usage: TokenUsage,
}

/// Lazy sequence of response chunks; ends normally or with an error item.
pub type ChunkStream = Pin<Box<dyn Stream<Item = ProviderResult<GenerateChunk>> + Send>>;

/// The generative backend contract. Implementations are concurrency-safe
/// and shared process-wide.
#[async_trait]
pub trait TextProvider: Send + Sync {
    /// Model identifier recorded on interaction rows.
    fn model_name(&self) -> &str;

    /// Generates the full response text in one call.
    async fn generate(&self, prompt: &str, config: &GenerationConfig) -> ProviderResult<Generation>;

    /// Opens a streaming generation; chunks arrive lazily.
    async fn generate_stream(
        &self,
        prompt: &str,
        config: &GenerationConfig,
    ) -> ProviderResult<ChunkStream>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_text_takes_first_candidate_first_text_part() {
        let chunk = GenerateChunk {
            candidates: vec![
                Candidate {
                    content: Some(ChunkContent {
                        parts: vec![
                            ChunkPart { text: None },
                            ChunkPart {
                                text: Some("hello".into()),
                            },
                        ],
                        role: None,
                    }),
                },
                Candidate {
                    content: Some(ChunkContent {
                        parts: vec![ChunkPart {
                            text: Some("ignored".into()),
                        }],
                        role: None,
                    }),
                },
            ],
            usage_metadata: None,
        };

        assert_eq!(chunk.first_text(), Some("hello"));
    }

    #[test]
    fn first_text_is_none_for_empty_chunk() {
        assert_eq!(GenerateChunk::default().first_text(), None);
    }

    #[test]
    fn chunk_decodes_provider_wire_shape() {
        let json = r#"{
            "candidates": [{"content": {"parts": [{"text": "Lisbon"}], "role": "model"}}],
            "usageMetadata": {"promptTokenCount": 12, "candidatesTokenCount": 3, "totalTokenCount": 15}
        }"#;

        let chunk: GenerateChunk = serde_json::from_str(json).unwrap();
        assert_eq!(chunk.first_text(), Some("Lisbon"));
        let usage = TokenUsage::from_metadata(chunk.usage_metadata.as_ref().unwrap());
        assert_eq!(usage.prompt_tokens, 12);
        assert_eq!(usage.completion_tokens, 3);
        assert_eq!(usage.total(), 15);
    }

    #[test]
    fn token_usage_accumulates() {
        let mut total = TokenUsage::default();
        total.add(TokenUsage {
            prompt_tokens: 10,
            completion_tokens: 5,
        });
        total.add(TokenUsage {
            prompt_tokens: 7,
            completion_tokens: 2,
        });
        assert_eq!(total.prompt_tokens, 17);
        assert_eq!(total.completion_tokens, 7);
    }
}
