//! Embedding generation against the provider's embedding endpoint.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

/// Errors from embedding generation.
#[derive(Debug, Error)]
pub enum EmbedderError {
    #[error("embedding request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("embedding endpoint returned status {status}: {message}")]
    Http { status: u16, message: String },

    #[error("embedding response missing values")]
    EmptyResponse,
}

/// Turns text into a dense vector. Implementations are concurrency-safe and
/// shared process-wide.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError>;
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: EmbedValues,
}

#[derive(Debug, Deserialize)]
struct EmbedValues {
    values: Vec<f32>,
}

/// REST embedder against the backend's `:embedContent` endpoint.
#[derive(Debug, Clone)]
pub struct HttpEmbedder {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl HttpEmbedder {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        let url = format!(
            "{}/models/{}:embedContent?key={}",
            self.base_url, self.model, self.api_key
        );
        let body = serde_json::json!({
            "model": format!("models/{}", self.model),
            "content": {"parts": [{"text": text}]},
        });

        let response = self.http.post(&url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(EmbedderError::Http {
                status: status.as_u16(),
                message,
            });
        }

        let decoded: EmbedResponse = response.json().await?;
        if decoded.embedding.values.is_empty() {
            return Err(EmbedderError::EmptyResponse);
        }
        Ok(decoded.embedding.values)
    }
}

/// Deterministic embedder for tests: equal texts embed identically
/// (cosine 1.0); different texts land in pseudorandom directions, so they
/// stay far below any realistic similarity threshold.
#[cfg(any(test, feature = "mock"))]
#[derive(Debug, Clone)]
pub struct MockEmbedder {
    dim: usize,
}

#[cfg(any(test, feature = "mock"))]
impl MockEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }
}

#[cfg(any(test, feature = "mock"))]
impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new(32)
    }
}

#[cfg(any(test, feature = "mock"))]
#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        use sha2::{Digest, Sha256};

        // Expand the text hash into `dim` bytes, mapped to [-1, 1].
        let mut values = Vec::with_capacity(self.dim);
        let mut block = Sha256::digest(text.as_bytes());
        while values.len() < self.dim {
            for byte in block.iter() {
                if values.len() == self.dim {
                    break;
                }
                values.push(*byte as f32 / 127.5 - 1.0);
            }
            block = Sha256::digest(block);
        }

        let norm: f32 = values.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in values.iter_mut() {
                *v /= norm;
            }
        }
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantic::cosine_similarity;

    #[tokio::test]
    async fn mock_embedder_is_deterministic() {
        let embedder = MockEmbedder::default();
        let a = embedder.embed("cheap sushi in Tokyo").await.unwrap();
        let b = embedder.embed("cheap sushi in Tokyo").await.unwrap();
        assert_eq!(a, b);
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn mock_embedder_distinguishes_texts() {
        let embedder = MockEmbedder::default();
        let a = embedder.embed("cheap sushi in Tokyo").await.unwrap();
        let b = embedder.embed("beachfront hotels in Barcelona").await.unwrap();
        // Pseudorandom directions stay well below cache thresholds.
        assert!(cosine_similarity(&a, &b) < 0.9);
    }
}
