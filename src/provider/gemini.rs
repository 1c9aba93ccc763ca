//! REST adapter for the Gemini generative backend.
//!
//! Streaming uses `:streamGenerateContent?alt=sse`, which frames each
//! [`GenerateChunk`] as one SSE `data:` line.

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Serialize;
use tracing::debug;

use super::error::{ProviderError, ProviderResult};
use super::{ChunkStream, GenerateChunk, Generation, GenerationConfig, TextProvider, TokenUsage};

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<RequestContent<'a>>,
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    generation_config: Option<&'a GenerationConfig>,
}

#[derive(Serialize)]
struct RequestContent<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

impl<'a> GenerateRequest<'a> {
    fn from_prompt(prompt: &'a str, config: &'a GenerationConfig) -> Self {
        Self {
            contents: vec![RequestContent {
                role: "user",
                parts: vec![RequestPart { text: prompt }],
            }],
            generation_config: Some(config),
        }
    }
}

/// Shared, concurrency-safe client for the Gemini REST API.
#[derive(Debug, Clone)]
pub struct GeminiProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl GeminiProvider {
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

    fn endpoint(&self, verb: &str, query: &str) -> String {
        format!(
            "{}/models/{}:{verb}?{query}key={}",
            self.base_url, self.model, self.api_key
        )
    }

    async fn check_status(response: reqwest::Response) -> ProviderResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response.text().await.unwrap_or_default();
        Err(ProviderError::Http {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl TextProvider for GeminiProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str, config: &GenerationConfig) -> ProviderResult<Generation> {
        let url = self.endpoint("generateContent", "");
        let body = GenerateRequest::from_prompt(prompt, config);

        let response = self.http.post(&url).json(&body).send().await?;
        let response = Self::check_status(response).await?;
        let chunk: GenerateChunk = response.json().await?;

        let text = chunk
            .first_text()
            .map(str::to_owned)
            .ok_or(ProviderError::EmptyResponse)?;
        let usage = chunk
            .usage_metadata
            .as_ref()
            .map(TokenUsage::from_metadata)
            .unwrap_or_default();

        Ok(Generation { text, usage })
    }

    async fn generate_stream(
        &self,
        prompt: &str,
        config: &GenerationConfig,
    ) -> ProviderResult<ChunkStream> {
        let url = self.endpoint("streamGenerateContent", "alt=sse&");
        let body = GenerateRequest::from_prompt(prompt, config);

        let response = self.http.post(&url).json(&body).send().await?;
        let response = Self::check_status(response).await?;

        debug!(model = %self.model, "provider stream opened");

        let stream = async_stream::stream! {
            let mut bytes = response.bytes_stream();
            let mut buffer = String::new();

            while let Some(next) = bytes.next().await {
                let raw = match next {
                    Ok(raw) => raw,
                    Err(e) => {
                        yield Err(ProviderError::Stream(e.to_string()));
                        return;
                    }
                };

                buffer.push_str(&String::from_utf8_lossy(&raw));

                while let Some(newline) = buffer.find('\n') {
                    let line = buffer[..newline].trim_end_matches('\r').to_string();
                    buffer.drain(..=newline);

                    let Some(data) = line.strip_prefix("data:") else {
                        continue;
                    };
                    let data = data.trim();
                    if data.is_empty() || data == "[DONE]" {
                        continue;
                    }

                    match serde_json::from_str::<GenerateChunk>(data) {
                        Ok(chunk) => yield Ok(chunk),
                        Err(e) => yield Err(ProviderError::Decode(e.to_string())),
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_matches_wire_shape() {
        let config = GenerationConfig {
            temperature: Some(0.7),
            max_output_tokens: Some(2048),
            ..Default::default()
        };
        let body = GenerateRequest::from_prompt("hello", &config);

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(json["contents"][0]["parts"][0]["text"], "hello");
        assert_eq!(json["generationConfig"]["temperature"], 0.7);
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 2048);
        assert!(json["generationConfig"].get("topP").is_none());
    }

    #[test]
    fn endpoint_places_query_before_key() {
        let provider = GeminiProvider::new("https://api.example/v1beta", "secret", "gemini-x");
        assert_eq!(
            provider.endpoint("streamGenerateContent", "alt=sse&"),
            "https://api.example/v1beta/models/gemini-x:streamGenerateContent?alt=sse&key=secret"
        );
    }
}
