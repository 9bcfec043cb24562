//! Ollama backend — `POST /api/generate`, non-streaming.

use async_trait::async_trait;
use serde::Deserialize;

use super::{Inference, Judgment, Summarizer, render_prompt};
use crate::error::LlmError;

const PROVIDER: &str = "ollama";

pub struct OllamaSummarizer {
    host: String,
    model: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

impl OllamaSummarizer {
    pub fn new(host: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            host: host.into().trim_end_matches('/').to_string(),
            model: model.into(),
            client: reqwest::Client::new(),
        }
    }

    fn request_body(&self, prompt: &str, structured: bool) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
        });
        if structured {
            body["format"] = Judgment::schema();
        }
        body
    }
}

#[async_trait]
impl Summarizer for OllamaSummarizer {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn infer(
        &self,
        prompt: &str,
        content: &str,
        structured: bool,
    ) -> Result<Inference, LlmError> {
        let prompt = render_prompt(prompt, content)?;
        let body = self.request_body(&prompt, structured);

        let resp = self
            .client
            .post(format!("{}/api/generate", self.host))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    LlmError::Unreachable {
                        provider: PROVIDER.to_string(),
                        reason: format!("{} ({})", e, self.host),
                    }
                } else {
                    LlmError::RequestFailed {
                        provider: PROVIDER.to_string(),
                        reason: e.to_string(),
                    }
                }
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(LlmError::RequestFailed {
                provider: PROVIDER.to_string(),
                reason: format!("API error {status}: {text}"),
            });
        }

        let generated: GenerateResponse =
            resp.json().await.map_err(|e| LlmError::InvalidResponse {
                provider: PROVIDER.to_string(),
                reason: e.to_string(),
            })?;

        tracing::debug!(
            model = %self.model,
            structured,
            chars = generated.response.len(),
            "Ollama generation complete"
        );

        if structured {
            Judgment::parse(&generated.response, PROVIDER).map(Inference::Judgment)
        } else {
            Ok(Inference::Text(generated.response.trim().to_string()))
        }
    }
}
