//! Language-model integration.
//!
//! A [`Summarizer`] turns extracted page text into either free text or a
//! structured [`Judgment`] (should this be shown, and why). The only
//! production backend is Ollama.

pub mod ollama;

pub use ollama::OllamaSummarizer;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;

/// Placeholder substituted with the extracted page text.
pub const CONTENT_PLACEHOLDER: &str = "{content}";

/// Structured verdict requested for alert tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Judgment {
    pub is_show: bool,
    pub details: String,
}

impl Judgment {
    /// Parse the model's JSON output. Anything that does not fit the schema
    /// is an invalid response, not a transient failure.
    pub fn parse(raw: &str, provider: &str) -> Result<Self, LlmError> {
        serde_json::from_str(raw.trim()).map_err(|e| LlmError::InvalidResponse {
            provider: provider.to_string(),
            reason: format!("Invalid JSON response: {e}"),
        })
    }

    /// JSON schema handed to the model to constrain structured output.
    pub fn schema() -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "is_show": { "type": "boolean" },
                "details": { "type": "string" }
            },
            "required": ["is_show", "details"],
            "additionalProperties": false
        })
    }
}

/// What the summarizer produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inference {
    Text(String),
    Judgment(Judgment),
}

#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Backend name for logs and error messages.
    fn name(&self) -> &str;

    /// Run `prompt` against `content`. With `structured`, the result must be
    /// an [`Inference::Judgment`].
    async fn infer(
        &self,
        prompt: &str,
        content: &str,
        structured: bool,
    ) -> Result<Inference, LlmError>;
}

/// Substitute the page text into the prompt template.
pub fn render_prompt(template: &str, content: &str) -> Result<String, LlmError> {
    if template.trim().is_empty() {
        return Err(LlmError::InvalidPrompt(
            "Prompt must be a non-empty string".to_string(),
        ));
    }
    if !template.contains(CONTENT_PLACEHOLDER) {
        return Err(LlmError::InvalidPrompt(format!(
            "Prompt must include {CONTENT_PLACEHOLDER}"
        )));
    }
    Ok(template.replacen(CONTENT_PLACEHOLDER, content, 1))
}
