//! Telegram delivery via the Bot API `sendMessage` method.
//!
//! Tries Markdown first and falls back to plain text when Telegram rejects
//! the markup (model output routinely contains unbalanced `*` and `_`).

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use super::DeliverySink;
use crate::error::ChannelError;

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

pub struct TelegramSink {
    bot_token: SecretString,
    api_base: String,
    client: reqwest::Client,
}

impl TelegramSink {
    pub fn new(bot_token: SecretString) -> Self {
        Self {
            bot_token,
            api_base: "https://api.telegram.org".to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Point at a different Bot API server (self-hosted or a test double).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn api_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{method}",
            self.api_base,
            self.bot_token.expose_secret()
        )
    }

    /// Send a single chunk (≤4096 chars), Markdown-first with fallback.
    async fn send_chunk(&self, chat_id: &str, text: &str) -> Result<(), ChannelError> {
        let markdown_body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "Markdown"
        });

        let markdown_resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&markdown_body)
            .send()
            .await
            .map_err(send_failed)?;

        if markdown_resp.status().is_success() {
            return Ok(());
        }

        let markdown_status = markdown_resp.status();
        tracing::warn!(
            status = ?markdown_status,
            "Telegram sendMessage with Markdown failed; retrying without parse_mode"
        );

        let plain_body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
        });
        let plain_resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&plain_body)
            .send()
            .await
            .map_err(send_failed)?;

        if !plain_resp.status().is_success() {
            let plain_err = plain_resp.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed {
                name: "telegram".into(),
                reason: format!(
                    "sendMessage failed (markdown: {}, plain: {})",
                    markdown_status, plain_err
                ),
            });
        }

        Ok(())
    }
}

fn send_failed(e: reqwest::Error) -> ChannelError {
    ChannelError::SendFailed {
        name: "telegram".into(),
        // Strip the URL so the bot token never reaches the logs.
        reason: e.without_url().to_string(),
    }
}

#[async_trait]
impl DeliverySink for TelegramSink {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send(&self, destination: &str, text: &str) -> Result<(), ChannelError> {
        if destination.trim().is_empty() {
            return Err(ChannelError::InvalidDestination {
                name: "telegram".into(),
                destination: destination.to_string(),
            });
        }
        for chunk in split_message(text, TELEGRAM_MAX_MESSAGE_LENGTH) {
            self.send_chunk(destination, &chunk).await?;
        }
        tracing::debug!(chat_id = destination, "Telegram message sent");
        Ok(())
    }
}

/// Split text into chunks of at most `max_len` bytes, preferring newline
/// then space boundaries.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let mut limit = max_len;
        while !remaining.is_char_boundary(limit) {
            limit -= 1;
        }

        let chunk = &remaining[..limit];
        let split_at = chunk
            .rfind('\n')
            .or_else(|| chunk.rfind(' '))
            .unwrap_or(limit);

        // Don't split at position 0 (infinite loop guard)
        let split_at = if split_at == 0 { limit } else { split_at };

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}
