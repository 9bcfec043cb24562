//! Delivery sinks — where finished results go.

pub mod telegram;

pub use telegram::TelegramSink;

use async_trait::async_trait;

use crate::error::ChannelError;

/// Forwards a result to a task's destination. Only called with non-empty text.
#[async_trait]
pub trait DeliverySink: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, destination: &str, text: &str) -> Result<(), ChannelError>;
}

/// Sink used when no transport is configured; results only reach the log.
pub struct LogSink;

#[async_trait]
impl DeliverySink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, destination: &str, text: &str) -> Result<(), ChannelError> {
        tracing::info!(
            destination,
            preview = %text.chars().take(200).collect::<String>(),
            "Delivery"
        );
        Ok(())
    }
}
