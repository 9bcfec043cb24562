//! Stub collaborators shared by the engine tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use super::executor::TaskExecutor;
use super::gate::AdmissionGate;
use crate::channels::DeliverySink;
use crate::config::EngineConfig;
use crate::error::{ChannelError, FetchError, LlmError};
use crate::fetch::ContentFetcher;
use crate::llm::{Inference, Judgment, Summarizer};

/// Millisecond delays so queue and retry paths run quickly.
pub(crate) fn fast_config() -> EngineConfig {
    EngineConfig {
        fetch_retry_delay: Duration::from_millis(1),
        fetch_timeout: Duration::from_secs(2),
        queue_delay: Duration::from_millis(20),
        ..EngineConfig::default()
    }
}

pub(crate) fn gate(
    fetcher: &Arc<StubFetcher>,
    summarizer: &Arc<StubSummarizer>,
    sink: &Arc<RecordingSink>,
    config: EngineConfig,
) -> Arc<AdmissionGate> {
    let executor = TaskExecutor::new(fetcher.clone(), summarizer.clone(), &config);
    let gate = Arc::new(AdmissionGate::new(executor, sink.clone(), config));
    gate.spawn_drain_loop();
    gate
}

/// Returns a fixed reply, counting calls and peak concurrency. Optionally
/// blocks each call on a semaphore permit.
pub(crate) struct StubFetcher {
    reply: Result<String, FetchError>,
    hold: Option<Arc<Semaphore>>,
    delay: Duration,
    pub calls: AtomicUsize,
    pub active: AtomicUsize,
    pub peak: AtomicUsize,
}

impl StubFetcher {
    fn with_reply(reply: Result<String, FetchError>) -> Self {
        Self {
            reply,
            hold: None,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub(crate) fn text(text: &str) -> Self {
        Self::with_reply(Ok(text.to_string()))
    }

    pub(crate) fn failing(error: FetchError) -> Self {
        Self::with_reply(Err(error))
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn held_by(mut self, hold: Arc<Semaphore>) -> Self {
        self.hold = Some(hold);
        self
    }
}

#[async_trait]
impl ContentFetcher for StubFetcher {
    async fn fetch(
        &self,
        _url: &str,
        _include: &[String],
        _exclude: &[String],
    ) -> Result<String, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        if let Some(hold) = &self.hold {
            let _permit = hold.acquire().await;
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        self.active.fetch_sub(1, Ordering::SeqCst);
        self.reply.clone()
    }
}

pub(crate) enum SummaryReply {
    Text(String),
    Judgment(bool, String),
    Invalid,
    Unreachable,
}

pub(crate) struct StubSummarizer {
    reply: SummaryReply,
    last: Mutex<Option<(String, bool)>>,
    pub calls: AtomicUsize,
}

impl StubSummarizer {
    fn with_reply(reply: SummaryReply) -> Self {
        Self {
            reply,
            last: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn text(text: &str) -> Self {
        Self::with_reply(SummaryReply::Text(text.to_string()))
    }

    pub(crate) fn judgment(is_show: bool, details: &str) -> Self {
        Self::with_reply(SummaryReply::Judgment(is_show, details.to_string()))
    }

    pub(crate) fn invalid_response() -> Self {
        Self::with_reply(SummaryReply::Invalid)
    }

    pub(crate) fn unreachable() -> Self {
        Self::with_reply(SummaryReply::Unreachable)
    }

    pub(crate) fn last_content(&self) -> Option<String> {
        self.last.lock().unwrap().as_ref().map(|(c, _)| c.clone())
    }

    pub(crate) fn last_structured(&self) -> Option<bool> {
        self.last.lock().unwrap().as_ref().map(|(_, s)| *s)
    }
}

#[async_trait]
impl Summarizer for StubSummarizer {
    fn name(&self) -> &str {
        "stub"
    }

    async fn infer(
        &self,
        _prompt: &str,
        content: &str,
        structured: bool,
    ) -> Result<Inference, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().unwrap() = Some((content.to_string(), structured));
        match &self.reply {
            SummaryReply::Text(text) => Ok(Inference::Text(text.clone())),
            SummaryReply::Judgment(is_show, details) => Ok(Inference::Judgment(Judgment {
                is_show: *is_show,
                details: details.clone(),
            })),
            SummaryReply::Invalid => Err(LlmError::InvalidResponse {
                provider: "stub".to_string(),
                reason: "not json".to_string(),
            }),
            SummaryReply::Unreachable => Err(LlmError::Unreachable {
                provider: "stub".to_string(),
                reason: "connection refused".to_string(),
            }),
        }
    }
}

/// Records every delivery.
#[derive(Default)]
pub(crate) struct RecordingSink {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingSink {
    pub(crate) fn messages(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeliverySink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send(&self, destination: &str, text: &str) -> Result<(), ChannelError> {
        self.sent
            .lock()
            .unwrap()
            .push((destination.to_string(), text.to_string()));
        Ok(())
    }
}

/// Poll `cond` until it holds, failing the test after two seconds.
pub(crate) async fn wait_until(mut cond: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !cond() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
