//! Runs a single task to completion: fetch, summarize, format.
//!
//! Every outcome is a value. Fetch and summarizer failures become
//! [`Verdict::Failed`] results that are delivered like any other text;
//! nothing here returns `Err` to the caller.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::LlmError;
use crate::fetch::{ContentFetcher, fetch_with_retry};
use crate::llm::{Inference, Summarizer};
use crate::retry::{RetryPolicy, retry};
use crate::task::Task;

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Free-text summary.
    Plain,
    /// Structured judgment from an alert task.
    Alert { is_show: bool },
    /// Task without url/selectors; the prompt was echoed.
    Notification,
    /// Fetch or summarizer failure, rendered as text.
    Failed,
}

/// The unsuppressed outcome of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub response: String,
    pub verdict: Verdict,
}

impl ExecutionResult {
    /// Text for a given caller. Automatic runs get an empty string for a
    /// failure or for an alert judged not worth showing; manual runs always
    /// see the text.
    pub fn render(&self, is_manual: bool) -> String {
        match self.verdict {
            Verdict::Alert { is_show: false } | Verdict::Failed if !is_manual => String::new(),
            _ => self.response.clone(),
        }
    }

    /// Failures are never cached.
    pub fn is_cacheable(&self) -> bool {
        self.verdict != Verdict::Failed
    }

    fn failed(task: &Task, reason: impl std::fmt::Display) -> Self {
        Self {
            response: format!("Task \"{}\" failed: {}", task.name, reason),
            verdict: Verdict::Failed,
        }
    }

    fn success(task: &Task, text: &str, verdict: Verdict) -> Self {
        Self {
            response: format!("Task \"{}\" result:\n{}", task.name, text),
            verdict,
        }
    }
}

pub struct TaskExecutor {
    fetcher: Arc<dyn ContentFetcher>,
    summarizer: Arc<dyn Summarizer>,
    retry_policy: RetryPolicy,
    fetch_timeout: Duration,
}

impl TaskExecutor {
    pub fn new(
        fetcher: Arc<dyn ContentFetcher>,
        summarizer: Arc<dyn Summarizer>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            fetcher,
            summarizer,
            retry_policy: RetryPolicy::from_config(config),
            fetch_timeout: config.fetch_timeout,
        }
    }

    /// Run `task` and render the result for the caller.
    pub async fn execute(&self, task: &Task, is_manual: bool) -> String {
        self.run(task).await.render(is_manual)
    }

    /// Run `task` without applying suppression.
    pub async fn run(&self, task: &Task) -> ExecutionResult {
        let run_id = Uuid::new_v4();

        if task.is_notification_only() {
            tracing::warn!(
                %run_id,
                task_id = task.id,
                task = %task.name,
                "Task has no url or selectors, sending prompt as notification"
            );
            return ExecutionResult {
                response: format!("Task \"{}\" notification:\n{}", task.name, task.prompt),
                verdict: Verdict::Notification,
            };
        }

        let url = task.url.as_deref().unwrap_or_default();
        let selectors = task.selectors();
        tracing::info!(%run_id, task_id = task.id, task = %task.name, url, "Executing task");

        let content = match fetch_with_retry(
            self.fetcher.as_ref(),
            url,
            &selectors,
            self.retry_policy,
            self.fetch_timeout,
        )
        .await
        {
            Ok(content) => content,
            Err(e) => {
                tracing::error!(%run_id, task_id = task.id, url, "Fetch failed: {}", e);
                return ExecutionResult::failed(task, e);
            }
        };

        let structured = task.alert_if_true.is_yes();
        let inference = retry(
            self.retry_policy,
            "Summarizer",
            || self.summarizer.infer(&task.prompt, &content, structured),
            LlmError::is_transient,
        )
        .await;

        let result = match inference {
            Ok(Inference::Text(text)) => ExecutionResult::success(task, &text, Verdict::Plain),
            Ok(Inference::Judgment(judgment)) => ExecutionResult::success(
                task,
                &judgment.details,
                Verdict::Alert {
                    is_show: judgment.is_show,
                },
            ),
            Err(e) => {
                tracing::error!(
                    %run_id,
                    task_id = task.id,
                    summarizer = self.summarizer.name(),
                    "Summarizer failed: {}",
                    e
                );
                return ExecutionResult::failed(task, e);
            }
        };

        if let Verdict::Alert { is_show: false } = result.verdict {
            tracing::info!(%run_id, task_id = task.id, "Judged not worth showing");
        }
        tracing::info!(%run_id, task_id = task.id, "Task completed");
        result
    }
}
