//! The long-lived service that owns the gate, the scheduler and the store.
//!
//! Created once at startup and shut down on exit. Every task mutation made
//! through it rebuilds the schedule and drops stale cached results.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::executor::TaskExecutor;
use super::gate::{AdmissionGate, GateStats};
use super::scheduler::{ArmedJob, Scheduler};
use crate::channels::DeliverySink;
use crate::config::EngineConfig;
use crate::error::{Result, TaskError};
use crate::fetch::ContentFetcher;
use crate::llm::Summarizer;
use crate::store::TaskStore;
use crate::task::{Task, TaskDraft};

#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    #[serde(flatten)]
    pub gate: GateStats,
    pub schedules: Vec<ArmedJob>,
}

pub struct SchedulerService {
    store: Arc<dyn TaskStore>,
    gate: Arc<AdmissionGate>,
    scheduler: Scheduler,
    sink: Arc<dyn DeliverySink>,
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl SchedulerService {
    pub fn new(
        store: Arc<dyn TaskStore>,
        fetcher: Arc<dyn ContentFetcher>,
        summarizer: Arc<dyn Summarizer>,
        sink: Arc<dyn DeliverySink>,
        config: EngineConfig,
    ) -> Self {
        let executor = TaskExecutor::new(fetcher, summarizer, &config);
        let stagger = config.stagger;
        let gate = Arc::new(AdmissionGate::new(executor, Arc::clone(&sink), config));
        let scheduler = Scheduler::new(Arc::clone(&gate), Arc::clone(&sink), stagger);
        Self {
            store,
            gate,
            scheduler,
            sink,
            background: Mutex::new(Vec::new()),
        }
    }

    /// Start the queue drain and cache sweep loops and arm the schedule.
    pub async fn start(&self) -> Result<usize> {
        {
            let mut background = self.background.lock().await;
            if background.is_empty() {
                background.push(self.gate.spawn_drain_loop());
                background.push(self.gate.spawn_cache_sweeper());
            }
        }
        self.reload().await
    }

    /// Re-read the task list and rebuild every timer.
    pub async fn reload(&self) -> Result<usize> {
        let tasks = self.store.list_tasks().await?;
        Ok(self.scheduler.rebuild(&tasks).await)
    }

    pub async fn list_tasks(&self) -> Result<Vec<Task>> {
        Ok(self.store.list_tasks().await?)
    }

    pub async fn get_task(&self, id: i64) -> Result<Task> {
        self.store
            .get_task(id)
            .await?
            .ok_or_else(|| TaskError::NotFound(id).into())
    }

    pub async fn create_task(&self, draft: TaskDraft) -> Result<Task> {
        let new_task = draft.parse().into_result()?;
        let task = self.store.create_task(&new_task).await?;
        self.reload().await?;
        Ok(task)
    }

    pub async fn update_task(&self, id: i64, draft: TaskDraft) -> Result<Task> {
        let new_task = draft.parse().into_result()?;
        let task = self
            .store
            .update_task(id, &new_task)
            .await?
            .ok_or(TaskError::NotFound(id))?;
        self.gate.invalidate_task(id).await;
        self.reload().await?;
        Ok(task)
    }

    pub async fn delete_task(&self, id: i64) -> Result<()> {
        if !self.store.delete_task(id).await? {
            return Err(TaskError::NotFound(id).into());
        }
        self.gate.invalidate_task(id).await;
        self.reload().await?;
        Ok(())
    }

    /// Run a task now on behalf of a user. The result is delivered to the
    /// task's destination and also returned.
    pub async fn run_manual(&self, id: i64) -> Result<String> {
        let Some(task) = self.store.get_task(id).await? else {
            tracing::warn!(task_id = id, "Manual run for unknown task");
            return Ok(format!("Task with ID {id} not found."));
        };

        let output = self.gate.run_gated(&task, true).await;
        if !output.is_empty()
            && let Err(e) = self.sink.send(&task.destination, &output).await
        {
            tracing::error!(
                task_id = id,
                destination = %task.destination,
                "Delivery failed: {}",
                e
            );
        }
        Ok(output)
    }

    pub async fn status(&self) -> ServiceStatus {
        ServiceStatus {
            gate: self.gate.stats().await,
            schedules: self.scheduler.armed().await,
        }
    }

    /// Stop timers and background loops, then flush the gate.
    pub async fn shutdown(&self) {
        self.scheduler.stop().await;
        for handle in self.background.lock().await.drain(..) {
            handle.abort();
        }
        self.gate.shutdown().await;
        tracing::info!("Scheduler service stopped");
    }
}
