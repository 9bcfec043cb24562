//! Cron timers over the live task list.
//!
//! The schedule is rebuilt from scratch on every change: all timers are
//! stopped, tasks are grouped by cron expression, and one timer is armed
//! per expression. Tasks sharing an expression fire with increasing
//! stagger offsets so they do not all hit the network at once.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::gate::AdmissionGate;
use crate::channels::DeliverySink;
use crate::task::{Task, cron_expr};

/// A task and how long after the timer fires it runs.
#[derive(Debug, Clone)]
pub struct StaggeredTask {
    pub task: Task,
    pub delay: Duration,
}

/// Tasks grouped under one cron expression.
#[derive(Debug, Clone)]
pub struct PlannedJob {
    pub expression: String,
    pub schedule: cron::Schedule,
    pub tasks: Vec<StaggeredTask>,
}

#[derive(Debug, Clone, Default)]
pub struct SchedulePlan {
    pub jobs: Vec<PlannedJob>,
    /// Ids of tasks left out, with the reason.
    pub unscheduled: Vec<(i64, String)>,
}

/// Group tasks by expression and assign stagger offsets. Tasks without a
/// schedule or with an invalid one are listed as unscheduled.
pub fn plan_schedule(tasks: &[Task], stagger: Duration) -> SchedulePlan {
    let mut groups: BTreeMap<String, (cron::Schedule, Vec<Task>)> = BTreeMap::new();
    let mut unscheduled = Vec::new();

    for task in tasks {
        let Some(expression) = task
            .schedule
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        else {
            unscheduled.push((task.id, "no schedule".to_string()));
            continue;
        };

        if let Some((_, members)) = groups.get_mut(expression) {
            members.push(task.clone());
            continue;
        }
        match cron_expr::parse(expression) {
            Ok(schedule) => {
                groups.insert(expression.to_string(), (schedule, vec![task.clone()]));
            }
            Err(reason) => unscheduled.push((task.id, reason)),
        }
    }

    let jobs = groups
        .into_iter()
        .map(|(expression, (schedule, members))| PlannedJob {
            expression,
            schedule,
            tasks: members
                .into_iter()
                .enumerate()
                .map(|(i, task)| StaggeredTask {
                    task,
                    delay: stagger * i as u32,
                })
                .collect(),
        })
        .collect();

    SchedulePlan { jobs, unscheduled }
}

/// Snapshot of one armed timer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArmedJob {
    pub expression: String,
    /// `(task_id, delay_secs)` in firing order.
    pub tasks: Vec<(i64, u64)>,
}

struct ArmedTimer {
    job: ArmedJob,
    handle: JoinHandle<()>,
}

pub struct Scheduler {
    gate: Arc<AdmissionGate>,
    sink: Arc<dyn DeliverySink>,
    stagger: Duration,
    timers: Mutex<Vec<ArmedTimer>>,
}

impl Scheduler {
    pub fn new(gate: Arc<AdmissionGate>, sink: Arc<dyn DeliverySink>, stagger: Duration) -> Self {
        Self {
            gate,
            sink,
            stagger,
            timers: Mutex::new(Vec::new()),
        }
    }

    /// Replace every timer with a fresh set derived from `tasks`.
    /// Returns the number of armed timers. Never fails.
    pub async fn rebuild(&self, tasks: &[Task]) -> usize {
        let mut timers = self.timers.lock().await;
        for timer in timers.drain(..) {
            timer.handle.abort();
        }

        let plan = plan_schedule(tasks, self.stagger);
        for (task_id, reason) in &plan.unscheduled {
            tracing::warn!(task_id, "Task not scheduled: {}", reason);
        }

        for job in plan.jobs {
            let armed = ArmedJob {
                expression: job.expression.clone(),
                tasks: job
                    .tasks
                    .iter()
                    .map(|s| (s.task.id, s.delay.as_secs()))
                    .collect(),
            };
            let handle = tokio::spawn(run_timer(
                job,
                Arc::clone(&self.gate),
                Arc::clone(&self.sink),
            ));
            timers.push(ArmedTimer { job: armed, handle });
        }

        tracing::info!(
            armed = timers.len(),
            unscheduled = plan.unscheduled.len(),
            "Schedule rebuilt"
        );
        timers.len()
    }

    /// Stop every timer. Deferred runs already spawned still complete.
    pub async fn stop(&self) {
        let mut timers = self.timers.lock().await;
        for timer in timers.drain(..) {
            timer.handle.abort();
        }
        tracing::info!("Scheduler stopped");
    }

    pub async fn armed(&self) -> Vec<ArmedJob> {
        self.timers
            .lock()
            .await
            .iter()
            .map(|t| t.job.clone())
            .collect()
    }
}

/// Sleep until each fire time, then hand every task in the group to the
/// gate after its stagger delay. Firing never blocks the timer.
async fn run_timer(job: PlannedJob, gate: Arc<AdmissionGate>, sink: Arc<dyn DeliverySink>) {
    loop {
        let now = Local::now();
        let Some(next) = cron_expr::next_fire(&job.schedule, &now) else {
            tracing::warn!(expression = %job.expression, "Cron expression has no future fire time");
            return;
        };
        let wait = (next - now).to_std().unwrap_or_default();
        tokio::time::sleep(wait).await;

        tracing::info!(expression = %job.expression, tasks = job.tasks.len(), "Cron fired");
        for staggered in &job.tasks {
            tokio::spawn(fire(
                staggered.clone(),
                Arc::clone(&gate),
                Arc::clone(&sink),
            ));
        }
    }
}

async fn fire(staggered: StaggeredTask, gate: Arc<AdmissionGate>, sink: Arc<dyn DeliverySink>) {
    let StaggeredTask { task, delay } = staggered;
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let output = gate.run_gated(&task, false).await;
    if output.is_empty() {
        tracing::debug!(task_id = task.id, "Nothing to deliver");
        return;
    }
    if let Err(e) = sink.send(&task.destination, &output).await {
        tracing::error!(
            task_id = task.id,
            destination = %task.destination,
            "Delivery failed: {}",
            e
        );
    }
}
