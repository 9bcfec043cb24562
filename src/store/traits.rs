//! Backend-agnostic task persistence.

use async_trait::async_trait;

use crate::error::DatabaseError;
use crate::task::{NewTask, Task};

/// CRUD over task definitions, keyed by integer id.
///
/// Callers that mutate through this trait are responsible for rebuilding
/// the schedule afterwards; `SchedulerService` does that for its own
/// mutation methods.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// All tasks that pass load validation, ordered by id.
    async fn list_tasks(&self) -> Result<Vec<Task>, DatabaseError>;

    async fn get_task(&self, id: i64) -> Result<Option<Task>, DatabaseError>;

    async fn create_task(&self, task: &NewTask) -> Result<Task, DatabaseError>;

    /// Replace every field of task `id`. `None` when no such task exists.
    async fn update_task(&self, id: i64, task: &NewTask) -> Result<Option<Task>, DatabaseError>;

    /// Returns whether a row was deleted.
    async fn delete_task(&self, id: i64) -> Result<bool, DatabaseError>;
}
