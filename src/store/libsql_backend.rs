//! libSQL backend — async `TaskStore` implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::info;

use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::TaskStore;
use crate::task::{AlertMode, NewTask, Task};

const TASK_COLUMNS: &str =
    "id, name, url, tags, schedule, raw_schedule, alert_if_true, prompt, destination";

/// libSQL task store.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlTaskStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlTaskStore {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let store = Self::from_database(db).await?;
        info!(path = %path.display(), "Database opened");
        Ok(store)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;
        Self::from_database(db).await
    }

    async fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        migrations::run_migrations(&conn).await?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

fn opt_text(value: &Option<String>) -> libsql::Value {
    match value {
        Some(s) => libsql::Value::Text(s.clone()),
        None => libsql::Value::Null,
    }
}

/// Map a row (in `TASK_COLUMNS` order) to a task, rejecting rows that do
/// not satisfy the model's invariants.
fn row_to_task(row: &libsql::Row) -> Result<Task, String> {
    let id: i64 = row.get(0).map_err(|e| format!("id: {e}"))?;
    let text = |idx: i32| -> Option<String> {
        row.get::<String>(idx)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    };

    let name = text(1).ok_or_else(|| format!("task {id}: empty name"))?;
    let prompt = text(7).ok_or_else(|| format!("task {id}: empty prompt"))?;
    let destination = text(8).ok_or_else(|| format!("task {id}: empty destination"))?;
    let alert_if_true: AlertMode = text(6)
        .unwrap_or_default()
        .parse()
        .map_err(|e| format!("task {id}: alert_if_true {e}"))?;

    Ok(Task {
        id,
        name,
        url: text(2),
        tag_selectors: text(3),
        schedule: text(4),
        raw_schedule: text(5),
        alert_if_true,
        prompt,
        destination,
    })
}

fn with_id(id: i64, task: &NewTask) -> Task {
    Task {
        id,
        name: task.name.clone(),
        url: task.url.clone(),
        tag_selectors: task.tag_selectors.clone(),
        schedule: task.schedule.clone(),
        raw_schedule: task.raw_schedule.clone(),
        alert_if_true: task.alert_if_true,
        prompt: task.prompt.clone(),
        destination: task.destination.clone(),
    }
}

#[async_trait]
impl TaskStore for LibSqlTaskStore {
    async fn list_tasks(&self) -> Result<Vec<Task>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {TASK_COLUMNS} FROM tasks ORDER BY id"),
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_tasks: {e}")))?;

        let mut tasks = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_tasks: {e}")))?
        {
            match row_to_task(&row) {
                Ok(task) => tasks.push(task),
                Err(reason) => tracing::error!("Invalid task data skipped: {}", reason),
            }
        }
        Ok(tasks)
    }

    async fn get_task(&self, id: i64) -> Result<Option<Task>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_task: {e}")))?;

        let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("get_task: {e}")))?
        else {
            return Ok(None);
        };

        match row_to_task(&row) {
            Ok(task) => Ok(Some(task)),
            Err(reason) => {
                tracing::error!("Invalid task data: {}", reason);
                Ok(None)
            }
        }
    }

    async fn create_task(&self, task: &NewTask) -> Result<Task, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "INSERT INTO tasks (name, url, tags, schedule, raw_schedule, alert_if_true, prompt, destination) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) RETURNING id",
                params![
                    task.name.clone(),
                    opt_text(&task.url),
                    opt_text(&task.tag_selectors),
                    opt_text(&task.schedule),
                    opt_text(&task.raw_schedule),
                    task.alert_if_true.to_string(),
                    task.prompt.clone(),
                    task.destination.clone(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("create_task: {e}")))?;

        let row = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("create_task: {e}")))?
            .ok_or_else(|| DatabaseError::Query("create_task: no id returned".to_string()))?;
        let id: i64 = row
            .get(0)
            .map_err(|e| DatabaseError::Query(format!("create_task: {e}")))?;

        info!(task_id = id, task = %task.name, "Task created");
        Ok(with_id(id, task))
    }

    async fn update_task(&self, id: i64, task: &NewTask) -> Result<Option<Task>, DatabaseError> {
        let affected = self
            .conn()
            .execute(
                "UPDATE tasks SET name = ?1, url = ?2, tags = ?3, schedule = ?4, raw_schedule = ?5, \
                 alert_if_true = ?6, prompt = ?7, destination = ?8, updated_at = datetime('now') \
                 WHERE id = ?9",
                params![
                    task.name.clone(),
                    opt_text(&task.url),
                    opt_text(&task.tag_selectors),
                    opt_text(&task.schedule),
                    opt_text(&task.raw_schedule),
                    task.alert_if_true.to_string(),
                    task.prompt.clone(),
                    task.destination.clone(),
                    id,
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_task: {e}")))?;

        if affected == 0 {
            return Ok(None);
        }
        info!(task_id = id, task = %task.name, "Task updated");
        Ok(Some(with_id(id, task)))
    }

    async fn delete_task(&self, id: i64) -> Result<bool, DatabaseError> {
        let affected = self
            .conn()
            .execute("DELETE FROM tasks WHERE id = ?1", params![id])
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_task: {e}")))?;
        if affected > 0 {
            info!(task_id = id, "Task deleted");
        }
        Ok(affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_task(name: &str) -> NewTask {
        NewTask {
            name: name.to_string(),
            url: Some("https://example.com".to_string()),
            tag_selectors: Some("article".to_string()),
            schedule: Some("0 9 * * *".to_string()),
            raw_schedule: None,
            alert_if_true: AlertMode::Yes,
            prompt: "Summarize: {content}".to_string(),
            destination: "42".to_string(),
        }
    }

    #[tokio::test]
    async fn create_get_list() {
        let store = LibSqlTaskStore::new_memory().await.unwrap();
        let a = store.create_task(&new_task("a")).await.unwrap();
        let b = store.create_task(&new_task("b")).await.unwrap();
        assert_ne!(a.id, b.id);

        let fetched = store.get_task(a.id).await.unwrap().unwrap();
        assert_eq!(fetched, a);
        assert_eq!(fetched.alert_if_true, AlertMode::Yes);
        assert_eq!(fetched.raw_schedule, None);

        let all = store.list_tasks().await.unwrap();
        assert_eq!(all.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn update_and_delete() {
        let store = LibSqlTaskStore::new_memory().await.unwrap();
        let task = store.create_task(&new_task("a")).await.unwrap();

        let mut edited = new_task("renamed");
        edited.url = None;
        let updated = store.update_task(task.id, &edited).await.unwrap().unwrap();
        assert_eq!(updated.name, "renamed");
        assert_eq!(store.get_task(task.id).await.unwrap().unwrap().url, None);

        assert!(store.update_task(999, &edited).await.unwrap().is_none());

        assert!(store.delete_task(task.id).await.unwrap());
        assert!(!store.delete_task(task.id).await.unwrap());
        assert!(store.get_task(task.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn invalid_rows_are_skipped() {
        let store = LibSqlTaskStore::new_memory().await.unwrap();
        store.create_task(&new_task("good")).await.unwrap();
        store
            .conn()
            .execute(
                "INSERT INTO tasks (name, prompt, destination, alert_if_true) VALUES ('bad', 'p', 'd', 'maybe')",
                (),
            )
            .await
            .unwrap();

        let all = store.list_tasks().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "good");
    }

    #[tokio::test]
    async fn file_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("tasks.db");
        {
            let store = LibSqlTaskStore::new_local(&path).await.unwrap();
            store.create_task(&new_task("kept")).await.unwrap();
        }
        let store = LibSqlTaskStore::new_local(&path).await.unwrap();
        let all = store.list_tasks().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "kept");
    }
}
