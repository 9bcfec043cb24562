//! Version-tracked database migrations for the libSQL backend.
//!
//! Each migration has a version number and SQL. `run_migrations()` checks
//! the current version and applies only the new ones sequentially.
//! A legacy `tasks` table (keyed by `chatId`, no `_migrations` table) is
//! renamed aside and its rows copied into the V1 schema.

use libsql::Connection;

use crate::error::DatabaseError;

/// A single migration step.
struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. Add new versions to the end.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_tasks",
        sql: r#"
            CREATE TABLE IF NOT EXISTS tasks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                url TEXT,
                tags TEXT,
                schedule TEXT,
                raw_schedule TEXT,
                alert_if_true TEXT NOT NULL DEFAULT 'no',
                prompt TEXT NOT NULL,
                destination TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            CREATE INDEX IF NOT EXISTS idx_tasks_destination ON tasks(destination);
        "#,
    },
    Migration {
        version: 2,
        name: "task_schedule_index",
        sql: r#"
            CREATE INDEX IF NOT EXISTS idx_tasks_schedule ON tasks(schedule);
        "#,
    },
];

/// Run all pending migrations.
pub async fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        (),
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to create _migrations table: {e}")))?;

    let current_version = get_current_version(conn).await?;
    let legacy = current_version == 0 && legacy_tasks_table_exists(conn).await?;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            let import_legacy = migration.version == 1 && legacy;
            conn.execute("BEGIN", ())
                .await
                .map_err(|e| DatabaseError::Migration(format!("Failed to begin: {e}")))?;
            match apply(conn, migration, import_legacy).await {
                Ok(()) => {
                    conn.execute("COMMIT", ()).await.map_err(|e| {
                        DatabaseError::Migration(format!("Failed to commit: {e}"))
                    })?;
                }
                Err(e) => {
                    if let Err(rollback) = conn.execute("ROLLBACK", ()).await {
                        tracing::error!("Rollback of V{} failed: {}", migration.version, rollback);
                    }
                    return Err(e);
                }
            }
        }
    }

    tracing::info!(
        "Database migrations complete (at V{})",
        get_current_version(conn).await?
    );

    Ok(())
}

/// One migration and its version record. A legacy table is renamed aside
/// first and its rows copied in after the V1 schema exists.
async fn apply(
    conn: &Connection,
    migration: &Migration,
    import_legacy: bool,
) -> Result<(), DatabaseError> {
    if import_legacy {
        tracing::info!("Legacy tasks table detected, importing into V1 schema");
        conn.execute("ALTER TABLE tasks RENAME TO tasks_legacy", ())
            .await
            .map_err(|e| {
                DatabaseError::Migration(format!("Failed to set legacy table aside: {e}"))
            })?;
    }

    conn.execute_batch(migration.sql).await.map_err(|e| {
        DatabaseError::Migration(format!(
            "Migration V{} ({}) failed: {e}",
            migration.version, migration.name
        ))
    })?;

    if import_legacy {
        import_legacy_tasks(conn).await?;
    }
    seed_version(conn, migration.version, migration.name).await
}

/// Get the highest applied migration version, or 0 if none.
async fn get_current_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to query migration version: {e}")))?;

    let row = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to read migration version: {e}")))?;

    match row {
        Some(row) => row.get(0).map_err(|e| {
            DatabaseError::Migration(format!("Failed to parse migration version: {e}"))
        }),
        None => Ok(0),
    }
}

/// A `tasks` table that still addresses chats by `chatId`.
async fn legacy_tasks_table_exists(conn: &Connection) -> Result<bool, DatabaseError> {
    let mut rows = conn
        .query(
            "SELECT COUNT(*) FROM pragma_table_info('tasks') WHERE name = 'chatId'",
            (),
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("Failed to check legacy tables: {e}")))?;

    let row = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Query(format!("Failed to read legacy check: {e}")))?;

    match row {
        Some(row) => {
            let count: i64 = row.get(0).unwrap_or(0);
            Ok(count > 0)
        }
        None => Ok(false),
    }
}

async fn import_legacy_tasks(conn: &Connection) -> Result<(), DatabaseError> {
    let imported = conn
        .execute(
            "INSERT INTO tasks (id, name, url, tags, schedule, raw_schedule, alert_if_true, prompt, destination)
             SELECT id, name, url, tags, schedule, raw_schedule,
                    COALESCE(NULLIF(alert_if_true, ''), 'no'), prompt, CAST(chatId AS TEXT)
             FROM tasks_legacy
             WHERE id IS NOT NULL AND chatId IS NOT NULL",
            (),
        )
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to import legacy tasks: {e}")))?;

    conn.execute("DROP TABLE tasks_legacy", ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to drop legacy table: {e}")))?;

    tracing::info!(imported, "Imported legacy tasks");
    Ok(())
}

/// Insert a version record into `_migrations`.
async fn seed_version(conn: &Connection, version: i64, name: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR IGNORE INTO _migrations (version, name) VALUES (?1, ?2)",
        libsql::params![version, name],
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to record migration V{version}: {e}")))?;
    Ok(())
}
