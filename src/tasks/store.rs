//! Sqlite-backed `tasks` table (§3, §4.6). Synchronous by design — callers
//! offload access to a blocking thread rather than making this module
//! itself async, matching the single-threaded cooperative scheduling model
//! (§4.6 Concurrency model).

use crate::model::{CallConfig, ProviderResponse, Task, TaskError, TaskStatus};
use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::Mutex;

pub struct TaskStore {
    conn: Mutex<Connection>,
}

impl TaskStore {
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create task db parent directory: {}", parent.display()))?;
        }

        let conn = Connection::open(db_path)
            .with_context(|| format!("failed to open task db at: {}", db_path.display()))?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA busy_timeout=3000;",
        )?;

        let store = Self { conn: Mutex::new(conn) };
        store.ensure_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn: Mutex::new(conn) };
        store.ensure_schema()?;
        Ok(store)
    }

    fn ensure_schema(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        conn.execute(
            "CREATE TABLE IF NOT EXISTS tasks (
                task_id TEXT PRIMARY KEY,
                status TEXT NOT NULL,
                config TEXT NOT NULL,
                created_ts REAL NOT NULL,
                started_ts REAL,
                completed_ts REAL,
                result TEXT,
                error TEXT,
                progress TEXT
            )",
            [],
        )?;
        Ok(())
    }

    pub fn insert_pending(&self, task_id: &str, config: &CallConfig, created_ts: f64) -> Result<()> {
        let config_json = serde_json::to_string(config)?;
        let conn = self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        conn.execute(
            "INSERT INTO tasks (task_id, status, config, created_ts) VALUES (?1, ?2, ?3, ?4)",
            params![task_id, TaskStatus::Pending.to_string(), config_json, created_ts],
        )?;
        Ok(())
    }

    /// The single atomic-transition write point named in §4.6 ("All
    /// transitions go through a single `update_status` function"). The
    /// `WHERE` clause matches both `task_id` and `expected_status` so the
    /// write is an optimistic-concurrency compare-and-swap (§5, §6): a
    /// caller observing `Ok(false)` lost the race (the row's status no
    /// longer matched what it expected) and must not treat its transition
    /// as having happened.
    pub fn update_status(
        &self,
        task_id: &str,
        expected_status: TaskStatus,
        new_status: TaskStatus,
        started_ts: Option<f64>,
        completed_ts: Option<f64>,
        result: Option<&ProviderResponse>,
        error: Option<&TaskError>,
        progress: Option<&str>,
    ) -> Result<bool> {
        let result_json = result.map(serde_json::to_string).transpose()?;
        let error_json = error.map(serde_json::to_string).transpose()?;
        let conn = self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let updated = conn.execute(
            "UPDATE tasks SET
                status = ?3,
                started_ts = COALESCE(?4, started_ts),
                completed_ts = COALESCE(?5, completed_ts),
                result = COALESCE(?6, result),
                error = COALESCE(?7, error),
                progress = COALESCE(?8, progress)
             WHERE task_id = ?1 AND status = ?2",
            params![
                task_id,
                expected_status.to_string(),
                new_status.to_string(),
                started_ts,
                completed_ts,
                result_json,
                error_json,
                progress
            ],
        )?;
        Ok(updated > 0)
    }

    pub fn get(&self, task_id: &str) -> Result<Option<Task>> {
        let conn = self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        conn.query_row(
            "SELECT task_id, status, config, created_ts, started_ts, completed_ts, result, error, progress
             FROM tasks WHERE task_id = ?1",
            params![task_id],
            row_to_task,
        )
        .optional()
        .context("failed to query task")
    }

    pub fn list_by_statuses(&self, statuses: &[TaskStatus]) -> Result<Vec<Task>> {
        let conn = self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let placeholders: Vec<String> = (0..statuses.len()).map(|i| format!("?{}", i + 1)).collect();
        let sql = format!(
            "SELECT task_id, status, config, created_ts, started_ts, completed_ts, result, error, progress
             FROM tasks WHERE status IN ({})",
            placeholders.join(", ")
        );
        let mut stmt = conn.prepare(&sql)?;
        let labels: Vec<String> = statuses.iter().map(ToString::to_string).collect();
        let rows = stmt.query_map(rusqlite::params_from_iter(labels.iter()), row_to_task)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().context("failed to list tasks")
    }

    /// Durability sweep (§4.6): transitions rows stuck in `running` after a
    /// restart to `failed`. Does not re-execute anything.
    pub fn sweep_running_to_failed(&self, completed_ts: f64) -> Result<usize> {
        let lost = TaskError {
            kind: "internal".to_string(),
            detail: "lost across restart".to_string(),
        };
        let error_json = serde_json::to_string(&lost)?;
        let conn = self.conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let updated = conn.execute(
            "UPDATE tasks SET status = ?1, completed_ts = ?2, error = ?3 WHERE status = ?4",
            params![TaskStatus::Failed.to_string(), completed_ts, error_json, TaskStatus::Running.to_string()],
        )?;
        Ok(updated)
    }
}

fn row_to_task(row: &rusqlite::Row) -> rusqlite::Result<Task> {
    let status_str: String = row.get(1)?;
    let config_str: String = row.get(2)?;
    let result_str: Option<String> = row.get(6)?;
    let error_str: Option<String> = row.get(7)?;

    let status = status_str
        .parse::<TaskStatus>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, e.into()))?;
    let config: CallConfig = serde_json::from_str(&config_str)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e)))?;
    let result = result_str
        .map(|s| serde_json::from_str::<ProviderResponse>(&s))
        .transpose()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e)))?;
    let error = error_str
        .map(|s| serde_json::from_str::<TaskError>(&s))
        .transpose()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, Box::new(e)))?;

    Ok(Task {
        task_id: row.get(0)?,
        status,
        config,
        created_ts: row.get(3)?,
        started_ts: row.get(4)?,
        completed_ts: row.get(5)?,
        result,
        error,
        progress: row.get(8)?,
    })
}

#[cfg(test)]
mod tests;
