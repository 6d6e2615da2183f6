//! Async polling manager (§4.6): a task registry atop a relational store.
//! Single-threaded cooperative scheduling — the manager never spawns OS
//! threads per task; blocking store access is offloaded to a bounded
//! worker pool via `spawn_blocking`.

pub mod store;

use crate::errors::GatewayError;
use crate::model::{CallConfig, ProviderResponse, Task, TaskError, TaskStatus, TaskView, now_ts};
use crate::utils::cancellation::Cancellation;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use store::TaskStore;
use tokio::sync::{Notify, Semaphore};
use tracing::{error, warn};
use uuid::Uuid;

/// Capability the manager drives to actually run a submitted `CallConfig`.
/// Implemented by the orchestrator (§4.7); kept as a trait here so the
/// manager has no direct dependency on the retry engine or router.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, config: CallConfig, cancellation: Cancellation) -> Result<ProviderResponse, GatewayError>;
}

struct TaskHandle {
    cancellation: Cancellation,
    done: Arc<Notify>,
}

pub struct TaskManager {
    store: Arc<TaskStore>,
    executor: Arc<dyn TaskExecutor>,
    semaphore: Arc<Semaphore>,
    handles: Mutex<HashMap<String, TaskHandle>>,
}

impl TaskManager {
    pub fn new(store: Arc<TaskStore>, executor: Arc<dyn TaskExecutor>, max_concurrency: usize) -> Self {
        Self {
            store,
            executor,
            semaphore: Arc::new(Semaphore::new(max_concurrency.max(1))),
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Durability sweep (§4.6): run once at process start, before accepting
    /// new submissions.
    pub async fn recover_on_startup(&self) -> Result<usize, GatewayError> {
        let store = self.store.clone();
        let swept = tokio::task::spawn_blocking(move || store.sweep_running_to_failed(now_ts()))
            .await
            .map_err(|e| GatewayError::internal(format!("startup sweep join error: {e}")))?
            .map_err(|e| GatewayError::internal(e.to_string()))?;
        if swept > 0 {
            warn!(count = swept, "marked running tasks as failed after restart");
        }
        Ok(swept)
    }

    /// `submit(config) -> task_id` (§4.6). Inserts a pending row and
    /// schedules the execution coroutine; returns immediately.
    pub async fn submit(&self, config: CallConfig) -> Result<String, GatewayError> {
        let task_id = Uuid::new_v4().to_string();
        let store = self.store.clone();
        let config_for_store = config.clone();
        let created_ts = now_ts();
        let task_id_for_insert = task_id.clone();
        tokio::task::spawn_blocking(move || store.insert_pending(&task_id_for_insert, &config_for_store, created_ts))
            .await
            .map_err(|e| GatewayError::internal(format!("submit join error: {e}")))?
            .map_err(|e| GatewayError::internal(e.to_string()))?;

        self.schedule(task_id.clone(), config);
        Ok(task_id)
    }

    fn schedule(&self, task_id: String, config: CallConfig) {
        let cancellation = Cancellation::new();
        let done = Arc::new(Notify::new());
        {
            let mut handles = self.handles.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            handles.insert(
                task_id.clone(),
                TaskHandle {
                    cancellation: cancellation.clone(),
                    done: done.clone(),
                },
            );
        }

        let store = self.store.clone();
        let executor = self.executor.clone();
        let semaphore = self.semaphore.clone();

        tokio::spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };

            if cancellation.is_cancelled() {
                write_status(&store, &task_id, TaskStatus::Pending, TaskStatus::Cancelled, None, Some(now_ts()), None, None).await;
                done.notify_waiters();
                return;
            }

            let became_running =
                write_status(&store, &task_id, TaskStatus::Pending, TaskStatus::Running, Some(now_ts()), None, None, None).await;
            if !became_running {
                // Lost the race: `cancel()` already transitioned this row out
                // of Pending before we could claim it. Don't invoke the executor.
                done.notify_waiters();
                return;
            }

            let outcome = executor.execute(config, cancellation.clone()).await;
            let completed_ts = now_ts();
            match outcome {
                Ok(response) => {
                    write_status(
                        &store,
                        &task_id,
                        TaskStatus::Running,
                        TaskStatus::Completed,
                        None,
                        Some(completed_ts),
                        Some(&response),
                        None,
                    )
                    .await;
                }
                Err(err) if err.kind == crate::errors::ErrorKind::Cancelled => {
                    write_status(
                        &store,
                        &task_id,
                        TaskStatus::Running,
                        TaskStatus::Cancelled,
                        None,
                        Some(completed_ts),
                        None,
                        None,
                    )
                    .await;
                }
                Err(err) => {
                    let task_error = TaskError {
                        kind: err.kind.to_string(),
                        detail: err.message,
                    };
                    error!(task_id, kind = %task_error.kind, "task execution failed");
                    write_status_err(&store, &task_id, TaskStatus::Running, TaskStatus::Failed, completed_ts, &task_error).await;
                }
            }
            done.notify_waiters();
        });
    }

    /// `get_status(task_id) -> TaskView` (§4.6).
    pub async fn get_status(&self, task_id: &str) -> Result<TaskView, GatewayError> {
        self.load(task_id).await.map(|t| TaskView::from(&t))
    }

    async fn load(&self, task_id: &str) -> Result<Task, GatewayError> {
        let store = self.store.clone();
        let id = task_id.to_string();
        let task = tokio::task::spawn_blocking(move || store.get(&id))
            .await
            .map_err(|e| GatewayError::internal(format!("get_status join error: {e}")))?
            .map_err(|e| GatewayError::internal(e.to_string()))?;
        task.ok_or_else(|| GatewayError::bad_request(format!("unknown task_id: {task_id}")))
    }

    /// `wait(task_id, timeout) -> result` (§4.6). `timeout = None` waits
    /// indefinitely. Races the in-memory completion notification against a
    /// bounded re-poll so a notification sent just before this call
    /// registers interest is never missed for more than the poll interval.
    pub async fn wait(&self, task_id: &str, timeout: Option<Duration>) -> Result<TaskView, GatewayError> {
        const POLL_INTERVAL: Duration = Duration::from_millis(200);
        let done = {
            let handles = self.handles.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            handles.get(task_id).map(|h| h.done.clone())
        };

        let wait_once = async {
            loop {
                let task = self.load(task_id).await?;
                if task.status.is_terminal() {
                    return Ok(TaskView::from(&task));
                }
                if let Some(done) = &done {
                    tokio::select! {
                        () = done.notified() => {}
                        () = tokio::time::sleep(POLL_INTERVAL) => {}
                    }
                } else {
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
            }
        };

        match timeout {
            Some(dur) => tokio::time::timeout(dur, wait_once)
                .await
                .map_err(|_| GatewayError::new(crate::errors::ErrorKind::Timeout, "wait() timed out"))?,
            None => wait_once.await,
        }
    }

    /// `cancel(task_id)` (§4.6): idempotent. Pending tasks transition
    /// directly; running tasks are asked to cancel cooperatively and
    /// transition once the coroutine observes it; terminal tasks are a
    /// no-op.
    pub async fn cancel(&self, task_id: &str) -> Result<(), GatewayError> {
        let task = self.load(task_id).await?;
        if task.status.is_terminal() {
            return Ok(());
        }

        if task.status == TaskStatus::Pending {
            let applied =
                write_status(&self.store, task_id, TaskStatus::Pending, TaskStatus::Cancelled, None, Some(now_ts()), None, None).await;
            if applied {
                return Ok(());
            }
            // Lost the race: the row moved on (almost certainly to Running)
            // between our read and this write. Fall through to cooperative
            // cancellation instead of silently dropping the request.
        }

        let cancellation = {
            let handles = self.handles.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            handles.get(task_id).map(|h| h.cancellation.clone())
        };
        if let Some(cancellation) = cancellation {
            cancellation.cancel();
        }
        Ok(())
    }

    /// `list_active() -> [TaskView]` (§4.6): status in {pending, running}.
    pub async fn list_active(&self) -> Result<Vec<TaskView>, GatewayError> {
        let store = self.store.clone();
        let tasks = tokio::task::spawn_blocking(move || store.list_by_statuses(&[TaskStatus::Pending, TaskStatus::Running]))
            .await
            .map_err(|e| GatewayError::internal(format!("list_active join error: {e}")))?
            .map_err(|e| GatewayError::internal(e.to_string()))?;
        Ok(tasks.iter().map(TaskView::from).collect())
    }
}

/// Writes a status transition, gated on `expected_status` matching the
/// row's current status (§4.6, §6 — `update_status` is the single
/// optimistic-concurrency write point). Returns whether the transition was
/// actually applied; `false` means a concurrent writer (typically a racing
/// `cancel()`) already moved the row out of `expected_status`, and the
/// caller must not assume its own transition happened.
async fn write_status(
    store: &Arc<TaskStore>,
    task_id: &str,
    expected_status: TaskStatus,
    new_status: TaskStatus,
    started_ts: Option<f64>,
    completed_ts: Option<f64>,
    result: Option<&ProviderResponse>,
    progress: Option<&str>,
) -> bool {
    let store = store.clone();
    let task_id_owned = task_id.to_string();
    let result = result.cloned();
    let progress = progress.map(str::to_string);
    let join = tokio::task::spawn_blocking(move || {
        store.update_status(
            &task_id_owned,
            expected_status,
            new_status,
            started_ts,
            completed_ts,
            result.as_ref(),
            None,
            progress.as_deref(),
        )
    })
    .await;
    let outcome: Result<bool, GatewayError> = match join {
        Ok(inner) => inner.map_err(GatewayError::from),
        Err(e) => Err(GatewayError::internal(format!("update_status join error: {e}"))),
    };
    match outcome {
        Ok(true) => true,
        Ok(false) => {
            warn!(task_id, %expected_status, %new_status, "task status transition lost an optimistic-concurrency race");
            false
        }
        Err(e) => {
            error!(error = %e, "failed to persist task status transition");
            false
        }
    }
}

async fn write_status_err(
    store: &Arc<TaskStore>,
    task_id: &str,
    expected_status: TaskStatus,
    new_status: TaskStatus,
    completed_ts: f64,
    task_error: &TaskError,
) -> bool {
    let store = store.clone();
    let task_id_owned = task_id.to_string();
    let task_error = task_error.clone();
    let join = tokio::task::spawn_blocking(move || {
        store.update_status(
            &task_id_owned,
            expected_status,
            new_status,
            None,
            Some(completed_ts),
            None,
            Some(&task_error),
            None,
        )
    })
    .await;
    let outcome: Result<bool, GatewayError> = match join {
        Ok(inner) => inner.map_err(GatewayError::from),
        Err(e) => Err(GatewayError::internal(format!("update_status join error: {e}"))),
    };
    match outcome {
        Ok(true) => true,
        Ok(false) => {
            warn!(task_id, %expected_status, %new_status, "task failure transition lost an optimistic-concurrency race");
            false
        }
        Err(e) => {
            error!(error = %e, "failed to persist task failure");
            false
        }
    }
}
