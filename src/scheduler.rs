//! Periodic task runner
//!
//! The scheduler wakes every `tick_interval`, reloads tasks from the database
//! (so edits and pause flags take effect without a restart) and starts a run
//! for every active task whose interval has elapsed. Runs execute on their own
//! tokio tasks, bounded by a semaphore of `max_concurrent_runs` permits.
//!
//! # Features
//!
//! - Independent per-task intervals, with a delay before the first automatic run
//! - A task never runs concurrently with itself
//! - Pause/resume persisted to the task's `active` flag
//! - Run-once trigger that ignores the interval and the pause flag
//! - Graceful shutdown: no new runs, in-flight runs stop between entries

use crate::config::SchedulerConfig;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::pipeline::AdmissionPipeline;
use crate::types::TaskId;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info};

#[derive(Default)]
struct RunState {
    running: HashSet<TaskId>,
    last_started: HashMap<TaskId, Instant>,
}

struct Inner {
    pipeline: Arc<AdmissionPipeline>,
    db: Arc<Database>,
    config: SchedulerConfig,
    permits: Semaphore,
    state: Mutex<RunState>,
    started_at: Instant,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

/// Schedules task runs; cheap to clone
#[derive(Clone)]
pub struct TaskScheduler {
    inner: Arc<Inner>,
}

impl TaskScheduler {
    /// Create a scheduler; nothing runs until [`run`](Self::run) or
    /// [`run_once`](Self::run_once) is called
    pub fn new(
        pipeline: Arc<AdmissionPipeline>,
        db: Arc<Database>,
        config: SchedulerConfig,
        cancel: CancellationToken,
    ) -> Self {
        let permits = Semaphore::new(config.max_concurrent_runs.max(1));
        Self {
            inner: Arc::new(Inner {
                pipeline,
                db,
                config,
                permits,
                state: Mutex::new(RunState::default()),
                started_at: Instant::now(),
                cancel,
                tracker: TaskTracker::new(),
            }),
        }
    }

    /// Run the scheduling loop until the cancellation token fires
    pub async fn run(self) {
        info!(
            max_concurrent_runs = self.inner.config.max_concurrent_runs,
            first_run_delay_secs = self.inner.config.first_run_delay.as_secs(),
            "task scheduler started"
        );

        loop {
            if let Err(e) = self.tick().await {
                error!(error = %e, "failed to load tasks, retrying next tick");
            }

            tokio::select! {
                _ = self.inner.cancel.cancelled() => break,
                _ = sleep(self.inner.config.tick_interval) => {}
            }
        }

        info!("task scheduler shutting down");
    }

    /// Start a run for every active task that is due
    pub(crate) async fn tick(&self) -> Result<()> {
        let tasks = self.inner.db.get_all_tasks().await?;
        let now = Instant::now();

        for task in tasks {
            if !task.active {
                continue;
            }
            if !self.is_due(task.id, task.interval, now) {
                continue;
            }
            debug!(task_id = %task.id, site = %task.site, "task due");
            self.spawn_run(task);
        }
        Ok(())
    }

    fn is_due(&self, id: TaskId, interval: std::time::Duration, now: Instant) -> bool {
        let Ok(state) = self.inner.state.lock() else {
            return false;
        };
        if state.running.contains(&id) {
            return false;
        }
        match state.last_started.get(&id) {
            Some(last) => now.duration_since(*last) >= interval,
            None => now.duration_since(self.inner.started_at) >= self.inner.config.first_run_delay,
        }
    }

    /// Trigger an immediate run of a task, paused or not
    ///
    /// Returns `Ok(false)` if the task is already running.
    pub async fn run_once(&self, id: TaskId) -> Result<bool> {
        if self.inner.cancel.is_cancelled() {
            return Err(Error::ShuttingDown);
        }
        let task = self
            .inner
            .db
            .get_task(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("task {id}")))?;

        info!(task_id = %id, "manual run requested");
        Ok(self.spawn_run(task))
    }

    /// Pause a task; an in-flight run finishes normally
    pub async fn pause(&self, id: TaskId) -> Result<()> {
        if !self.inner.db.set_task_active(id, false).await? {
            return Err(Error::NotFound(format!("task {id}")));
        }
        info!(task_id = %id, "task paused");
        Ok(())
    }

    /// Resume a paused task
    pub async fn resume(&self, id: TaskId) -> Result<()> {
        if !self.inner.db.set_task_active(id, true).await? {
            return Err(Error::NotFound(format!("task {id}")));
        }
        info!(task_id = %id, "task resumed");
        Ok(())
    }

    /// Whether a run of the task is in flight
    pub fn is_running(&self, id: TaskId) -> bool {
        self.inner
            .state
            .lock()
            .map(|state| state.running.contains(&id))
            .unwrap_or(false)
    }

    /// Stop scheduling and wait for in-flight runs to finish
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
    }

    fn spawn_run(&self, task: crate::config::TaskConfig) -> bool {
        let id = task.id;
        {
            let Ok(mut state) = self.inner.state.lock() else {
                return false;
            };
            if !state.running.insert(id) {
                debug!(task_id = %id, "task already running, not starting another run");
                return false;
            }
            state.last_started.insert(id, Instant::now());
        }

        let inner = self.inner.clone();
        self.inner.tracker.spawn(async move {
            let permit = tokio::select! {
                _ = inner.cancel.cancelled() => None,
                permit = inner.permits.acquire() => permit.ok(),
            };

            if permit.is_some() {
                // Errors are logged and reported as events by the pipeline
                let _ = inner.pipeline.run(&task, &inner.cancel).await;
            }
            drop(permit);

            if let Ok(mut state) = inner.state.lock() {
                state.running.remove(&id);
            }
        });
        true
    }
}
