//! Top-level service handle.
//!
//! [`TorRss`] wires the database, download client, detail fetcher, admission
//! pipeline and scheduler together from a [`Config`].

use crate::client::{self, DownloadClient};
use crate::config::{Config, TaskConfig};
use crate::db::Database;
use crate::detail::{DetailSource, HttpDetailFetcher};
use crate::error::Result;
use crate::pipeline::AdmissionPipeline;
use crate::scheduler::TaskScheduler;
use crate::types::{Event, HistoryRecord, RunSummary, TaskId};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Running torrss instance
pub struct TorRss {
    /// Database handle
    pub db: Arc<Database>,
    config: Arc<Config>,
    pipeline: Arc<AdmissionPipeline>,
    scheduler: TaskScheduler,
    event_tx: broadcast::Sender<Event>,
    cancel: CancellationToken,
}

impl TorRss {
    /// Open the database, seed tasks from the config and build the pipeline
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let client = client::from_config(&config.client)?;
        let details: Arc<dyn DetailSource> = Arc::new(HttpDetailFetcher::new(
            config.admission.fetch_timeout,
            &config.admission.user_agent,
        )?);
        Self::with_collaborators(config, client, details).await
    }

    /// Build an instance around an explicit download client and detail source
    pub async fn with_collaborators(
        config: Config,
        client: Arc<dyn DownloadClient>,
        details: Arc<dyn DetailSource>,
    ) -> Result<Self> {
        let db = Arc::new(Database::new(&config.persistence.database_path).await?);
        seed_tasks(&db, &config.tasks).await?;

        let (event_tx, _rx) = broadcast::channel(1000);
        let pipeline = Arc::new(AdmissionPipeline::new(
            &config.admission,
            db.clone(),
            client,
            details,
            event_tx.clone(),
        )?);

        let cancel = CancellationToken::new();
        let scheduler = TaskScheduler::new(
            pipeline.clone(),
            db.clone(),
            config.scheduler.clone(),
            cancel.clone(),
        );

        Ok(Self {
            db,
            config: Arc::new(config),
            pipeline,
            scheduler,
            event_tx,
            cancel,
        })
    }

    /// Subscribe to pipeline events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// The configuration this instance was built from
    pub fn config(&self) -> Arc<Config> {
        self.config.clone()
    }

    /// The scheduler, for pause/resume/run-once controls
    pub fn scheduler(&self) -> &TaskScheduler {
        &self.scheduler
    }

    /// Start the scheduling loop in the background
    pub fn start_scheduler(&self) -> JoinHandle<()> {
        tokio::spawn(self.scheduler.clone().run())
    }

    /// Run a task right now and wait for the result
    ///
    /// Unlike [`TaskScheduler::run_once`] this does not go through the
    /// scheduler and so does not guard against overlapping runs.
    pub async fn run_task_now(&self, id: TaskId) -> Result<RunSummary> {
        let task = self
            .db
            .get_task(id)
            .await?
            .ok_or_else(|| crate::Error::NotFound(format!("task {id}")))?;
        self.pipeline.run(&task, &self.cancel).await
    }

    /// Add a task, returning its ID
    pub async fn add_task(&self, task: TaskConfig) -> Result<TaskId> {
        task.validate()?;
        let task = with_site(task);
        self.db.insert_task(&task).await
    }

    /// All tasks
    pub async fn tasks(&self) -> Result<Vec<TaskConfig>> {
        self.db.get_all_tasks().await
    }

    /// History page, newest first
    pub async fn history(
        &self,
        task: Option<TaskId>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<HistoryRecord>> {
        self.db.query_history(task, limit, offset).await
    }

    /// Stop the scheduler, let in-flight runs finish and close the database
    pub async fn shutdown(&self) -> Result<()> {
        info!("shutting down");
        let _ = self.event_tx.send(Event::Shutdown);
        self.scheduler.shutdown().await;
        self.db.pool().close().await;
        info!("shutdown complete");
        Ok(())
    }
}

fn with_site(mut task: TaskConfig) -> TaskConfig {
    if task.site.is_empty() {
        task.site = crate::utils::site_name(&task.feed_url);
    }
    task
}

/// Insert configured tasks whose feed URL is not in the database yet
async fn seed_tasks(db: &Database, tasks: &[TaskConfig]) -> Result<()> {
    for task in tasks {
        if db.find_task_by_url(&task.feed_url).await?.is_some() {
            continue;
        }
        let id = db.insert_task(&with_site(task.clone())).await?;
        info!(task_id = %id, feed = %task.feed_url, "seeded task from config");
    }
    Ok(())
}
