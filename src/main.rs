//! CLI entry point for torrss.

use clap::Parser;
use torrss::{Config, TorRss};
use tracing::{debug, info, warn};

mod cli;

use cli::Args;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(args.default_level()));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");

    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if args.dry_run {
        config.admission.dry_run = true;
    }

    let service = TorRss::new(config).await?;
    info!(
        tasks = service.tasks().await?.len(),
        dry_run = service.config().admission.dry_run,
        "torrss starting"
    );

    if args.once {
        for task in service.tasks().await? {
            if !task.active {
                continue;
            }
            match service.run_task_now(task.id).await {
                Ok(summary) => info!(
                    task_id = %task.id,
                    downloaded = summary.downloaded,
                    rejected = summary.rejected,
                    skipped = summary.skipped,
                    "task finished"
                ),
                Err(e) => warn!(task_id = %task.id, error = %e, "task failed"),
            }
        }
        service.shutdown().await?;
        return Ok(());
    }

    let scheduler = service.start_scheduler();
    torrss::run_with_shutdown(service).await?;
    scheduler.await?;
    Ok(())
}
