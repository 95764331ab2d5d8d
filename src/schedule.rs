//! Periodic ingestion on a cron expression.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

use crate::harvest::{HarvestError, Harvester};

/// Start the scheduler with one ingestion job. Keep the returned handle
/// alive for as long as runs should fire.
pub async fn start_scheduler(harvester: Arc<Harvester>, cron: &str) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    let job = Job::new_async(cron, move |_uuid, _lock| {
        let harvester = Arc::clone(&harvester);
        Box::pin(async move {
            info!("Running scheduled ingestion");
            run_logged(&harvester).await;
        })
    })
    .with_context(|| format!("invalid schedule '{}'", cron))?;

    scheduler.add(job).await?;
    scheduler.start().await?;

    info!(schedule = cron, "Scheduled ingestion started");
    Ok(scheduler)
}

/// Run one cycle, logging instead of propagating failures.
pub async fn run_logged(harvester: &Harvester) {
    match harvester.run_cycle().await {
        Ok(report) => info!("Ingestion completed: {}", report),
        Err(HarvestError::CycleInProgress) => {
            warn!("Previous ingestion still running, skipping this one")
        }
        Err(e) => error!("Ingestion failed: {}", e),
    }
}
