//! Periodic removal of expired job records using tokio-cron-scheduler.
//!
//! ```text
//! Scheduler (every JOB_SWEEP_INTERVAL)
//!     │
//!     └─► store.list_expired(now)
//!             └─► store.delete(id) for each
//! ```
//!
//! Reads already treat expired records as missing, so the sweep only
//! reclaims space.

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio_cron_scheduler::{Job, JobScheduler};

use super::job_store::{JobStore, StoreError};

pub struct JobSweeper {
    scheduler: JobScheduler,
    interval: Duration,
}

impl JobSweeper {
    /// Start sweeping `store` every `interval`.
    pub async fn start(store: Arc<dyn JobStore>, interval: Duration) -> Result<Self> {
        let scheduler = JobScheduler::new().await?;

        let sweep_job = Job::new_repeated_async(interval, move |_uuid, _lock| {
            let store = store.clone();
            Box::pin(async move {
                match run_once(store.as_ref(), Utc::now()).await {
                    Ok(0) => {}
                    Ok(removed) => tracing::info!(removed, "Swept expired jobs"),
                    Err(e) => tracing::error!("Job sweep failed: {}", e),
                }
            })
        })?;

        scheduler.add(sweep_job).await?;
        scheduler.start().await?;

        tracing::info!(interval_secs = interval.as_secs(), "Job sweeper started");
        Ok(Self {
            scheduler,
            interval,
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub async fn shutdown(mut self) -> Result<()> {
        self.scheduler.shutdown().await?;
        tracing::info!("Job sweeper stopped");
        Ok(())
    }
}

/// Delete every record whose expiry has passed at `now`. Returns how many
/// were removed.
///
/// A failed delete is logged and skipped; the next sweep retries it.
pub async fn run_once(store: &dyn JobStore, now: DateTime<Utc>) -> Result<usize, StoreError> {
    let expired = store.list_expired(now).await?;
    let mut removed = 0;

    for id in expired {
        match store.delete(id).await {
            Ok(true) => removed += 1,
            Ok(false) => {}
            Err(e) => tracing::warn!(job_id = %id, error = %e, "Failed to delete expired job"),
        }
    }

    Ok(removed)
}
