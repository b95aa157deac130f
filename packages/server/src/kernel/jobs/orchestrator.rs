//! Job orchestration: submission, one worker per job, status reads, and
//! cancellation.
//!
//! ```text
//! submit ─► validate url + schema_endpoint ─► store.create(queued) ─► spawn worker
//!
//! worker (under the hard cutoff)
//!     ├─ cancel? ─► canceled
//!     ├─► scraping ─► ContentExtractor
//!     ├─ cancel? ─► canceled
//!     ├─► parsing  ─► fetch schema ─► Structurer
//!     └─► completed | failed
//! ```
//!
//! Poll reads go straight to the store and never wait on a worker.

use chrono::{DateTime, Utc};
use serde_json::json;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use extraction::{ContentExtractor, ExtractError, ExtractOptions, UrlValidator};

use super::job::{ErrorCode, Job, JobError, JobOptions, JobPatch, Metadata, NewJob};
use super::job_store::{JobStore, StoreError};
use crate::domains::parsing::{SchemaFetchError, StructureError, Structurer};
use crate::kernel::{BaseSchemaFetcher, ServerDeps};

/// Orchestrator settings.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Retention window; fixed at creation
    pub job_ttl: chrono::Duration,
    /// Advertised completion target
    pub soft_target: Duration,
    /// Jobs still running after this are failed with `TIMEOUT`
    pub hard_cutoff: Duration,
    /// Resolve hostnames at submission and reject private targets
    pub resolve_dns: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            job_ttl: chrono::Duration::hours(24),
            soft_target: Duration::from_secs(30),
            hard_cutoff: Duration::from_secs(60),
            resolve_dns: true,
        }
    }
}

/// A submission as received from a client.
#[derive(Debug, Clone, Default)]
pub struct SubmitRequest {
    pub url: String,
    pub schema_endpoint: String,
    pub client_id: String,
    pub metadata: Metadata,
    pub options: JobOptions,
}

/// Acknowledgement of an accepted submission.
#[derive(Debug, Clone)]
pub struct Submission {
    pub job_id: Uuid,
    pub estimated_completion: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum JobsError {
    #[error("invalid {field}: {message}")]
    InvalidInput { field: &'static str, message: String },

    #[error("job not found: {0}")]
    NotFound(Uuid),

    #[error("a worker is already running for job {0}")]
    WorkerActive(Uuid),

    #[error("job {0} has already finished")]
    AlreadyFinished(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Why a worker stopped without completing.
#[derive(Debug, Error)]
enum JobFailure {
    #[error(transparent)]
    Scrape(#[from] ExtractError),

    #[error(transparent)]
    SchemaFetch(#[from] SchemaFetchError),

    #[error(transparent)]
    Structure(#[from] StructureError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl JobFailure {
    fn to_job_error(&self) -> JobError {
        match self {
            JobFailure::Scrape(e) => {
                JobError::new(ErrorCode::ScrapeFailed, e.to_string()).with_details(e.details())
            }
            JobFailure::SchemaFetch(e) => JobError::new(ErrorCode::SchemaFetchFailed, e.to_string())
                .with_details(json!({ "http_status": e.http_status() })),
            JobFailure::Structure(e @ StructureError::LlmFailure { .. }) => {
                JobError::new(ErrorCode::LlmFailure, e.to_string()).with_details(e.details())
            }
            JobFailure::Structure(e @ StructureError::ValidationFailed { .. }) => {
                JobError::new(ErrorCode::SchemaValidationFailed, e.to_string())
                    .with_details(e.details())
            }
            JobFailure::Store(e) => JobError::new(ErrorCode::Internal, e.to_string()),
        }
    }
}

/// Removes a job id from the active set when its worker ends, however it
/// ends.
struct ActiveGuard {
    active: Arc<Mutex<HashSet<Uuid>>>,
    job_id: Uuid,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        if let Ok(mut active) = self.active.lock() {
            active.remove(&self.job_id);
        }
    }
}

/// Owns every job lifecycle transition.
#[derive(Clone)]
pub struct JobOrchestrator {
    store: Arc<dyn JobStore>,
    extractor: Arc<ContentExtractor>,
    schemas: Arc<dyn BaseSchemaFetcher>,
    structurer: Arc<Structurer>,
    validator: UrlValidator,
    config: OrchestratorConfig,
    active: Arc<Mutex<HashSet<Uuid>>>,
}

impl JobOrchestrator {
    pub fn new(deps: &ServerDeps, structurer: Structurer) -> Self {
        Self {
            store: deps.store.clone(),
            extractor: deps.extractor.clone(),
            schemas: deps.schemas.clone(),
            structurer: Arc::new(structurer),
            validator: UrlValidator::new(),
            config: OrchestratorConfig::default(),
            active: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// SSRF rules applied to submitted URLs.
    pub fn with_validator(mut self, validator: UrlValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// Number of workers currently running.
    pub fn active_jobs(&self) -> usize {
        self.active.lock().map(|a| a.len()).unwrap_or(0)
    }

    /// Validate and accept a submission, then start its worker.
    ///
    /// Returns as soon as the job is stored; the worker runs detached.
    pub async fn submit(&self, request: SubmitRequest) -> Result<Submission, JobsError> {
        self.check_url("url", &request.url).await?;
        self.check_url("schema_endpoint", &request.schema_endpoint)
            .await?;
        if request.client_id.trim().is_empty() {
            return Err(JobsError::InvalidInput {
                field: "client_id",
                message: "must not be empty".to_string(),
            });
        }
        if request.options.timeout_secs == Some(0) {
            return Err(JobsError::InvalidInput {
                field: "options.timeout",
                message: "must be at least 1 second".to_string(),
            });
        }

        let job = Job::new(
            NewJob {
                client_id: request.client_id,
                url: request.url,
                schema_endpoint: request.schema_endpoint,
                metadata: request.metadata,
                options: request.options,
            },
            self.config.job_ttl,
        );
        self.store.create(&job).await?;

        let estimated_completion = job.created_at
            + chrono::Duration::from_std(self.config.soft_target)
                .unwrap_or_else(|_| chrono::Duration::seconds(30));

        info!(job_id = %job.id, url = %job.url, client_id = %job.client_id, "Job submitted");
        self.spawn_worker(job.clone())?;

        Ok(Submission {
            job_id: job.id,
            estimated_completion,
        })
    }

    /// Start the worker for an existing, unfinished job.
    ///
    /// Refused when a worker for `job_id` is already running or the job is
    /// terminal.
    pub async fn start_worker(&self, job_id: Uuid) -> Result<(), JobsError> {
        let job = self
            .store
            .get(job_id)
            .await?
            .ok_or(JobsError::NotFound(job_id))?;
        if job.status.is_terminal() {
            return Err(JobsError::AlreadyFinished(job_id));
        }
        self.spawn_worker(job)
    }

    /// Latest snapshot of a job. Expired jobs are reported as not found
    /// whether or not they have been swept.
    pub async fn get_status(&self, job_id: Uuid) -> Result<Job, JobsError> {
        match self.store.get(job_id).await? {
            Some(job) if !job.is_expired(Utc::now()) => Ok(job),
            _ => Err(JobsError::NotFound(job_id)),
        }
    }

    /// Request cancellation; honored at the next stage boundary.
    /// A no-op for finished jobs.
    pub async fn cancel(&self, job_id: Uuid) -> Result<Job, JobsError> {
        let job = self.get_status(job_id).await?;
        if job.status.is_terminal() || job.cancel_requested {
            return Ok(job);
        }

        match self.store.update(job_id, JobPatch::request_cancel()).await {
            Ok(job) => {
                info!(job_id = %job_id, status = %job.status, "Cancellation requested");
                Ok(job)
            }
            Err(StoreError::NotFound(_)) => Err(JobsError::NotFound(job_id)),
            Err(e) => Err(e.into()),
        }
    }

    /// Fail jobs left unfinished by a previous process. Returns how many
    /// were marked.
    pub async fn recover_orphaned(&self) -> Result<usize, JobsError> {
        let orphaned = self.store.list_unfinished().await?;
        let mut recovered = 0;
        for job_id in orphaned {
            if self.is_active(job_id) {
                continue;
            }
            let patch = JobPatch::failed(JobError::new(
                ErrorCode::Internal,
                "worker lost on restart",
            ));
            match self.store.update(job_id, patch).await {
                Ok(_) => recovered += 1,
                Err(e) => warn!(job_id = %job_id, error = %e, "Failed to mark orphaned job"),
            }
        }
        if recovered > 0 {
            warn!(recovered, "Marked orphaned jobs as failed");
        }
        Ok(recovered)
    }

    fn is_active(&self, job_id: Uuid) -> bool {
        self.active
            .lock()
            .map(|a| a.contains(&job_id))
            .unwrap_or(false)
    }

    async fn check_url(&self, field: &'static str, url: &str) -> Result<(), JobsError> {
        let result = if self.config.resolve_dns {
            self.validator.validate_with_dns(url).await
        } else {
            self.validator.validate(url)
        };
        result.map(|_| ()).map_err(|e| JobsError::InvalidInput {
            field,
            message: e.to_string(),
        })
    }

    fn spawn_worker(&self, job: Job) -> Result<(), JobsError> {
        let guard = {
            let mut active = self
                .active
                .lock()
                .map_err(|_| StoreError::Backend("active worker set poisoned".to_string()))?;
            if !active.insert(job.id) {
                return Err(JobsError::WorkerActive(job.id));
            }
            ActiveGuard {
                active: self.active.clone(),
                job_id: job.id,
            }
        };

        let worker = self.clone();
        let span = info_span!("job", job_id = %job.id);
        tokio::spawn(
            async move {
                let _guard = guard;
                worker.run(job).await;
            }
            .instrument(span),
        );
        Ok(())
    }

    fn cutoff_for(&self, options: &JobOptions) -> Duration {
        match options.timeout_secs {
            Some(secs) => Duration::from_secs(secs).min(self.config.hard_cutoff),
            None => self.config.hard_cutoff,
        }
    }

    async fn run(&self, job: Job) {
        let cutoff = self.cutoff_for(&job.options);
        let job_id = job.id;

        let failure = match tokio::time::timeout(cutoff, self.drive(&job)).await {
            Ok(Ok(())) => return,
            Ok(Err(JobFailure::Store(StoreError::NotFound(_)))) => {
                debug!("Job record gone, worker exiting");
                return;
            }
            Ok(Err(failure)) => failure.to_job_error(),
            Err(_) => {
                warn!(cutoff_ms = cutoff.as_millis() as u64, "Job exceeded hard cutoff");
                JobError::new(
                    ErrorCode::Timeout,
                    format!("job exceeded its {}s deadline", cutoff.as_secs()),
                )
                .with_details(json!({ "timeout_ms": cutoff.as_millis() as u64 }))
            }
        };

        warn!(code = %failure.code, error = %failure.message, "Job failed");
        match self.store.update(job_id, JobPatch::failed(failure)).await {
            Ok(_) => {}
            Err(StoreError::NotFound(_)) => debug!("Job record gone before failure was recorded"),
            Err(e) => error!(error = %e, "Failed to record job failure"),
        }
    }

    async fn drive(&self, job: &Job) -> Result<(), JobFailure> {
        if self.cancel_if_requested(job.id, "Canceled before extraction").await? {
            return Ok(());
        }

        self.store.update(job.id, JobPatch::scraping()).await?;
        let options = ExtractOptions {
            force_headless: job.options.force_headless,
        };
        let extraction = self.extractor.extract(&job.url, &options).await?;
        info!(
            method = %extraction.method,
            chars = extraction.content.chars().count(),
            "Extraction finished"
        );

        if self.cancel_if_requested(job.id, "Canceled before structuring").await? {
            return Ok(());
        }

        self.store
            .update(
                job.id,
                JobPatch::parsing(extraction.method, extraction.content.clone()),
            )
            .await?;
        let descriptor = self.schemas.fetch(&job.schema_endpoint).await?;
        let data = self
            .structurer
            .structure(&extraction.content, &descriptor)
            .await?;

        self.store.update(job.id, JobPatch::completed(data)).await?;
        info!("Job completed");
        Ok(())
    }

    async fn cancel_if_requested(&self, job_id: Uuid, message: &str) -> Result<bool, JobFailure> {
        let job = self
            .store
            .get(job_id)
            .await?
            .ok_or(StoreError::NotFound(job_id))?;
        if !job.cancel_requested {
            return Ok(false);
        }
        self.store.update(job_id, JobPatch::canceled(message)).await?;
        info!("Job canceled");
        Ok(true)
    }
}
