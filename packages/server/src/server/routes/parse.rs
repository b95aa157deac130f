//! Job submission, polling and cancellation.

use axum::{
    extract::{rejection::JsonRejection, Extension, Path},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use extraction::ExtractionMethod;

use crate::kernel::jobs::{Job, JobError, JobOptions, JobStatus, Metadata, Progress, SubmitRequest};
use crate::server::app::AppState;
use crate::server::error::{parse_job_id, ApiResult};

#[derive(Debug, Deserialize)]
pub struct ParseRequest {
    pub url: String,
    pub schema_endpoint: String,
    pub client_id: String,
    #[serde(default)]
    pub metadata: Option<Metadata>,
    #[serde(default)]
    pub options: Option<ParseOptions>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ParseOptions {
    /// Per-job deadline in seconds
    pub timeout: Option<u64>,
    #[serde(default)]
    pub force_headless: bool,
}

#[derive(Debug, Serialize)]
pub struct ParseAccepted {
    pub success: bool,
    pub job_id: Uuid,
    pub status: &'static str,
    pub estimated_completion: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct JobResult {
    pub structured_data: Value,
    pub raw_content: String,
    pub method: Option<ExtractionMethod>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// Poll response; the populated fields depend on the job status.
#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<Progress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl From<Job> for JobStatusResponse {
    fn from(job: Job) -> Self {
        let mut response = JobStatusResponse {
            job_id: job.id,
            status: job.status,
            progress: None,
            result: None,
            error: None,
            metadata: None,
        };

        match job.status {
            JobStatus::Queued | JobStatus::Scraping | JobStatus::Parsing => {
                response.progress = Some(job.progress);
            }
            JobStatus::Completed => {
                response.result = Some(JobResult {
                    structured_data: job.structured_data.unwrap_or(Value::Null),
                    raw_content: job.raw_content.unwrap_or_default(),
                    method: job.method,
                    processed_at: job.completed_at,
                });
                response.metadata = Some(job.metadata);
            }
            JobStatus::Failed => {
                response.error = job.error;
                response.metadata = Some(job.metadata);
            }
            JobStatus::Canceled => {
                response.progress = Some(job.progress);
                response.metadata = Some(job.metadata);
            }
        }

        response
    }
}

/// Accept a parse job and return immediately.
pub async fn submit_handler(
    Extension(state): Extension<AppState>,
    payload: Result<Json<ParseRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ParseAccepted>)> {
    let Json(request) = payload?;

    let submission = state
        .orchestrator
        .submit(SubmitRequest {
            url: request.url,
            schema_endpoint: request.schema_endpoint,
            client_id: request.client_id,
            metadata: request.metadata.unwrap_or_default(),
            options: request.options.unwrap_or_default().into(),
        })
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(ParseAccepted {
            success: true,
            job_id: submission.job_id,
            status: "processing",
            estimated_completion: submission.estimated_completion,
        }),
    ))
}

pub async fn status_handler(
    Extension(state): Extension<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobStatusResponse>> {
    let job_id = parse_job_id(&job_id)?;
    let job = state.orchestrator.get_status(job_id).await?;
    Ok(Json(job.into()))
}

/// Request cancellation and return the job snapshot.
pub async fn cancel_handler(
    Extension(state): Extension<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobStatusResponse>> {
    let job_id = parse_job_id(&job_id)?;
    let job = state.orchestrator.cancel(job_id).await?;
    Ok(Json(job.into()))
}

impl From<ParseOptions> for JobOptions {
    fn from(options: ParseOptions) -> Self {
        JobOptions {
            timeout_secs: options.timeout,
            force_headless: options.force_headless,
        }
    }
}
