//! Parse job model and its state machine.

use chrono::{DateTime, Duration, Utc};
use extraction::ExtractionMethod;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Opaque client metadata, passed through unmodified.
pub type Metadata = Map<String, Value>;

// ============================================================================
// Enums
// ============================================================================

/// ```text
/// queued ─► scraping ─► parsing ─► completed
///    │          │          │
///    └──────────┴──────────┴─► failed | canceled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Queued,
    Scraping,
    Parsing,
    Completed,
    Failed,
    Canceled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Scraping => "scraping",
            JobStatus::Parsing => "parsing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Canceled => "canceled",
        }
    }

    /// Position along the state machine. Terminal states share the last rank.
    pub fn rank(&self) -> u8 {
        match self {
            JobStatus::Queued => 0,
            JobStatus::Scraping => 1,
            JobStatus::Parsing => 2,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Canceled => 3,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.rank() == 3
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Queued, Scraping)
                | (Scraping, Parsing)
                | (Parsing, Completed)
                | (Queued | Scraping | Parsing, Failed | Canceled)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "scraping" => Ok(JobStatus::Scraping),
            "parsing" => Ok(JobStatus::Parsing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "canceled" => Ok(JobStatus::Canceled),
            other => Err(format!("unknown job status: {}", other)),
        }
    }
}

/// Machine-readable failure codes, as they appear on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidInput,
    ScrapeFailed,
    SchemaFetchFailed,
    LlmFailure,
    SchemaValidationFailed,
    NotFound,
    Timeout,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidInput => "INVALID_INPUT",
            ErrorCode::ScrapeFailed => "SCRAPE_FAILED",
            ErrorCode::SchemaFetchFailed => "SCHEMA_FETCH_FAILED",
            ErrorCode::LlmFailure => "LLM_FAILURE",
            ErrorCode::SchemaValidationFailed => "SCHEMA_VALIDATION_FAILED",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Value types
// ============================================================================

/// Failure recorded on a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default)]
    pub details: Option<Value>,
}

impl JobError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Advisory progress label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub step: String,
    pub message: String,
}

impl Progress {
    pub fn new(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            message: message.into(),
        }
    }
}

/// Per-job options supplied at submission.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOptions {
    /// Requested overall deadline in seconds; can only shorten the hard cutoff
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub force_headless: bool,
}

// ============================================================================
// Job Model
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,

    // Submission
    pub client_id: String,
    pub url: String,
    pub schema_endpoint: String,
    pub metadata: Metadata,
    pub options: JobOptions,

    // State
    pub status: JobStatus,
    pub progress: Progress,
    pub method: Option<ExtractionMethod>,
    pub raw_content: Option<String>,
    pub structured_data: Option<Value>,
    pub error: Option<JobError>,
    pub cancel_requested: bool,

    // Timestamps
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
}

/// Fields supplied by the caller when creating a job.
#[derive(Debug, Clone, Default)]
pub struct NewJob {
    pub client_id: String,
    pub url: String,
    pub schema_endpoint: String,
    pub metadata: Metadata,
    pub options: JobOptions,
}

impl Job {
    /// Create a queued job with a fresh random id, expiring `ttl` after now.
    pub fn new(new: NewJob, ttl: Duration) -> Self {
        Self::new_at(new, Utc::now(), ttl)
    }

    /// Create a queued job as if submitted at `created_at`.
    pub fn new_at(new: NewJob, created_at: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            client_id: new.client_id,
            url: new.url,
            schema_endpoint: new.schema_endpoint,
            metadata: new.metadata,
            options: new.options,
            status: JobStatus::Queued,
            progress: Progress::new("queued", "Waiting for a worker"),
            method: None,
            raw_content: None,
            structured_data: None,
            error: None,
            cancel_requested: false,
            created_at,
            updated_at: created_at,
            completed_at: None,
            expires_at: created_at + ttl,
        }
    }

    /// A job is unreadable once `now` is past `expires_at`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }

    /// Apply `patch` as one transition, validating the state machine and
    /// the result invariants. On error `self` is left untouched.
    pub fn apply(&mut self, patch: JobPatch, now: DateTime<Utc>) -> Result<(), PatchError> {
        let mut next = self.clone();

        if let Some(status) = patch.status {
            if status != self.status {
                if !self.status.can_transition_to(status) {
                    return Err(PatchError::InvalidTransition {
                        from: self.status,
                        to: status,
                    });
                }
                next.status = status;
                if status.is_terminal() {
                    next.completed_at = Some(now);
                }
            }
        }
        if let Some(progress) = patch.progress {
            next.progress = progress;
        }
        if let Some(method) = patch.method {
            next.method = Some(method);
        }
        if let Some(raw_content) = patch.raw_content {
            next.raw_content = Some(raw_content);
        }
        if let Some(data) = patch.structured_data {
            next.structured_data = Some(data);
        }
        if let Some(error) = patch.error {
            next.error = Some(error);
        }
        if let Some(cancel) = patch.cancel_requested {
            next.cancel_requested = cancel;
        }

        next.check_invariants()?;
        next.updated_at = now;
        *self = next;
        Ok(())
    }

    fn check_invariants(&self) -> Result<(), PatchError> {
        let completed = self.status == JobStatus::Completed;
        if completed != self.structured_data.is_some() {
            return Err(PatchError::Invariant(
                "structured_data must be present exactly when completed",
            ));
        }
        let failed = self.status == JobStatus::Failed;
        if failed != self.error.is_some() {
            return Err(PatchError::Invariant(
                "error must be present exactly when failed",
            ));
        }
        Ok(())
    }
}

/// A partial update covering one transition. `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub progress: Option<Progress>,
    pub method: Option<ExtractionMethod>,
    pub raw_content: Option<String>,
    pub structured_data: Option<Value>,
    pub error: Option<JobError>,
    pub cancel_requested: Option<bool>,
}

impl JobPatch {
    pub fn scraping() -> Self {
        Self {
            status: Some(JobStatus::Scraping),
            progress: Some(Progress::new("scraping", "Extracting page content")),
            ..Default::default()
        }
    }

    pub fn parsing(method: ExtractionMethod, raw_content: String) -> Self {
        Self {
            status: Some(JobStatus::Parsing),
            progress: Some(Progress::new("parsing", "Structuring extracted content")),
            method: Some(method),
            raw_content: Some(raw_content),
            ..Default::default()
        }
    }

    pub fn completed(structured_data: Value) -> Self {
        Self {
            status: Some(JobStatus::Completed),
            progress: Some(Progress::new("completed", "Done")),
            structured_data: Some(structured_data),
            ..Default::default()
        }
    }

    pub fn failed(error: JobError) -> Self {
        Self {
            status: Some(JobStatus::Failed),
            progress: Some(Progress::new("failed", error.message.clone())),
            error: Some(error),
            ..Default::default()
        }
    }

    pub fn canceled(message: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus::Canceled),
            progress: Some(Progress::new("canceled", message)),
            ..Default::default()
        }
    }

    pub fn request_cancel() -> Self {
        Self {
            cancel_requested: Some(true),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PatchError {
    #[error("illegal transition {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("invariant violated: {0}")]
    Invariant(&'static str),
}
