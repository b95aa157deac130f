//! Parse job lifecycle.
//!
//! - [`Job`] - job record and its state machine
//! - [`JobStore`] - persistence seam ([`MemoryJobStore`], [`PgJobStore`])
//! - [`JobOrchestrator`] - submission, workers, polling and cancellation
//! - [`JobSweeper`] - scheduled removal of expired records
//!
//! ```text
//! queued ─► scraping ─► parsing ─► completed
//!    │          │          │
//!    └──────────┴──────────┴─► failed | canceled
//! ```

mod job;
mod job_store;
mod orchestrator;
mod pg_store;
pub mod sweeper;

pub use job::{
    ErrorCode, Job, JobError, JobOptions, JobPatch, JobStatus, Metadata, NewJob, PatchError,
    Progress,
};
pub use job_store::{JobStore, MemoryJobStore, StoreError};
pub use orchestrator::{JobOrchestrator, JobsError, OrchestratorConfig, Submission, SubmitRequest};
pub use pg_store::PgJobStore;
pub use sweeper::JobSweeper;
