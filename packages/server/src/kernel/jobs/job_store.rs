//! Job persistence.
//!
//! Every transition goes through [`JobStore::update`], which applies a
//! [`JobPatch`] atomically: readers see the record before or after the
//! patch, never in between.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::job::{Job, JobPatch, PatchError};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("job not found: {0}")]
    NotFound(Uuid),

    #[error("job already exists: {0}")]
    Conflict(Uuid),

    #[error("rejected update for job {id}: {source}")]
    InvalidUpdate {
        id: Uuid,
        #[source]
        source: PatchError,
    },

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new record.
    async fn create(&self, job: &Job) -> Result<(), StoreError>;

    /// Apply `patch` atomically and return the updated record.
    async fn update(&self, id: Uuid, patch: JobPatch) -> Result<Job, StoreError>;

    /// Current record, regardless of expiry.
    async fn get(&self, id: Uuid) -> Result<Option<Job>, StoreError>;

    /// Ids of records with `expires_at < now`.
    async fn list_expired(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, StoreError>;

    /// Remove a record. Returns whether it existed.
    async fn delete(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Ids of records not yet in a terminal state.
    async fn list_unfinished(&self) -> Result<Vec<Uuid>, StoreError>;
}

/// In-process store for development and tests.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<Uuid, Job>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, job: &Job) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.id) {
            return Err(StoreError::Conflict(job.id));
        }
        jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn update(&self, id: Uuid, patch: JobPatch) -> Result<Job, StoreError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        job.apply(patch, Utc::now())
            .map_err(|source| StoreError::InvalidUpdate { id, source })?;
        Ok(job.clone())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Job>, StoreError> {
        Ok(self.jobs.read().await.get(&id).cloned())
    }

    async fn list_expired(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, StoreError> {
        Ok(self
            .jobs
            .read()
            .await
            .values()
            .filter(|job| job.is_expired(now))
            .map(|job| job.id)
            .collect())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.jobs.write().await.remove(&id).is_some())
    }

    async fn list_unfinished(&self) -> Result<Vec<Uuid>, StoreError> {
        Ok(self
            .jobs
            .read()
            .await
            .values()
            .filter(|job| !job.status.is_terminal())
            .map(|job| job.id)
            .collect())
    }
}
