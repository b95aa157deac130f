//! PostgreSQL-backed job store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use extraction::ExtractionMethod;
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::job::{Job, JobError, JobOptions, JobPatch, JobStatus, Metadata, Progress};
use super::job_store::{JobStore, StoreError};

const SELECT_COLUMNS: &str = r#"
    id, client_id, url, schema_endpoint, metadata, options, status, progress,
    method, raw_content, structured_data, error, cancel_requested,
    created_at, updated_at, completed_at, expires_at
"#;

#[derive(FromRow)]
struct JobRow {
    id: Uuid,
    client_id: String,
    url: String,
    schema_endpoint: String,
    metadata: Json<Metadata>,
    options: Json<JobOptions>,
    status: String,
    progress: Json<Progress>,
    method: Option<String>,
    raw_content: Option<String>,
    structured_data: Option<Json<Value>>,
    error: Option<Json<JobError>>,
    cancel_requested: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    expires_at: DateTime<Utc>,
}

impl TryFrom<JobRow> for Job {
    type Error = StoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let status = row.status.parse::<JobStatus>().map_err(StoreError::Backend)?;
        let method = row
            .method
            .map(|m| m.parse::<ExtractionMethod>())
            .transpose()
            .map_err(StoreError::Backend)?;

        Ok(Job {
            id: row.id,
            client_id: row.client_id,
            url: row.url,
            schema_endpoint: row.schema_endpoint,
            metadata: row.metadata.0,
            options: row.options.0,
            status,
            progress: row.progress.0,
            method,
            raw_content: row.raw_content,
            structured_data: row.structured_data.map(|d| d.0),
            error: row.error.map(|e| e.0),
            cancel_requested: row.cancel_requested,
            created_at: row.created_at,
            updated_at: row.updated_at,
            completed_at: row.completed_at,
            expires_at: row.expires_at,
        })
    }
}

/// Job store on a `parse_jobs` table.
///
/// Updates lock the row, apply the patch in Rust with the same
/// transition rules as the in-memory store, and write every column back
/// in one transaction.
#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create(&self, job: &Job) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO parse_jobs (
                id, client_id, url, schema_endpoint, metadata, options, status, progress,
                method, raw_content, structured_data, error, cancel_requested,
                created_at, updated_at, completed_at, expires_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(job.id)
        .bind(&job.client_id)
        .bind(&job.url)
        .bind(&job.schema_endpoint)
        .bind(Json(&job.metadata))
        .bind(Json(&job.options))
        .bind(job.status.as_str())
        .bind(Json(&job.progress))
        .bind(job.method.map(|m| m.as_str()))
        .bind(&job.raw_content)
        .bind(job.structured_data.as_ref().map(Json))
        .bind(job.error.as_ref().map(Json))
        .bind(job.cancel_requested)
        .bind(job.created_at)
        .bind(job.updated_at)
        .bind(job.completed_at)
        .bind(job.expires_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(job.id));
        }
        Ok(())
    }

    async fn update(&self, id: Uuid, patch: JobPatch) -> Result<Job, StoreError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {} FROM parse_jobs WHERE id = $1 FOR UPDATE",
            SELECT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::NotFound(id))?;

        let mut job = Job::try_from(row)?;
        job.apply(patch, Utc::now())
            .map_err(|source| StoreError::InvalidUpdate { id, source })?;

        sqlx::query(
            r#"
            UPDATE parse_jobs
            SET status = $2,
                progress = $3,
                method = $4,
                raw_content = $5,
                structured_data = $6,
                error = $7,
                cancel_requested = $8,
                updated_at = $9,
                completed_at = $10
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(job.status.as_str())
        .bind(Json(&job.progress))
        .bind(job.method.map(|m| m.as_str()))
        .bind(&job.raw_content)
        .bind(job.structured_data.as_ref().map(Json))
        .bind(job.error.as_ref().map(Json))
        .bind(job.cancel_requested)
        .bind(job.updated_at)
        .bind(job.completed_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(job)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Job>, StoreError> {
        sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {} FROM parse_jobs WHERE id = $1",
            SELECT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(Job::try_from)
        .transpose()
    }

    async fn list_expired(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, StoreError> {
        let ids = sqlx::query_scalar::<_, Uuid>("SELECT id FROM parse_jobs WHERE expires_at < $1")
            .bind(now)
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM parse_jobs WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_unfinished(&self) -> Result<Vec<Uuid>, StoreError> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM parse_jobs WHERE status IN ('queued', 'scraping', 'parsing')",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }
}
