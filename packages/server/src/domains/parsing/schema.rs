//! Schema descriptors: the `{schema, prompt}` pair a client serves from
//! its schema endpoint.

use async_trait::async_trait;
use extraction::{blocked_by_guard, guard_client, UrlValidator, MAX_REDIRECTS};
use jsonschema::Validator;
use moka::future::Cache;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use super::validation;
use crate::kernel::backoff::BackoffConfig;
use crate::kernel::BaseSchemaFetcher;

/// A fetched and compiled schema descriptor.
pub struct SchemaDescriptor {
    pub schema: Value,
    pub prompt: String,
    validator: Validator,
}

impl SchemaDescriptor {
    /// Build a descriptor, compiling the schema up front.
    pub fn new(schema: Value, prompt: impl Into<String>) -> Result<Self, SchemaFetchError> {
        let validator = validation::compile(&schema).map_err(SchemaFetchError::Malformed)?;
        Ok(Self {
            schema,
            prompt: prompt.into(),
            validator,
        })
    }

    pub fn validator(&self) -> &Validator {
        &self.validator
    }
}

impl fmt::Debug for SchemaDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaDescriptor")
            .field("schema", &self.schema)
            .field("prompt", &self.prompt)
            .finish()
    }
}

#[derive(Deserialize)]
struct DescriptorBody {
    schema: Value,
    prompt: String,
}

#[derive(Debug, Error)]
pub enum SchemaFetchError {
    #[error("schema endpoint blocked: {0}")]
    Blocked(String),

    #[error("schema endpoint request failed: {0}")]
    Transport(String),

    #[error("schema endpoint timed out after {0}ms")]
    Timeout(u64),

    #[error("schema endpoint returned HTTP {0}")]
    Status(u16),

    #[error("malformed schema descriptor: {0}")]
    Malformed(String),
}

impl SchemaFetchError {
    pub fn is_retryable(&self) -> bool {
        match self {
            SchemaFetchError::Transport(_) | SchemaFetchError::Timeout(_) => true,
            SchemaFetchError::Status(status) => *status == 429 || *status >= 500,
            SchemaFetchError::Blocked(_) | SchemaFetchError::Malformed(_) => false,
        }
    }

    pub fn http_status(&self) -> Option<u16> {
        match self {
            SchemaFetchError::Status(status) => Some(*status),
            _ => None,
        }
    }
}

/// Fetches descriptors over HTTP, retrying transient failures.
pub struct HttpSchemaFetcher {
    client: Client,
    timeout: Duration,
    max_attempts: u32,
    backoff: BackoffConfig,
    validator: Option<UrlValidator>,
}

impl HttpSchemaFetcher {
    pub fn new(timeout: Duration) -> Result<Self, SchemaFetchError> {
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()
            .map_err(|e| SchemaFetchError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            timeout,
            max_attempts: 3,
            backoff: BackoffConfig::default(),
            validator: None,
        })
    }

    pub fn with_retries(mut self, max_attempts: u32, backoff: BackoffConfig) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.backoff = backoff;
        self
    }

    /// Enforce `validator` on every redirect hop and DNS answer.
    pub fn with_validator(mut self, validator: UrlValidator) -> Result<Self, SchemaFetchError> {
        self.client = guard_client(Client::builder(), &validator)
            .build()
            .map_err(|e| SchemaFetchError::Transport(e.to_string()))?;
        self.validator = Some(validator);
        Ok(self)
    }

    async fn fetch_once(&self, endpoint: &str) -> Result<SchemaDescriptor, SchemaFetchError> {
        let response = self
            .client
            .get(endpoint)
            .header(reqwest::header::ACCEPT, "application/json")
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        if let Some(validator) = &self.validator {
            validator
                .validate_url(response.url())
                .map_err(|e| SchemaFetchError::Blocked(e.to_string()))?;
        }

        let status = response.status();
        if !status.is_success() {
            return Err(SchemaFetchError::Status(status.as_u16()));
        }

        let body = response.bytes().await.map_err(|e| self.transport_error(e))?;
        let body: DescriptorBody = serde_json::from_slice(&body)
            .map_err(|e| SchemaFetchError::Malformed(e.to_string()))?;

        SchemaDescriptor::new(body.schema, body.prompt)
    }

    fn transport_error(&self, e: reqwest::Error) -> SchemaFetchError {
        if let Some(blocked) = blocked_by_guard(&e) {
            SchemaFetchError::Blocked(blocked.to_string())
        } else if e.is_timeout() {
            SchemaFetchError::Timeout(self.timeout.as_millis() as u64)
        } else {
            SchemaFetchError::Transport(e.to_string())
        }
    }
}

#[async_trait]
impl BaseSchemaFetcher for HttpSchemaFetcher {
    async fn fetch(&self, endpoint: &str) -> Result<Arc<SchemaDescriptor>, SchemaFetchError> {
        let mut attempt = 1;
        loop {
            match self.fetch_once(endpoint).await {
                Ok(descriptor) => {
                    debug!(endpoint = %endpoint, attempt, "Schema descriptor fetched");
                    return Ok(Arc::new(descriptor));
                }
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.backoff.delay_for(attempt);
                    warn!(
                        endpoint = %endpoint,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Schema fetch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!(endpoint = %endpoint, attempt, error = %e, "Schema fetch failed");
                    return Err(e);
                }
            }
        }
    }
}

/// Caches descriptors by endpoint URL for a short TTL.
///
/// Failures are never cached.
pub struct CachedSchemaFetcher {
    inner: Arc<dyn BaseSchemaFetcher>,
    cache: Cache<String, Arc<SchemaDescriptor>>,
}

impl CachedSchemaFetcher {
    pub fn new(inner: Arc<dyn BaseSchemaFetcher>, ttl: Duration) -> Self {
        Self {
            inner,
            cache: Cache::builder().max_capacity(1_000).time_to_live(ttl).build(),
        }
    }
}

#[async_trait]
impl BaseSchemaFetcher for CachedSchemaFetcher {
    async fn fetch(&self, endpoint: &str) -> Result<Arc<SchemaDescriptor>, SchemaFetchError> {
        if let Some(descriptor) = self.cache.get(endpoint).await {
            debug!(endpoint = %endpoint, "Schema descriptor cache hit");
            return Ok(descriptor);
        }

        let descriptor = self.inner.fetch(endpoint).await?;
        self.cache
            .insert(endpoint.to_string(), descriptor.clone())
            .await;
        Ok(descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::test_dependencies::MockSchemaFetcher;
    use serde_json::json;

    #[test]
    fn test_descriptor_rejects_bad_schema() {
        let err = SchemaDescriptor::new(json!({"type": 42}), "p").unwrap_err();
        assert!(matches!(err, SchemaFetchError::Malformed(_)));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(SchemaFetchError::Status(502).is_retryable());
        assert!(SchemaFetchError::Timeout(10).is_retryable());
        assert!(!SchemaFetchError::Status(404).is_retryable());
        assert!(!SchemaFetchError::Malformed("x".into()).is_retryable());
    }

    #[tokio::test]
    async fn test_blocked_redirect_hop_is_not_requested() {
        use axum::response::Redirect;
        use axum::routing::get;
        use axum::{Json, Router};
        use std::sync::atomic::{AtomicUsize, Ordering};

        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let internal = Router::new().route(
            "/schema",
            get(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Json(json!({"schema": {"type": "object"}, "prompt": "Extract."}))
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.2:0").await.unwrap();
        let internal_addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, internal).await.unwrap() });

        let target = format!("http://{}/schema", internal_addr);
        let public = Router::new().route(
            "/schema",
            get(move || async move { Redirect::temporary(&target) }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let public_addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, public).await.unwrap() });

        let fetcher = HttpSchemaFetcher::new(Duration::from_secs(5))
            .unwrap()
            .with_validator(UrlValidator::new().allow_host("127.0.0.1"))
            .unwrap();

        let err = fetcher
            .fetch(&format!("http://{}/schema", public_addr))
            .await
            .unwrap_err();

        assert!(matches!(err, SchemaFetchError::Blocked(_)));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cache_hits_skip_inner_fetcher() {
        let inner = Arc::new(
            MockSchemaFetcher::new()
                .with_schema("https://s.example/a", json!({"type": "object"}), "Extract."),
        );
        let cached = CachedSchemaFetcher::new(inner.clone(), Duration::from_secs(60));

        cached.fetch("https://s.example/a").await.unwrap();
        cached.fetch("https://s.example/a").await.unwrap();

        assert_eq!(inner.call_count(), 1);
    }

    #[tokio::test]
    async fn test_cache_does_not_keep_failures() {
        let inner = Arc::new(MockSchemaFetcher::new());
        let cached = CachedSchemaFetcher::new(inner.clone(), Duration::from_secs(60));

        assert!(cached.fetch("https://s.example/missing").await.is_err());
        assert!(cached.fetch("https://s.example/missing").await.is_err());

        assert_eq!(inner.call_count(), 2);
    }
}
