//! Server dependencies (using traits for testability)
//!
//! This module provides the central dependency container used by the job
//! orchestrator and the HTTP layer. All external services sit behind trait
//! abstractions so tests can swap in mocks.

use std::sync::Arc;

use extraction::{ContentExtractor, SessionPool};

use crate::kernel::jobs::JobStore;
use crate::kernel::{BaseAI, BaseSchemaFetcher};

// =============================================================================
// ServerDeps
// =============================================================================

#[derive(Clone)]
pub struct ServerDeps {
    pub store: Arc<dyn JobStore>,
    pub extractor: Arc<ContentExtractor>,
    pub ai: Arc<dyn BaseAI>,
    pub schemas: Arc<dyn BaseSchemaFetcher>,
    /// Headless session pool, when headless rendering is configured
    pub headless_pool: Option<Arc<SessionPool>>,
}

impl ServerDeps {
    pub fn new(
        store: Arc<dyn JobStore>,
        extractor: Arc<ContentExtractor>,
        ai: Arc<dyn BaseAI>,
        schemas: Arc<dyn BaseSchemaFetcher>,
    ) -> Self {
        Self {
            store,
            extractor,
            ai,
            schemas,
            headless_pool: None,
        }
    }

    pub fn with_headless_pool(mut self, pool: Arc<SessionPool>) -> Self {
        self.headless_pool = Some(pool);
        self
    }
}
