// Trait definitions for dependency injection
//
// These are INFRASTRUCTURE traits only - no business logic.
// Structuring and job orchestration are domain/kernel code built on these traits.
//
// Naming convention: Base* for trait names (e.g., BaseAI, BaseSchemaFetcher)

use async_trait::async_trait;
use openai_client::Message;
use std::sync::Arc;

use crate::domains::parsing::{SchemaDescriptor, SchemaFetchError};

// =============================================================================
// AI Trait (Infrastructure - schema-constrained completions)
// =============================================================================

#[async_trait]
pub trait BaseAI: Send + Sync {
    /// Generate a completion constrained to `schema`.
    /// Returns the raw completion text; callers parse and validate it.
    async fn generate_structured(
        &self,
        messages: &[Message],
        schema: &serde_json::Value,
    ) -> openai_client::Result<String>;
}

// =============================================================================
// Schema Fetcher Trait (Infrastructure)
// =============================================================================

#[async_trait]
pub trait BaseSchemaFetcher: Send + Sync {
    /// Fetch the `{schema, prompt}` descriptor served at `endpoint`.
    async fn fetch(&self, endpoint: &str) -> Result<Arc<SchemaDescriptor>, SchemaFetchError>;
}
