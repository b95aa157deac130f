// TestDependencies - mock implementations for testing
//
// Provides mock services that can be injected into ServerDeps for tests.

use async_trait::async_trait;
use openai_client::{Message, OpenAIError};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use extraction::testing::MockExtractor;
use extraction::{ContentExtractor, ExtractorConfig};

use super::{BaseAI, BaseSchemaFetcher, ServerDeps};
use crate::domains::parsing::{SchemaDescriptor, SchemaFetchError};
use crate::kernel::jobs::MemoryJobStore;

// =============================================================================
// Mock AI
// =============================================================================

/// Queued model responses. Once the queue is drained every call returns
/// the fallback response, if one is set, or a server error.
pub struct MockAI {
    responses: Arc<Mutex<VecDeque<Result<String, OpenAIError>>>>,
    fallback: Option<String>,
    delay: Option<Duration>,
    calls: Arc<Mutex<Vec<Vec<Message>>>>,
}

impl MockAI {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::new())),
            fallback: None,
            delay: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Queue a raw completion.
    pub fn with_response(self, raw: &str) -> Self {
        self.responses.lock().unwrap().push_back(Ok(raw.to_string()));
        self
    }

    /// Queue a provider error.
    pub fn with_error(self, error: OpenAIError) -> Self {
        self.responses.lock().unwrap().push_back(Err(error));
        self
    }

    /// Response used after the queue is drained.
    pub fn with_fallback(mut self, raw: &str) -> Self {
        self.fallback = Some(raw.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Conversations sent to the model, one entry per call.
    pub fn calls(&self) -> Vec<Vec<Message>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl Default for MockAI {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseAI for MockAI {
    async fn generate_structured(
        &self,
        messages: &[Message],
        _schema: &Value,
    ) -> openai_client::Result<String> {
        self.calls.lock().unwrap().push(messages.to_vec());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let queued = self.responses.lock().unwrap().pop_front();
        match queued {
            Some(result) => result,
            None => self.fallback.clone().ok_or_else(|| OpenAIError::Api {
                status: 500,
                message: "no mock response queued".to_string(),
            }),
        }
    }
}

// =============================================================================
// Mock Schema Fetcher
// =============================================================================

pub struct MockSchemaFetcher {
    schemas: Arc<Mutex<HashMap<String, (Value, String)>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockSchemaFetcher {
    pub fn new() -> Self {
        Self {
            schemas: Arc::new(Mutex::new(HashMap::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Serve `schema` and `prompt` at `endpoint`. Unknown endpoints fail
    /// like an unreachable host.
    pub fn with_schema(self, endpoint: &str, schema: Value, prompt: &str) -> Self {
        self.schemas
            .lock()
            .unwrap()
            .insert(endpoint.to_string(), (schema, prompt.to_string()));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl Default for MockSchemaFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseSchemaFetcher for MockSchemaFetcher {
    async fn fetch(&self, endpoint: &str) -> Result<Arc<SchemaDescriptor>, SchemaFetchError> {
        self.calls.lock().unwrap().push(endpoint.to_string());

        let entry = self.schemas.lock().unwrap().get(endpoint).cloned();
        match entry {
            Some((schema, prompt)) => Ok(Arc::new(SchemaDescriptor::new(schema, prompt)?)),
            None => Err(SchemaFetchError::Transport(format!(
                "connection refused: {}",
                endpoint
            ))),
        }
    }
}

// =============================================================================
// TestDependencies
// =============================================================================

/// Wires mocks into a [`ServerDeps`] with an in-memory store.
pub struct TestDependencies {
    pub dom: Arc<MockExtractor>,
    pub headless: Arc<MockExtractor>,
    pub ai: Arc<MockAI>,
    pub schemas: Arc<MockSchemaFetcher>,
    pub store: Arc<MemoryJobStore>,
}

impl TestDependencies {
    pub fn new() -> Self {
        Self {
            dom: Arc::new(MockExtractor::dom()),
            headless: Arc::new(MockExtractor::headless()),
            ai: Arc::new(MockAI::new()),
            schemas: Arc::new(MockSchemaFetcher::new()),
            store: Arc::new(MemoryJobStore::new()),
        }
    }

    pub fn with_dom(mut self, dom: MockExtractor) -> Self {
        self.dom = Arc::new(dom);
        self
    }

    pub fn with_headless(mut self, headless: MockExtractor) -> Self {
        self.headless = Arc::new(headless);
        self
    }

    pub fn with_ai(mut self, ai: MockAI) -> Self {
        self.ai = Arc::new(ai);
        self
    }

    pub fn with_schemas(mut self, schemas: MockSchemaFetcher) -> Self {
        self.schemas = Arc::new(schemas);
        self
    }

    /// Build server dependencies backed by these mocks.
    pub fn into_server_deps(&self) -> ServerDeps {
        let extractor = ContentExtractor::new(self.dom.clone())
            .with_headless(self.headless.clone())
            .with_config(ExtractorConfig::default());

        ServerDeps::new(
            self.store.clone(),
            Arc::new(extractor),
            self.ai.clone(),
            self.schemas.clone(),
        )
    }
}

impl Default for TestDependencies {
    fn default() -> Self {
        Self::new()
    }
}
