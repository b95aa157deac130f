//! OpenAI implementation of [`BaseAI`].

use async_trait::async_trait;
use openai_client::{Message, OpenAIClient, StructuredRequest};

use super::BaseAI;

pub struct OpenAIAdapter {
    client: OpenAIClient,
    model: String,
}

impl OpenAIAdapter {
    pub fn new(client: OpenAIClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl BaseAI for OpenAIAdapter {
    async fn generate_structured(
        &self,
        messages: &[Message],
        schema: &serde_json::Value,
    ) -> openai_client::Result<String> {
        let request =
            StructuredRequest::from_messages(&self.model, messages.to_vec(), schema.clone());
        self.client.structured_output(request).await
    }
}
