//! Schema-driven structuring of page text via the model provider.
//!
//! ```text
//! prompt ─► model ──(transport/5xx: backoff + retry)──► raw JSON
//!                                                        │
//!                               valid ◄── validate ──────┘
//!                                            │ invalid
//!                        corrective re-prompt (once) ─► validate ─► valid | SchemaValidationFailed
//! ```

use openai_client::{truncate_to_char_boundary, Message};
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::prompts;
use super::schema::SchemaDescriptor;
use super::validation;
use crate::kernel::backoff::BackoffConfig;
use crate::kernel::BaseAI;

#[derive(Debug, Clone)]
pub struct StructurerConfig {
    /// Attempts per model call for retryable provider errors
    pub max_attempts: u32,
    pub backoff: BackoffConfig,
    /// Page text beyond this many bytes is cut before prompting
    pub max_input_bytes: usize,
}

impl Default for StructurerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffConfig::default(),
            max_input_bytes: 100_000,
        }
    }
}

#[derive(Debug, Error)]
pub enum StructureError {
    #[error("model call failed after {attempts} attempt(s): {message}")]
    LlmFailure {
        attempts: u32,
        message: String,
        last_output: Option<String>,
    },

    #[error("model output failed schema validation: {}", errors.join("; "))]
    ValidationFailed {
        errors: Vec<String>,
        last_output: String,
    },
}

impl StructureError {
    /// Diagnostics for the job record, including the last raw output.
    pub fn details(&self) -> Value {
        match self {
            StructureError::LlmFailure {
                attempts,
                last_output,
                ..
            } => json!({
                "attempts": attempts,
                "last_output": last_output,
            }),
            StructureError::ValidationFailed {
                errors,
                last_output,
            } => json!({
                "validation_errors": errors,
                "last_output": last_output,
            }),
        }
    }
}

pub struct Structurer {
    ai: Arc<dyn BaseAI>,
    config: StructurerConfig,
}

impl Structurer {
    pub fn new(ai: Arc<dyn BaseAI>) -> Self {
        Self {
            ai,
            config: StructurerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: StructurerConfig) -> Self {
        self.config = config;
        self
    }

    /// Turn page text into JSON that validates against `descriptor`.
    pub async fn structure(
        &self,
        content: &str,
        descriptor: &SchemaDescriptor,
    ) -> Result<Value, StructureError> {
        let content = truncate_to_char_boundary(content, self.config.max_input_bytes);
        let mut messages = vec![
            Message::system(prompts::system_prompt(&descriptor.prompt, &descriptor.schema)),
            Message::user(prompts::user_prompt(content)),
        ];

        let raw = self.complete(&messages, &descriptor.schema, None).await?;
        let errors = match validation::check_output(descriptor.validator(), &raw) {
            Ok(value) => {
                debug!(output_bytes = raw.len(), "Model output validated");
                return Ok(value);
            }
            Err(errors) => errors,
        };

        warn!(
            errors = errors.len(),
            first_error = %errors[0],
            "Model output invalid, re-prompting with corrections"
        );
        messages.push(Message::assistant(raw.clone()));
        messages.push(Message::user(prompts::correction_prompt(&errors)));

        let corrected = self.complete(&messages, &descriptor.schema, Some(raw)).await?;
        match validation::check_output(descriptor.validator(), &corrected) {
            Ok(value) => {
                info!("Corrective re-prompt produced valid output");
                Ok(value)
            }
            Err(errors) => Err(StructureError::ValidationFailed {
                errors,
                last_output: corrected,
            }),
        }
    }

    /// One logical model call with bounded retries for transient errors.
    async fn complete(
        &self,
        messages: &[Message],
        schema: &Value,
        previous_output: Option<String>,
    ) -> Result<String, StructureError> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.ai.generate_structured(messages, schema).await {
                Ok(raw) => return Ok(raw),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = self.config.backoff.delay_for(attempt);
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Model call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Model call failed");
                    return Err(StructureError::LlmFailure {
                        attempts: attempt,
                        message: e.to_string(),
                        last_output: previous_output,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::test_dependencies::MockAI;
    use openai_client::OpenAIError;
    use std::time::Duration;

    fn descriptor() -> SchemaDescriptor {
        SchemaDescriptor::new(
            json!({
                "type": "object",
                "properties": {"title": {"type": "string"}},
                "required": ["title"]
            }),
            "Extract the page title.",
        )
        .unwrap()
    }

    fn structurer(ai: Arc<MockAI>) -> Structurer {
        Structurer::new(ai).with_config(StructurerConfig {
            max_attempts: 3,
            backoff: BackoffConfig {
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
                multiplier: 2.0,
            },
            max_input_bytes: 64,
        })
    }

    fn server_error() -> OpenAIError {
        OpenAIError::Api {
            status: 500,
            message: "upstream".into(),
        }
    }

    #[tokio::test]
    async fn test_valid_first_response() {
        let ai = Arc::new(MockAI::new().with_response(r#"{"title": "Hello"}"#));
        let value = structurer(ai.clone())
            .structure("Hello world", &descriptor())
            .await
            .unwrap();

        assert_eq!(value, json!({"title": "Hello"}));
        assert_eq!(ai.call_count(), 1);
    }

    #[tokio::test]
    async fn test_retries_transient_errors() {
        let ai = Arc::new(
            MockAI::new()
                .with_error(server_error())
                .with_error(OpenAIError::Timeout(30_000))
                .with_response(r#"{"title": "Hello"}"#),
        );
        let value = structurer(ai.clone())
            .structure("Hello world", &descriptor())
            .await
            .unwrap();

        assert_eq!(value["title"], "Hello");
        assert_eq!(ai.call_count(), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_is_llm_failure() {
        let ai = Arc::new(
            MockAI::new()
                .with_error(server_error())
                .with_error(server_error())
                .with_error(server_error()),
        );
        let err = structurer(ai.clone())
            .structure("Hello world", &descriptor())
            .await
            .unwrap_err();

        assert!(matches!(err, StructureError::LlmFailure { attempts: 3, .. }));
        assert_eq!(ai.call_count(), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_error_fails_fast() {
        let ai = Arc::new(MockAI::new().with_error(OpenAIError::Api {
            status: 401,
            message: "bad key".into(),
        }));
        let err = structurer(ai.clone())
            .structure("Hello world", &descriptor())
            .await
            .unwrap_err();

        assert!(matches!(err, StructureError::LlmFailure { attempts: 1, .. }));
        assert_eq!(ai.call_count(), 1);
    }

    #[tokio::test]
    async fn test_corrective_reprompt_recovers() {
        let ai = Arc::new(
            MockAI::new()
                .with_response(r#"{"heading": "Hello"}"#)
                .with_response(r#"{"title": "Hello"}"#),
        );
        let value = structurer(ai.clone())
            .structure("Hello world", &descriptor())
            .await
            .unwrap();

        assert_eq!(value["title"], "Hello");
        let calls = ai.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].len(), 4);
        assert_eq!(calls[1][2].role, "assistant");
        assert!(calls[1][3].content.contains("title"));
    }

    #[tokio::test]
    async fn test_malformed_twice_is_validation_failure() {
        let ai = Arc::new(
            MockAI::new()
                .with_response("{not json")
                .with_response("still {not json"),
        );
        let err = structurer(ai.clone())
            .structure("Hello world", &descriptor())
            .await
            .unwrap_err();

        match &err {
            StructureError::ValidationFailed { last_output, .. } => {
                assert_eq!(last_output, "still {not json");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.details()["last_output"], "still {not json");
    }

    #[tokio::test]
    async fn test_failure_during_correction_keeps_first_output() {
        let ai = Arc::new(
            MockAI::new()
                .with_response("{}")
                .with_error(OpenAIError::Api {
                    status: 400,
                    message: "context length".into(),
                }),
        );
        let err = structurer(ai)
            .structure("Hello world", &descriptor())
            .await
            .unwrap_err();

        assert_eq!(err.details()["last_output"], "{}");
    }

    #[tokio::test]
    async fn test_truncates_long_content() {
        let ai = Arc::new(MockAI::new().with_response(r#"{"title": "x"}"#));
        structurer(ai.clone())
            .structure(&"é".repeat(200), &descriptor())
            .await
            .unwrap();

        let user = &ai.calls()[0][1].content;
        let page_text = user.trim_start_matches("## Page Text\n\n");
        assert!(page_text.len() <= 64);
        assert_eq!(page_text.chars().count(), 32);
    }
}
