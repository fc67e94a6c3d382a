//! Text generation collaborator
//!
//! Nodes talk to a language model only through [`TextGenerator`]. Providers
//! that can only produce free text are wrapped in [`SchemaCheckedGenerator`],
//! which turns a text reply into a JSON value validated against the schema
//! the caller asked for.

use crate::state::Message;
use async_trait::async_trait;
use gategraph_core::GraphError;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by a [`TextGenerator`]
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GenerationError {
    /// The provider could not be reached or refused the request
    #[error("Provider error: {0}")]
    Provider(String),

    /// The reply was not valid JSON
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The reply parsed but did not match the requested schema
    #[error("Schema violation: {}", .0.join("; "))]
    SchemaViolation(Vec<String>),

    /// The requested schema itself could not be compiled
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),
}

impl From<GenerationError> for GraphError {
    fn from(err: GenerationError) -> Self {
        GraphError::Generation(err.to_string())
    }
}

/// Language-model backend used by the negotiation nodes
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Free-form reply to `messages`
    async fn generate_text(
        &self,
        messages: &[Message],
        system_prompt: Option<&str>,
    ) -> Result<String, GenerationError>;

    /// Reply that conforms to the JSON `schema`
    async fn generate_structured(
        &self,
        messages: &[Message],
        schema: &Value,
        system_prompt: Option<&str>,
    ) -> Result<Value, GenerationError>;
}

/// Structured output on top of a text-only generator
///
/// `generate_structured` asks the inner generator for text, strips a
/// Markdown code fence if the model added one, parses the rest as JSON and
/// validates it against the schema.
pub struct SchemaCheckedGenerator {
    inner: Arc<dyn TextGenerator>,
}

impl SchemaCheckedGenerator {
    pub fn new(inner: Arc<dyn TextGenerator>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl TextGenerator for SchemaCheckedGenerator {
    async fn generate_text(
        &self,
        messages: &[Message],
        system_prompt: Option<&str>,
    ) -> Result<String, GenerationError> {
        self.inner.generate_text(messages, system_prompt).await
    }

    async fn generate_structured(
        &self,
        messages: &[Message],
        schema: &Value,
        system_prompt: Option<&str>,
    ) -> Result<Value, GenerationError> {
        let instruction = format!(
            "Respond only with a JSON object matching this schema:\n{}",
            schema
        );
        let system_prompt = match system_prompt {
            Some(prompt) => format!("{}\n\n{}", prompt, instruction),
            None => instruction,
        };

        let reply = self
            .inner
            .generate_text(messages, Some(&system_prompt))
            .await?;
        let value: Value = serde_json::from_str(strip_code_fence(&reply))
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;

        validate_against_schema(&value, schema)?;
        Ok(value)
    }
}

/// Remove a surrounding Markdown code fence, tagged `json` or untagged
pub fn strip_code_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(body) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = body.strip_prefix("json").unwrap_or(body);
    body.strip_suffix("```").unwrap_or(body).trim()
}

/// Check `value` against a JSON schema
pub fn validate_against_schema(value: &Value, schema: &Value) -> Result<(), GenerationError> {
    use jsonschema::JSONSchema;

    let compiled = JSONSchema::compile(schema)
        .map_err(|e| GenerationError::InvalidSchema(e.to_string()))?;

    // Collect while `compiled` is alive; the error iterator borrows it
    let violations = match compiled.validate(value) {
        Ok(()) => None,
        Err(errors) => Some(
            errors
                .map(|e| format!("{}: {}", e.instance_path, e))
                .collect::<Vec<String>>(),
        ),
    };

    match violations {
        Some(messages) => {
            tracing::warn!(errors = ?messages, "structured output failed schema validation");
            Err(GenerationError::SchemaViolation(messages))
        }
        None => Ok(()),
    }
}
