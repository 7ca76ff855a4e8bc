//! Advisory Request Handler
//!
//! Validates the advisory input, renders the prompt, asks the configured
//! backend for text under a [`GenerationPolicy`], and hands whatever comes
//! back to [`recovery::recover`].

pub mod prompt;
pub mod recovery;

pub use prompt::{AdvisoryFacts, Figure, REQUIRED_FIELDS};
pub use recovery::{recover, Strategy};

use serde_json::Value;
use thiserror::Error;

use crate::llm::{GenerationPolicy, LlmBackend, UpstreamError};
use crate::request::{self, FieldError};
use crate::types::AdvisoryResult;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdvisoryError {
    #[error(transparent)]
    Validation(#[from] FieldError),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

/// Produce an advisory for one module's simulated economics.
pub async fn advise(
    backend: &dyn LlmBackend,
    policy: &GenerationPolicy,
    body: &Value,
) -> Result<AdvisoryResult, AdvisoryError> {
    let facts = AdvisoryFacts::from_request(request::as_object(body)?)?;
    tracing::debug!(module = %facts.module_name, address = %facts.address, "advisory requested");

    let text = policy.generate(backend, &facts.prompt()).await?;
    Ok(recover(&text))
}
