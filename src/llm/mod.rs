//! LLM Backend Module
//!
//! Text generation for the advisory path.
//!
//! ## Architecture
//!
//! - [`LlmBackend`]: prompt in, one text blob out
//! - [`GeminiBackend`]: Gemini `generateContent` over HTTPS
//! - [`DisabledBackend`]: always fails; used when `llm.backend = "disabled"`
//! - [`GenerationPolicy`]: per-attempt timeout and bounded retry

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

mod gemini;
mod policy;

pub use gemini::{GeminiBackend, GeminiError};
pub use policy::{GenerationPolicy, UpstreamError};

use crate::config::{defaults, LlmBackendKind, LlmSettings};

/// Unified trait for LLM backends
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Generate a response from the LLM given a prompt
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Get the backend name for logging
    fn backend_name(&self) -> &'static str;
}

/// Backend for deployments without text generation.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledBackend;

#[async_trait]
impl LlmBackend for DisabledBackend {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        anyhow::bail!("text generation is disabled (llm.backend = \"disabled\")")
    }

    fn backend_name(&self) -> &'static str {
        "disabled"
    }
}

/// Build the configured backend. The Gemini key is read from
/// `GOOGLE_API_KEY`; a missing key is logged and surfaces per request.
pub fn create_backend(settings: &LlmSettings) -> Result<Arc<dyn LlmBackend>> {
    match settings.backend {
        LlmBackendKind::Disabled => {
            tracing::info!("LLM: disabled, advisory requests will report an upstream error");
            Ok(Arc::new(DisabledBackend))
        }
        LlmBackendKind::Gemini => {
            let key = std::env::var(defaults::LLM_API_KEY_ENV).ok();
            let backend = GeminiBackend::new(settings, key)?;
            if !backend.has_api_key() {
                tracing::warn!("{} is not set; advisory requests will fail", defaults::LLM_API_KEY_ENV);
            }
            tracing::info!(model = %settings.model, url = %backend.url(), "LLM: Gemini backend ready");
            Ok(Arc::new(backend))
        }
    }
}
