//! Solar Advisor: rooftop solar economics estimator
//!
//! Turns a roof description into per-module installation economics and,
//! on request, a generated install/hold advisory.
//!
//! ## Architecture
//!
//! - **Formula Engine**: restricted expression language evaluated over a
//!   layered context, configured entirely from `formulas.json`
//! - **Tariff**: tiered feed-in rate lookup with regional bonuses
//! - **Recommend**: one formula pass per catalog module, shaped into records
//! - **Advisory**: prompt rendering plus recovery of a JSON object from
//!   free-form model output
//! - **LLM Module**: pluggable text-generation backends behind a retry policy
//! - **API**: Axum router exposing the above over JSON

pub mod advisory;
pub mod api;
pub mod config;
pub mod formula;
pub mod llm;
pub mod recommend;
pub mod request;
pub mod tariff;
pub mod types;

// Re-export configuration
pub use config::{AppSettings, Catalog, ConfigError};

// Re-export commonly used types
pub use types::{AdvisoryResult, Module, ProjectionPoint, RecommendationResult};

// Re-export the evaluation pipeline
pub use advisory::{advise, recover};
pub use formula::{evaluate, EvaluationContext, FormulaSet, Value};
pub use recommend::recommend;
pub use tariff::RateSchedule;

// Re-export LLM components
pub use llm::{create_backend, GenerationPolicy, LlmBackend};
