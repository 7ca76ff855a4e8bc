//! API route handlers

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use super::error::ApiError;
use crate::config::Catalog;
use crate::llm::{GenerationPolicy, LlmBackend};
use crate::types::{AdvisoryResult, Module, RecommendationResponse};

// ============================================================================
// API State
// ============================================================================

/// Shared state for API handlers. Everything here is immutable after
/// startup.
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<Catalog>,
    pub llm: Arc<dyn LlmBackend>,
    pub policy: GenerationPolicy,
}

impl AppState {
    pub fn new(catalog: Arc<Catalog>, llm: Arc<dyn LlmBackend>, policy: GenerationPolicy) -> Self {
        Self {
            catalog,
            llm,
            policy,
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/recommend
pub async fn recommend(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<RecommendationResponse>, ApiError> {
    let Json(body) = body?;
    let recommendations = crate::recommend::recommend(&state.catalog, &body)?;
    tracing::info!(modules = recommendations.len(), "recommendations built");
    Ok(Json(RecommendationResponse { recommendations }))
}

/// POST /api/llm_decision
pub async fn llm_decision(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<AdvisoryResult>, ApiError> {
    let Json(body) = body?;
    let result = crate::advisory::advise(state.llm.as_ref(), &state.policy, &body).await?;
    Ok(Json(result))
}

/// GET /api/modules
pub async fn modules(State(state): State<AppState>) -> Json<Vec<Module>> {
    Json(state.catalog.modules().to_vec())
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub modules: usize,
    pub formulas: usize,
    pub llm_backend: &'static str,
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        modules: state.catalog.modules().len(),
        formulas: state.catalog.formulas().len(),
        llm_backend: state.llm.backend_name(),
    })
}
