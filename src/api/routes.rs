//! API route definitions
//!
//! - POST /api/recommend - per-module economics
//! - POST /api/llm_decision - generated install/hold advice
//! - GET  /api/modules - the module catalog

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{self, AppState};

/// Routes nested under `/api`.
pub fn api_routes(state: AppState) -> Router {
    Router::new()
        .route("/recommend", post(handlers::recommend))
        .route("/llm_decision", post(handlers::llm_decision))
        .route("/modules", get(handlers::modules))
        .with_state(state)
}

/// Root-level aliases and the health check.
pub fn legacy_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/recommend", post(handlers::recommend))
        .route("/llm_decision", post(handlers::llm_decision))
        .with_state(state)
}
