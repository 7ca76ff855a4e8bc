//! One place where domain errors become HTTP responses.
//!
//! Every error body has the same shape: `{ "error": "<message>" }`.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::advisory::AdvisoryError;
use crate::recommend::RecommendError;
use crate::request::FieldError;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// An error ready to be sent to the client.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, error = %self.message, "request failed");
        } else {
            tracing::debug!(status = %self.status, error = %self.message, "request rejected");
        }
        (self.status, Json(ErrorBody { error: self.message })).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(format!("Invalid JSON body: {}", rejection.body_text()))
    }
}

impl From<FieldError> for ApiError {
    fn from(e: FieldError) -> Self {
        Self::bad_request(e.to_string())
    }
}

impl From<RecommendError> for ApiError {
    fn from(e: RecommendError) -> Self {
        match e {
            RecommendError::Validation(e) => e.into(),
            other => Self::new(StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
        }
    }
}

impl From<AdvisoryError> for ApiError {
    fn from(e: AdvisoryError) -> Self {
        match e {
            AdvisoryError::Validation(e) => e.into(),
            AdvisoryError::Upstream(e) => Self::new(StatusCode::BAD_GATEWAY, e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::UpstreamError;

    async fn body_of(resp: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_error_response_shape() {
        let resp = ApiError::bad_request("Missing field: address").into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_of(resp).await,
            serde_json::json!({"error": "Missing field: address"})
        );
    }

    #[test]
    fn test_status_mapping() {
        let e: ApiError = RecommendError::Metric {
            field: "capacity_kw".into(),
            message: "x".into(),
        }
        .into();
        assert_eq!(e.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(e.message().starts_with("formula evaluation error: "));

        let e: ApiError = RecommendError::Validation(FieldError::Missing("address".into())).into();
        assert_eq!(e.status(), StatusCode::BAD_REQUEST);

        let e: ApiError = AdvisoryError::Upstream(UpstreamError {
            attempts: 1,
            last_error: "timed out".into(),
        })
        .into();
        assert_eq!(e.status(), StatusCode::BAD_GATEWAY);
    }
}
