//! Gemini `generateContent` backend over HTTPS.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::LlmBackend;
use crate::config::LlmSettings;

/// Gemini client errors
#[derive(Debug, thiserror::Error)]
pub enum GeminiError {
    #[error("GOOGLE_API_KEY is not set")]
    MissingApiKey,
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Gemini returned status {status}: {message}")]
    Status {
        status: reqwest::StatusCode,
        message: String,
    },
    #[error("Gemini response contained no text")]
    EmptyResponse,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: [RequestPart<'a>; 1],
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// HTTP client for one Gemini model.
#[derive(Clone)]
pub struct GeminiBackend {
    http: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl std::fmt::Debug for GeminiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiBackend")
            .field("url", &self.url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl GeminiBackend {
    /// Build a client for `settings.model`. The per-call timeout is enforced
    /// by the generation policy, not here.
    pub fn new(settings: &LlmSettings, api_key: Option<String>) -> Result<Self, GeminiError> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            url: format!(
                "{}/models/{}:generateContent",
                settings.endpoint.trim_end_matches('/'),
                settings.model
            ),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    async fn generate_content(&self, prompt: &str) -> Result<String, GeminiError> {
        let key = self.api_key.as_deref().ok_or(GeminiError::MissingApiKey)?;
        let body = GenerateRequest {
            contents: [Content {
                parts: [RequestPart { text: prompt }],
            }],
        };

        let resp = self
            .http
            .post(&self.url)
            .header("x-goog-api-key", key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let raw = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorEnvelope>(&raw)
                .map(|e| e.error.message)
                .unwrap_or(raw);
            return Err(GeminiError::Status { status, message });
        }

        let parsed: GenerateResponse = resp.json().await?;
        extract_text(parsed).ok_or(GeminiError::EmptyResponse)
    }
}

/// Concatenated text parts of the first candidate.
fn extract_text(response: GenerateResponse) -> Option<String> {
    let content = response.candidates.into_iter().next()?.content?;
    let text: String = content.parts.into_iter().map(|p| p.text).collect();
    (!text.is_empty()).then_some(text)
}

#[async_trait]
impl LlmBackend for GeminiBackend {
    async fn generate(&self, prompt: &str) -> anyhow::Result<String> {
        tracing::debug!(url = %self.url, prompt_chars = prompt.chars().count(), "Gemini request");
        Ok(self.generate_content(prompt).await?)
    }

    fn backend_name(&self) -> &'static str {
        "gemini"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_shape() {
        let body = GenerateRequest {
            contents: [Content {
                parts: [RequestPart { text: "hi" }],
            }],
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({"contents": [{"parts": [{"text": "hi"}]}]})
        );
    }

    #[test]
    fn test_extract_text_joins_parts() {
        let resp: GenerateResponse = serde_json::from_str(
            r#"{"candidates": [{"content": {"parts": [{"text": "{\"a\":"}, {"text": "1}"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(extract_text(resp).as_deref(), Some("{\"a\":1}"));
    }

    #[test]
    fn test_extract_text_empty() {
        let resp: GenerateResponse = serde_json::from_str(r#"{"candidates": []}"#).unwrap();
        assert!(extract_text(resp).is_none());
        let resp: GenerateResponse = serde_json::from_str(r#"{}"#).unwrap();
        assert!(extract_text(resp).is_none());
    }

    #[test]
    fn test_url_from_settings() {
        let mut settings = LlmSettings::default();
        settings.endpoint = "https://example.test/v1beta/".into();
        let backend = GeminiBackend::new(&settings, Some("k".into())).unwrap();
        assert_eq!(
            backend.url(),
            "https://example.test/v1beta/models/gemini-2.0-flash:generateContent"
        );
        assert!(backend.has_api_key());
    }

    #[tokio::test]
    async fn test_missing_key_fails_without_network() {
        let backend = GeminiBackend::new(&LlmSettings::default(), Some("  ".into())).unwrap();
        let err = backend.generate("x").await.unwrap_err();
        assert!(err.to_string().contains("GOOGLE_API_KEY"));
    }
}
