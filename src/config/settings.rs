//! Operator settings loaded from TOML.
//!
//! Every field has a default, so an empty or missing file yields a working
//! server with the text-generation backend pointed at Gemini.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use super::defaults;

// ============================================================================
// Top-Level Settings
// ============================================================================

/// Root settings for a deployment.
///
/// Load with [`AppSettings::load`], which searches:
/// 1. an explicit path (the `--config` flag)
/// 2. `$SOLAR_ADVISOR_CONFIG`
/// 3. `./solar_advisor.toml`
/// 4. Built-in defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppSettings {
    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub catalog: CatalogSettings,

    #[serde(default)]
    pub llm: LlmSettings,
}

impl AppSettings {
    /// Load settings using the standard search order.
    ///
    /// A file that exists but fails to read, parse or validate is an error;
    /// only a missing file falls through to the next candidate.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            let settings = Self::load_from_file(path)?;
            info!(path = %path.display(), "Loaded settings from --config");
            return Ok(settings);
        }

        if let Ok(path) = std::env::var(defaults::SETTINGS_ENV) {
            let p = PathBuf::from(&path);
            if p.exists() {
                let settings = Self::load_from_file(&p)?;
                info!(path = %p.display(), "Loaded settings from {}", defaults::SETTINGS_ENV);
                return Ok(settings);
            }
            warn!(path = %path, "{} points to non-existent file, falling back", defaults::SETTINGS_ENV);
        }

        let local = PathBuf::from(defaults::SETTINGS_FILE);
        if local.exists() {
            let settings = Self::load_from_file(&local)?;
            info!("Loaded settings from ./{}", defaults::SETTINGS_FILE);
            return Ok(settings);
        }

        info!("No {} found, using built-in defaults", defaults::SETTINGS_FILE);
        Ok(Self::default())
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Toml(err) => ConfigError::Parse(path.to_path_buf(), err),
            other => other,
        })
    }

    /// Parse and validate settings text. Unknown keys are logged as warnings.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        for w in super::validation::validate_unknown_keys(contents) {
            warn!(field = %w.field, "{}", w);
        }
        let settings: Self = toml::from_str(contents)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Apply `$SOLAR_ADVISOR_ADDR` if set.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(addr) = std::env::var(defaults::SERVER_ADDR_ENV) {
            if !addr.trim().is_empty() {
                self.server.addr = addr.trim().to_string();
            }
        }
    }

    /// Check values serde cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        if self.server.addr.parse::<std::net::SocketAddr>().is_err() {
            errors.push(format!(
                "server.addr = '{}' is not a HOST:PORT socket address",
                self.server.addr
            ));
        }
        for origin in &self.server.cors_origins {
            if origin.parse::<axum::http::HeaderValue>().is_err() {
                errors.push(format!("server.cors_origins: '{origin}' is not a valid header value"));
            }
        }
        if self.catalog.dir.as_os_str().is_empty() {
            errors.push("catalog.dir must not be empty".to_string());
        }
        if self.llm.model.trim().is_empty() {
            errors.push("llm.model must not be empty".to_string());
        }
        if !self.llm.endpoint.starts_with("http://") && !self.llm.endpoint.starts_with("https://") {
            errors.push(format!(
                "llm.endpoint = '{}' must be an http(s) URL",
                self.llm.endpoint
            ));
        }
        if self.llm.timeout_secs == 0 {
            errors.push("llm.timeout_secs must be > 0".to_string());
        }
        if self.llm.max_attempts == 0 {
            errors.push("llm.max_attempts must be >= 1".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config I/O error ({}): {1}", .0.display())]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Config parse error ({}): {1}", .0.display())]
    Parse(PathBuf, #[source] toml::de::Error),

    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Catalog file {} is invalid: {1}", .0.display())]
    Catalog(PathBuf, #[source] serde_json::Error),

    #[error("Formula compile error in {field}: {message}")]
    Formula { field: String, message: String },

    #[error("Config validation failed:\n  - {}", .0.join("\n  - "))]
    Validation(Vec<String>),
}

// ============================================================================
// Server
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// HTTP bind address.
    ///
    /// Can be overridden by `SOLAR_ADVISOR_ADDR` or the `--addr` CLI flag.
    #[serde(default = "default_server_addr")]
    pub addr: String,

    /// Origins allowed to call the API cross-site. Empty allows any origin.
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_server_addr() -> String {
    defaults::SERVER_ADDR.to_string()
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            addr: default_server_addr(),
            cors_origins: Vec::new(),
        }
    }
}

// ============================================================================
// Catalog
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogSettings {
    /// Directory holding `modules.json`, `formulas.json` and the lookup tables.
    #[serde(default = "default_catalog_dir")]
    pub dir: PathBuf,
}

fn default_catalog_dir() -> PathBuf {
    PathBuf::from(defaults::CATALOG_DIR)
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            dir: default_catalog_dir(),
        }
    }
}

// ============================================================================
// Text generation
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmBackendKind {
    #[default]
    Gemini,
    Disabled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    #[serde(default)]
    pub backend: LlmBackendKind,

    #[serde(default = "default_llm_model")]
    pub model: String,

    /// API base URL; the model path is appended.
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,

    /// Per-attempt timeout.
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,

    /// Total attempts including the first.
    #[serde(default = "default_llm_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_llm_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

fn default_llm_model() -> String {
    defaults::LLM_MODEL.to_string()
}

fn default_llm_endpoint() -> String {
    defaults::LLM_ENDPOINT.to_string()
}

const fn default_llm_timeout_secs() -> u64 {
    defaults::LLM_TIMEOUT_SECS
}

const fn default_llm_max_attempts() -> u32 {
    defaults::LLM_MAX_ATTEMPTS
}

const fn default_llm_retry_backoff_ms() -> u64 {
    defaults::LLM_RETRY_BACKOFF_MS
}

impl LlmSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            backend: LlmBackendKind::default(),
            model: default_llm_model(),
            endpoint: default_llm_endpoint(),
            timeout_secs: default_llm_timeout_secs(),
            max_attempts: default_llm_max_attempts(),
            retry_backoff_ms: default_llm_retry_backoff_ms(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
