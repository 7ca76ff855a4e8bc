//! System-wide default constants.
//!
//! Grouped by subsystem for easy discovery.

// ============================================================================
// Tariff
// ============================================================================

/// Base feed-in rate (NTD/kWh) when no capacity tier matches.
pub const DEFAULT_FIT_RATE: f64 = 3.5;

/// Efficiency levels that earn a tier's high-efficiency rate.
pub const HIGH_EFFICIENCY_LEVELS: [&str; 2] = ["非常高效", "高效"];

/// Decimal places kept on a resolved rate.
pub const RATE_DECIMALS: i32 = 4;

// ============================================================================
// Recommendation shaping
// ============================================================================

/// Formula fields that belong to the advisory path and are never evaluated
/// by the recommendation builder.
pub const ADVISORY_FIELDS: [&str; 3] = ["final_recommendation", "score", "explanation_text"];

/// Years covered by the cash-flow projection.
pub const PROJECTION_YEARS: u32 = 20;

// ============================================================================
// Files
// ============================================================================

/// Settings file looked up in the working directory.
pub const SETTINGS_FILE: &str = "solar_advisor.toml";

/// Env var naming an explicit settings file.
pub const SETTINGS_ENV: &str = "SOLAR_ADVISOR_CONFIG";

/// Catalog directory used when settings do not name one.
pub const CATALOG_DIR: &str = "./solar_config";

// ============================================================================
// Server
// ============================================================================

pub const SERVER_ADDR: &str = "0.0.0.0:5001";

/// Env var overriding `server.addr`.
pub const SERVER_ADDR_ENV: &str = "SOLAR_ADVISOR_ADDR";

/// Request bodies above this size are rejected (bytes).
pub const MAX_BODY_BYTES: usize = 64 * 1024;

// ============================================================================
// Text generation
// ============================================================================

pub const LLM_MODEL: &str = "gemini-2.0-flash";

pub const LLM_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Env var carrying the Gemini API key.
pub const LLM_API_KEY_ENV: &str = "GOOGLE_API_KEY";

/// Per-attempt generation timeout (seconds).
pub const LLM_TIMEOUT_SECS: u64 = 30;

/// One attempt: a generation call is not retried unless configured.
pub const LLM_MAX_ATTEMPTS: u32 = 1;

/// Pause between retry attempts (milliseconds).
pub const LLM_RETRY_BACKOFF_MS: u64 = 500;
