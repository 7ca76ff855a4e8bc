//! Per-module recommendation output.

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

/// One year of the cumulative cash-flow projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectionPoint {
    pub year: u32,
    /// Cumulative net position in NTD: negative until payback.
    pub value: i64,
}

/// Shaped economics for one candidate module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationResult {
    // Identity, copied from the module
    pub module_name: String,
    pub brand: String,
    #[serde(rename = "type")]
    pub module_type: String,
    pub efficiency_percent: Number,
    pub efficiency_level: String,

    // Computed metrics
    /// Installed capacity (kW), 2 decimals.
    pub capacity_kw: f64,
    /// Daily yield per installed kW (kWh), 2 decimals.
    pub daily_kwh_per_kw: f64,
    pub annual_generation_kwh: i64,
    /// Incentive rate after region bonus (NTD/kWh), 4 decimals.
    pub fit_rate_total: f64,
    pub annual_revenue_ntd: i64,
    pub install_cost_ntd: i64,
    /// 1 decimal.
    pub payback_years: f64,
    /// Whatever the formula produced, passed through.
    pub environmental_benefit: Value,

    pub investment_projection_20yr: Vec<ProjectionPoint>,
}

/// Response body of the recommend endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationResponse {
    pub recommendations: Vec<RecommendationResult>,
}
