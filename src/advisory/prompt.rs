//! Prompt template for the install/hold advisory.

use std::fmt::{self, Write};

use serde_json::{Map, Value};

use crate::formula::round_to;
use crate::request::{self, FieldError};

/// Fields the advisory request must carry, in check order.
pub const REQUIRED_FIELDS: [&str; 9] = [
    "module_name",
    "efficiency_percent",
    "efficiency_level",
    "capacity_kw",
    "address",
    "annual_generation_kwh",
    "install_cost_ntd",
    "annual_revenue_ntd",
    "payback_years",
];

/// A rounded request number. Integers stay integral, as they were sent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Figure {
    Int(i64),
    Float(f64),
}

impl Figure {
    fn rounded(body: &Map<String, Value>, field: &str, places: i32) -> Result<Self, FieldError> {
        if let Some(i) = body.get(field).and_then(Value::as_i64) {
            return Ok(Self::Int(i));
        }
        Ok(Self::Float(round_to(request::require_number(body, field)?, places)))
    }
}

impl fmt::Display for Figure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x:?}"),
        }
    }
}

/// Validated, rounded facts embedded in the prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct AdvisoryFacts {
    pub module_name: String,
    pub efficiency_percent: String,
    pub efficiency_level: String,
    /// 2 decimals.
    pub capacity_kw: Figure,
    pub address: String,
    pub annual_generation_kwh: i64,
    pub install_cost_ntd: i64,
    pub annual_revenue_ntd: i64,
    /// 1 decimal.
    pub payback_years: Figure,
}

impl AdvisoryFacts {
    /// Presence of every required field is checked first, in
    /// [`REQUIRED_FIELDS`] order; then the numeric ones are type-checked.
    pub fn from_request(body: &Map<String, Value>) -> Result<Self, FieldError> {
        for field in REQUIRED_FIELDS {
            request::require(body, field)?;
        }
        let text = |field: &str| display(&body[field]);
        Ok(Self {
            module_name: text("module_name"),
            efficiency_percent: text("efficiency_percent"),
            efficiency_level: text("efficiency_level"),
            capacity_kw: Figure::rounded(body, "capacity_kw", 2)?,
            address: text("address"),
            annual_generation_kwh: truncate(body, "annual_generation_kwh")?,
            install_cost_ntd: truncate(body, "install_cost_ntd")?,
            annual_revenue_ntd: truncate(body, "annual_revenue_ntd")?,
            payback_years: Figure::rounded(body, "payback_years", 1)?,
        })
    }

    /// Multi-line summary of the simulation for one module.
    pub fn summary(&self) -> String {
        let mut s = String::new();
        // Writing to a String cannot fail.
        let _ = writeln!(s, "模組名稱：{}", self.module_name);
        let _ = writeln!(s, "模組效率：{}%", self.efficiency_percent);
        let _ = writeln!(s, "模組等級：{}", self.efficiency_level);
        let _ = writeln!(s, "裝置容量：{} 瓩", self.capacity_kw);
        let _ = writeln!(s, "地點：{}", self.address);
        let _ = writeln!(s, "年發電量：約 {} 度", self.annual_generation_kwh);
        let _ = writeln!(s, "建置成本：約 {} 元", self.install_cost_ntd);
        let _ = writeln!(s, "年收入：約 {} 元", self.annual_revenue_ntd);
        let _ = writeln!(s, "回本年限：約 {} 年", self.payback_years);
        s
    }

    /// The full prompt sent to the text-generation backend.
    pub fn prompt(&self) -> String {
        format!(
            "你是一位太陽能投資顧問。以下是客戶的模擬數據摘要：\n\
             \n\
             {summary}\n\
             請根據以上內容提供：\n\
             1. final_recommendation（推薦安裝/保守觀望）\n\
             2. score（0~1，代表推薦程度）\n\
             3. explanation_text（一句話說明評估理由）\n\
             \n\
             請以 JSON 格式輸出，如：\n\
             {{\n  \"final_recommendation\": \"...\",\n  \"score\": 0.78,\n  \"explanation_text\": \"...\"\n}}\n",
            summary = self.summary()
        )
    }
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn truncate(body: &Map<String, Value>, field: &str) -> Result<i64, FieldError> {
    if let Some(i) = body.get(field).and_then(Value::as_i64) {
        return Ok(i);
    }
    let x = request::require_number(body, field)?.trunc();
    if !x.is_finite() || x >= i64::MAX as f64 || x < i64::MIN as f64 {
        return Err(FieldError::NotNumber(field.to_string()));
    }
    Ok(x as i64)
}
