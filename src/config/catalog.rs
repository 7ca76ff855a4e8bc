//! The equipment and formula catalog.
//!
//! Loaded once from a directory of JSON files and shared read-only behind an
//! `Arc` for the life of the process:
//!
//! | file                   | contents                                   |
//! |------------------------|--------------------------------------------|
//! | `modules.json`         | candidate modules, in output order         |
//! | `formulas.json`        | ordered `field -> expression` object       |
//! | `city_to_kwh_day.json` | city -> daily yield per kW                 |
//! | `fit_rate_table.json`  | capacity tiers, scanned in order           |
//! | `region_bonus.json`    | city -> bonus ratio                        |

use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::validation::ValidationWarning;
use super::ConfigError;
use crate::formula::{FormulaSet, FormulaSpec, Value};
use crate::tariff::{RateSchedule, RateTier};
use crate::types::Module;

pub const MODULES_FILE: &str = "modules.json";
pub const FORMULAS_FILE: &str = "formulas.json";
pub const CITY_YIELD_FILE: &str = "city_to_kwh_day.json";
pub const RATE_TABLE_FILE: &str = "fit_rate_table.json";
pub const REGION_BONUS_FILE: &str = "region_bonus.json";

/// Name under which the city yield table is visible to formulas.
pub const CITY_YIELD_TABLE: &str = "city_to_kwh_day";

/// Metric fields the recommendation record reads from the formula pass.
pub const METRIC_FIELDS: [&str; 8] = [
    "capacity_kw",
    "daily_kwh_per_kw",
    "annual_generation_kwh",
    "fit_rate_total",
    "annual_revenue_ntd",
    "install_cost_ntd",
    "payback_years",
    "environmental_benefit",
];

/// Immutable catalog shared by every request.
#[derive(Debug, Clone)]
pub struct Catalog {
    modules: Vec<Module>,
    formulas: FormulaSet,
    city_yield: BTreeMap<String, f64>,
    /// `city_yield` pre-converted for binding into contexts.
    city_yield_value: Value,
    rates: RateSchedule,
}

impl Catalog {
    /// Load and validate every catalog file under `dir`.
    pub fn load(dir: &Path) -> Result<Self, ConfigError> {
        let modules: Vec<Module> = read_json(dir, MODULES_FILE)?;
        let spec: FormulaSpec = read_json(dir, FORMULAS_FILE)?;
        let city_yield: BTreeMap<String, f64> = read_json(dir, CITY_YIELD_FILE)?;
        let tiers: Vec<RateTier> = read_json(dir, RATE_TABLE_FILE)?;
        let region_bonus: BTreeMap<String, f64> = read_json(dir, REGION_BONUS_FILE)?;

        let catalog = Self::from_parts(modules, &spec, city_yield, tiers, region_bonus)?;
        for w in catalog.warnings() {
            warn!(field = %w.field, "{}", w);
        }
        info!(
            dir = %dir.display(),
            modules = catalog.modules.len(),
            formulas = catalog.formulas.len(),
            cities = catalog.city_yield.len(),
            tiers = catalog.rates.tiers().len(),
            "Catalog loaded"
        );
        Ok(catalog)
    }

    /// Build from already-parsed parts, compiling formulas and checking
    /// values serde cannot.
    pub fn from_parts(
        modules: Vec<Module>,
        spec: &FormulaSpec,
        city_yield: BTreeMap<String, f64>,
        tiers: Vec<RateTier>,
        region_bonus: BTreeMap<String, f64>,
    ) -> Result<Self, ConfigError> {
        let formulas = FormulaSet::compile(spec).map_err(|e| ConfigError::Formula {
            field: e.field.clone(),
            message: e.source.to_string(),
        })?;

        let mut errors = Vec::new();
        for (i, tier) in tiers.iter().enumerate() {
            let values = [
                Some(tier.min_kw),
                tier.max_kw,
                Some(tier.standard_rate),
                Some(tier.high_efficiency_rate),
            ];
            if values.iter().flatten().any(|v| !v.is_finite() || *v < 0.0) {
                errors.push(format!(
                    "{RATE_TABLE_FILE}[{i}]: values must be finite and non-negative"
                ));
            }
            if let Some(max) = tier.max_kw {
                if max <= tier.min_kw {
                    errors.push(format!(
                        "{RATE_TABLE_FILE}[{i}]: max_kw ({max}) must be > min_kw ({})",
                        tier.min_kw
                    ));
                }
            }
        }
        for (city, bonus) in &region_bonus {
            if !bonus.is_finite() || *bonus <= -1.0 {
                errors.push(format!("{REGION_BONUS_FILE}: bonus for '{city}' must be > -1 (got {bonus})"));
            }
        }
        for (city, kwh) in &city_yield {
            if !kwh.is_finite() || *kwh < 0.0 {
                errors.push(format!("{CITY_YIELD_FILE}: yield for '{city}' must be non-negative (got {kwh})"));
            }
        }
        if !errors.is_empty() {
            return Err(ConfigError::Validation(errors));
        }

        let city_yield_value = Value::map(city_yield.iter().map(|(k, v)| (k.clone(), Value::Float(*v))));
        Ok(Self {
            modules,
            formulas,
            city_yield,
            city_yield_value,
            rates: RateSchedule::new(tiers, region_bonus),
        })
    }

    /// Suspicious but loadable content.
    pub fn warnings(&self) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();

        if self.modules.is_empty() {
            warnings.push(ValidationWarning::new(
                MODULES_FILE,
                "no modules declared; every recommendation will be empty",
            ));
        }
        let mut seen = HashSet::new();
        for m in &self.modules {
            if !seen.insert(m.module_name.as_str()) {
                warnings.push(ValidationWarning::new(
                    MODULES_FILE,
                    format!("module '{}' is declared more than once", m.module_name),
                ));
            }
        }

        for (field, name) in self.formulas.forward_references() {
            warnings.push(ValidationWarning::new(
                format!("{FORMULAS_FILE}.{field}"),
                format!("'{field}' reads '{name}', which is only computed later"),
            ));
        }
        for field in METRIC_FIELDS {
            if self.formulas.get(field).is_none() {
                warnings.push(ValidationWarning::new(
                    FORMULAS_FILE,
                    format!("no formula computes '{field}'; requests must supply it"),
                ));
            }
        }

        for (i, j) in self.rates.overlapping_tiers() {
            warnings.push(ValidationWarning::new(
                RATE_TABLE_FILE,
                format!("tiers {i} and {j} overlap; tier {j} is unreachable inside the overlap"),
            ));
        }

        warnings
    }

    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    pub fn formulas(&self) -> &FormulaSet {
        &self.formulas
    }

    pub fn rates(&self) -> &RateSchedule {
        &self.rates
    }

    /// Daily yield per kW for a city, if listed.
    pub fn daily_yield(&self, city: &str) -> Option<f64> {
        self.city_yield.get(city).copied()
    }

    /// The city yield table as a formula value.
    pub fn city_yield_value(&self) -> &Value {
        &self.city_yield_value
    }
}

fn read_json<T: DeserializeOwned>(dir: &Path, file: &str) -> Result<T, ConfigError> {
    let path: PathBuf = dir.join(file);
    let contents = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io(path.clone(), e))?;
    serde_json::from_str(&contents).map_err(|e| ConfigError::Catalog(path, e))
}
