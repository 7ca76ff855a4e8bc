//! Recommendation Builder
//!
//! For every catalog module: layer tables, module attributes and request
//! fields into an [`EvaluationContext`], run the formula pass, then shape
//! the computed metrics into a [`RecommendationResult`] with fixed rounding
//! and a 20-year cumulative cash-flow projection.
//!
//! A failure in any module aborts the whole batch; no partial list is
//! returned.

use serde_json::{Map, Value as Json};
use thiserror::Error;
use tracing::debug;

use crate::config::defaults::{ADVISORY_FIELDS, PROJECTION_YEARS};
use crate::config::{Catalog, CITY_YIELD_TABLE};
use crate::formula::{
    arity, evaluate, round_to, EvaluationContext, ExprError, FormulaError, FunctionRegistry,
    Scope, Value,
};
use crate::request::{self, FieldError};
use crate::types::{Module, ProjectionPoint, RecommendationResult};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecommendError {
    #[error(transparent)]
    Validation(#[from] FieldError),

    #[error("formula evaluation error: {0}")]
    Evaluation(#[from] FormulaError),

    #[error("formula evaluation error: {field}: {message}")]
    Metric { field: String, message: String },
}

impl RecommendError {
    fn metric(field: &str, message: impl Into<String>) -> Self {
        Self::Metric {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Check the fields every formula set relies on.
pub fn validate_request(body: &Json) -> Result<&Map<String, Json>, FieldError> {
    let object = request::as_object(body)?;
    request::require_number(object, "roof_area_m2")?;
    let coverage = request::require_number(object, "coverage_rate")?;
    if !(0.0..=1.0).contains(&coverage) {
        return Err(FieldError::OutOfRange {
            field: "coverage_rate".to_string(),
            expected: "a value between 0 and 1".to_string(),
        });
    }
    request::require_str(object, "address")?;
    Ok(object)
}

/// Validate a request body and build one result per catalog module, in
/// catalog order.
pub fn recommend(catalog: &Catalog, body: &Json) -> Result<Vec<RecommendationResult>, RecommendError> {
    let fields = validate_request(body)?;
    let address = request::require_str(fields, "address")?;
    catalog
        .modules()
        .iter()
        .map(|module| recommend_module(catalog, module, fields, address))
        .collect()
}

/// Functions visible to formulas for one request.
pub fn function_registry<'a>(catalog: &'a Catalog, address: &'a str) -> FunctionRegistry<'a> {
    let mut functions = FunctionRegistry::with_builtins();
    functions.register("city_kwh_day", move |args| {
        arity("city_kwh_day", args, 1, 2)?;
        let city = args[0].as_str().ok_or_else(|| ExprError::Function {
            function: "city_kwh_day".to_string(),
            message: format!("city must be a string, got {}", args[0].type_name()),
        })?;
        match (catalog.daily_yield(city), args.get(1)) {
            (Some(kwh), _) => Ok(Value::Float(kwh)),
            (None, Some(default)) => Ok(default.clone()),
            (None, None) => Err(ExprError::Function {
                function: "city_kwh_day".to_string(),
                message: format!("no daily yield listed for '{city}'"),
            }),
        }
    });
    catalog.rates().register(&mut functions, address);
    functions
}

/// Run the formula pass for one module and shape the result.
pub fn recommend_module(
    catalog: &Catalog,
    module: &Module,
    fields: &Map<String, Json>,
    address: &str,
) -> Result<RecommendationResult, RecommendError> {
    let mut ctx = EvaluationContext::new(function_registry(catalog, address));
    ctx.bind(Scope::Tables, CITY_YIELD_TABLE, catalog.city_yield_value().clone());
    ctx.bind_json_object(Scope::Module, &module.context_object());
    ctx.bind_json_object(Scope::Request, fields);

    let formulas = catalog
        .formulas()
        .iter()
        .filter(|f| !ADVISORY_FIELDS.contains(&f.field.as_str()));
    let ctx = evaluate(ctx, formulas)?;
    debug!(module = %module.module_name, computed = ctx.computed_fields().len(), "formula pass complete");

    shape(module, &ctx)
}

fn shape(module: &Module, ctx: &EvaluationContext<'_>) -> Result<RecommendationResult, RecommendError> {
    Ok(RecommendationResult {
        module_name: module.module_name.clone(),
        brand: module.brand.clone(),
        module_type: module.module_type.clone(),
        efficiency_percent: module.efficiency_percent.clone(),
        efficiency_level: module.efficiency_level.clone(),
        capacity_kw: round_to(number(ctx, "capacity_kw")?, 2),
        daily_kwh_per_kw: round_to(number(ctx, "daily_kwh_per_kw")?, 2),
        annual_generation_kwh: truncated(ctx, "annual_generation_kwh")?,
        fit_rate_total: round_to(number(ctx, "fit_rate_total")?, 4),
        annual_revenue_ntd: truncated(ctx, "annual_revenue_ntd")?,
        install_cost_ntd: truncated(ctx, "install_cost_ntd")?,
        payback_years: round_to(number(ctx, "payback_years")?, 1),
        environmental_benefit: metric(ctx, "environmental_benefit")?.to_json(),
        investment_projection_20yr: projection(
            number(ctx, "install_cost_ntd")?,
            number(ctx, "annual_revenue_ntd")?,
        )?,
    })
}

/// Cumulative position for years 1..=20: `-install_cost + revenue * year`,
/// from the unrounded metrics, rounded half to even once per year.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
pub fn projection(install_cost_ntd: f64, annual_revenue_ntd: f64) -> Result<Vec<ProjectionPoint>, RecommendError> {
    (1..=PROJECTION_YEARS)
        .map(|year| {
            let value = (-install_cost_ntd + annual_revenue_ntd * f64::from(year)).round_ties_even();
            if !value.is_finite() || value >= i64::MAX as f64 || value < i64::MIN as f64 {
                return Err(RecommendError::metric(
                    "investment_projection_20yr",
                    format!("{value} does not fit an integer"),
                ));
            }
            Ok(ProjectionPoint {
                year,
                value: value as i64,
            })
        })
        .collect()
}

fn metric<'c>(ctx: &'c EvaluationContext<'_>, field: &str) -> Result<&'c Value, RecommendError> {
    ctx.lookup(field)
        .map_err(|_| RecommendError::metric(field, "not computed by any formula or supplied by the request"))
}

fn number(ctx: &EvaluationContext<'_>, field: &str) -> Result<f64, RecommendError> {
    let value = metric(ctx, field)?;
    value
        .as_f64()
        .filter(|x| x.is_finite())
        .ok_or_else(|| RecommendError::metric(field, format!("expected a finite number, got {value}")))
}

/// Integer part, toward zero.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn truncated(ctx: &EvaluationContext<'_>, field: &str) -> Result<i64, RecommendError> {
    if let Some(i) = metric(ctx, field)?.as_int() {
        return Ok(i);
    }
    let x = number(ctx, field)?.trunc();
    if x >= i64::MAX as f64 || x < i64::MIN as f64 {
        return Err(RecommendError::metric(field, format!("{x} does not fit an integer")));
    }
    Ok(x as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::FormulaSpec;
    use crate::tariff::RateTier;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn module(name: &str, level: &str, watt_per_m2: f64, cost_per_kw: f64) -> Module {
        serde_json::from_value(json!({
            "module_name": name,
            "brand": "TestBrand",
            "type": "單晶矽",
            "efficiency_percent": 21,
            "efficiency_level": level,
            "watt_per_m2": watt_per_m2,
            "cost_per_kw": cost_per_kw
        }))
        .unwrap()
    }

    fn formulas() -> Vec<(&'static str, &'static str)> {
        vec![
            ("capacity_kw", "roof_area_m2 * coverage_rate * watt_per_m2 / 1000"),
            ("daily_kwh_per_kw", "city_kwh_day(address, 3.2)"),
            ("annual_generation_kwh", "capacity_kw * daily_kwh_per_kw * 365"),
            ("fit_rate_total", "get_fit_rate(capacity_kw, efficiency_level)"),
            ("annual_revenue_ntd", "annual_generation_kwh * fit_rate_total"),
            ("install_cost_ntd", "capacity_kw * cost_per_kw"),
            ("payback_years", "install_cost_ntd / annual_revenue_ntd if annual_revenue_ntd > 0 else 99"),
            ("environmental_benefit", "round(annual_generation_kwh * 0.509, 1)"),
            ("score", "this_name_is_never_bound"),
        ]
    }

    fn catalog_with(modules: Vec<Module>, pairs: &[(&str, &str)]) -> Catalog {
        let spec = FormulaSpec(
            pairs
                .iter()
                .map(|(f, e)| ((*f).to_string(), (*e).to_string()))
                .collect(),
        );
        Catalog::from_parts(
            modules,
            &spec,
            BTreeMap::from([("台南市".to_string(), 3.6), ("台北市".to_string(), 2.8)]),
            vec![
                RateTier { min_kw: 1.0, max_kw: Some(10.0), standard_rate: 5.7, high_efficiency_rate: 6.0 },
                RateTier { min_kw: 10.0, max_kw: None, standard_rate: 4.5, high_efficiency_rate: 4.8 },
            ],
            BTreeMap::from([("台南市".to_string(), 0.1)]),
        )
        .unwrap()
    }

    fn catalog() -> Catalog {
        catalog_with(
            vec![
                module("HE-400", "高效", 200.0, 60_000.0),
                module("STD-330", "標準", 160.0, 45_000.0),
            ],
            &formulas(),
        )
    }

    fn body(roof: f64, address: &str) -> Json {
        json!({"roof_area_m2": roof, "coverage_rate": 0.5, "address": address})
    }

    #[test]
    fn test_shapes_metrics_for_each_module_in_order() {
        let results = recommend(&catalog(), &body(50.0, "台南市")).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].module_name, "HE-400");
        assert_eq!(results[1].module_name, "STD-330");

        let r = &results[0];
        // 50 * 0.5 * 200 / 1000
        assert_eq!(r.capacity_kw, 5.0);
        assert_eq!(r.daily_kwh_per_kw, 3.6);
        // 5 * 3.6 * 365 = 6570
        assert_eq!(r.annual_generation_kwh, 6570);
        // 6.0 * 1.1
        assert_eq!(r.fit_rate_total, 6.6);
        // 6570 * 6.6 = 43362
        assert_eq!(r.annual_revenue_ntd, 43362);
        assert_eq!(r.install_cost_ntd, 300_000);
        // 300000 / 43362 = 6.918...
        assert_eq!(r.payback_years, 6.9);
        assert_eq!(r.environmental_benefit, json!(3344.1));
        assert_eq!(r.efficiency_percent, serde_json::Number::from(21));
    }

    #[test]
    fn test_projection_uses_unrounded_revenue() {
        for r in recommend(&catalog(), &body(73.3, "台北市")).unwrap() {
            let p = &r.investment_projection_20yr;
            assert_eq!(p.len(), 20);
            for (i, point) in p.iter().enumerate() {
                assert_eq!(point.year, u32::try_from(i + 1).unwrap());
            }
        }

        // revenue 52481.450478533996 against cost 502080.04
        let p = projection(502_080.04, 52_481.450_478_533_996).unwrap();
        assert_eq!(p[0].value, -449_599);
        assert_eq!(p[9].value, 22_734);
        assert_eq!(p[19].value, 547_549);
    }

    #[test]
    fn test_unknown_city_uses_formula_default() {
        let r = &recommend(&catalog(), &body(50.0, "花蓮縣")).unwrap()[0];
        assert_eq!(r.daily_kwh_per_kw, 3.2);
        // no bonus outside listed cities
        assert_eq!(r.fit_rate_total, 6.0);
    }

    #[test]
    fn test_advisory_fields_are_not_evaluated() {
        // The `score` formula names an unbound identifier; the pass still succeeds.
        assert!(recommend(&catalog(), &body(50.0, "台南市")).is_ok());
    }

    #[test]
    fn test_one_failing_module_fails_the_batch() {
        let mut broken = module("BROKEN", "標準", 160.0, 45_000.0);
        broken.attributes.remove("cost_per_kw");
        let catalog = catalog_with(
            vec![module("HE-400", "高效", 200.0, 60_000.0), broken],
            &formulas(),
        );
        let err = recommend(&catalog, &body(50.0, "台南市")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "formula evaluation error: install_cost_ntd: name 'cost_per_kw' is not defined"
        );
    }

    #[test]
    fn test_request_fields_shadow_module_attributes() {
        let mut req = body(50.0, "台南市");
        req["watt_per_m2"] = json!(100);
        let r = &recommend(&catalog(), &req).unwrap()[0];
        assert_eq!(r.capacity_kw, 2.5);
    }

    #[test]
    fn test_missing_metric_is_an_evaluation_error() {
        let pairs: Vec<_> = formulas()
            .into_iter()
            .filter(|(f, _)| *f != "environmental_benefit")
            .collect();
        let catalog = catalog_with(vec![module("HE-400", "高效", 200.0, 60_000.0)], &pairs);
        let err = recommend(&catalog, &body(50.0, "台南市")).unwrap_err();
        assert!(matches!(err, RecommendError::Metric { ref field, .. } if field == "environmental_benefit"));
    }

    #[test]
    fn test_request_validation() {
        let c = catalog();
        let cases = [
            (json!({"coverage_rate": 0.5, "address": "x"}), "Missing field: roof_area_m2"),
            (json!({"roof_area_m2": "50", "coverage_rate": 0.5, "address": "x"}), "Invalid field: roof_area_m2 (expected a number)"),
            (json!({"roof_area_m2": 50, "coverage_rate": 1.5, "address": "x"}), "Invalid field: coverage_rate (expected a value between 0 and 1)"),
            (json!({"roof_area_m2": 50, "coverage_rate": 0.5}), "Missing field: address"),
            (json!({"roof_area_m2": 50, "coverage_rate": 0.5, "address": 7}), "Invalid field: address (expected a string)"),
        ];
        for (req, message) in cases {
            let err = recommend(&c, &req).unwrap_err();
            assert!(matches!(err, RecommendError::Validation(_)));
            assert_eq!(err.to_string(), message);
        }
    }

    #[test]
    fn test_projection_overflow_is_reported() {
        assert!(projection(0.0, 1e19).is_err());
        assert!(projection(0.0, f64::INFINITY).is_err());
        assert_eq!(projection(100.0, 30.0).unwrap()[0], ProjectionPoint { year: 1, value: -70 });
        // ties go to even
        assert_eq!(projection(0.5, 1.0).unwrap()[0].value, 0);
        assert_eq!(projection(0.5, 2.0).unwrap()[0].value, 2);
    }

    #[test]
    fn test_concurrent_requests_are_isolated() {
        let catalog = Arc::new(catalog());
        let handles: Vec<_> = [30.0, 60.0, 90.0, 120.0]
            .into_iter()
            .map(|roof| {
                let catalog = Arc::clone(&catalog);
                std::thread::spawn(move || {
                    (0..50)
                        .map(|_| recommend(&catalog, &body(roof, "台南市")).unwrap()[0].capacity_kw)
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        for (handle, roof) in handles.into_iter().zip([30.0, 60.0, 90.0, 120.0]) {
            let expected = roof * 0.5 * 200.0 / 1000.0;
            assert!(handle.join().unwrap().iter().all(|c| *c == expected));
        }
    }
}
