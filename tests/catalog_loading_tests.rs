//! Catalog Loading Tests
//!
//! Write catalog directories into a tempdir and load them the way the
//! server does at startup.

use serde_json::json;
use solar_advisor::config::{Catalog, ConfigError, FORMULAS_FILE, MODULES_FILE, RATE_TABLE_FILE};
use std::path::Path;
use tempfile::TempDir;

fn write(dir: &Path, file: &str, contents: &serde_json::Value) {
    std::fs::write(dir.join(file), serde_json::to_string_pretty(contents).unwrap()).unwrap();
}

/// A small valid catalog; individual tests overwrite one file.
fn catalog_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    let p = dir.path();
    write(
        p,
        "modules.json",
        &json!([{
            "module_name": "A-1",
            "brand": "Acme",
            "type": "單晶矽",
            "efficiency_percent": 21,
            "efficiency_level": "高效",
            "watt_per_m2": 200,
            "cost_per_kw": 60000
        }]),
    );
    // serde_json keeps insertion order only with preserve_order, so write
    // the formula file by hand.
    std::fs::write(
        p.join("formulas.json"),
        r#"{
            "capacity_kw": "roof_area_m2 * coverage_rate * watt_per_m2 / 1000",
            "daily_kwh_per_kw": "city_to_kwh_day.get(address, 3.2)",
            "annual_generation_kwh": "capacity_kw * daily_kwh_per_kw * 365",
            "fit_rate_total": "get_fit_rate(capacity_kw, efficiency_level)",
            "annual_revenue_ntd": "annual_generation_kwh * fit_rate_total",
            "install_cost_ntd": "capacity_kw * cost_per_kw",
            "payback_years": "install_cost_ntd / annual_revenue_ntd",
            "environmental_benefit": "round(annual_generation_kwh * 0.509, 1)"
        }"#,
    )
    .unwrap();
    write(p, "city_to_kwh_day.json", &json!({"台南市": 3.6}));
    write(
        p,
        "fit_rate_table.json",
        &json!([
            {"min_kw": 1, "max_kw": 10, "standard": 5.7, "high_eff": 6.0},
            {"min_kw": 10, "max_kw": null, "standard": 4.5, "high_eff": 4.8}
        ]),
    );
    write(p, "region_bonus.json", &json!({"台南市": 0.1}));
    dir
}

#[test]
fn loads_valid_directory() {
    let dir = catalog_dir();
    let catalog = Catalog::load(dir.path()).unwrap();
    assert_eq!(catalog.modules().len(), 1);
    assert_eq!(catalog.formulas().len(), 8);
    assert_eq!(catalog.rates().tiers().len(), 2);
    assert_eq!(catalog.daily_yield("台南市"), Some(3.6));
    assert!(catalog.warnings().is_empty(), "{:?}", catalog.warnings());
}

#[test]
fn formula_order_follows_the_file() {
    let dir = catalog_dir();
    let catalog = Catalog::load(dir.path()).unwrap();
    let fields: Vec<&str> = catalog.formulas().iter().map(|f| f.field.as_str()).collect();
    assert_eq!(fields[0], "capacity_kw");
    assert_eq!(fields[7], "environmental_benefit");
}

#[test]
fn loaded_catalog_produces_recommendations() {
    let dir = catalog_dir();
    let catalog = Catalog::load(dir.path()).unwrap();
    let body = json!({"roof_area_m2": 50, "coverage_rate": 0.5, "address": "台南市"});
    let recs = solar_advisor::recommend(&catalog, &body).unwrap();
    assert_eq!(recs.len(), 1);
    assert_eq!(recs[0].capacity_kw, 5.0);
    assert_eq!(recs[0].fit_rate_total, 6.6);
    assert_eq!(recs[0].annual_revenue_ntd, 43362);
}

#[test]
fn missing_file_is_io_error_naming_the_file() {
    let dir = catalog_dir();
    std::fs::remove_file(dir.path().join(RATE_TABLE_FILE)).unwrap();
    let err = Catalog::load(dir.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Io(ref path, _) if path.ends_with(RATE_TABLE_FILE)));
}

#[test]
fn malformed_json_is_catalog_error() {
    let dir = catalog_dir();
    std::fs::write(dir.path().join(MODULES_FILE), "[{").unwrap();
    let err = Catalog::load(dir.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Catalog(..)));
    assert!(err.to_string().contains(MODULES_FILE));
}

#[test]
fn module_without_name_is_rejected() {
    let dir = catalog_dir();
    write(dir.path(), MODULES_FILE, &json!([{"brand": "Acme"}]));
    assert!(matches!(
        Catalog::load(dir.path()).unwrap_err(),
        ConfigError::Catalog(..)
    ));
}

#[test]
fn duplicate_formula_field_is_rejected() {
    let dir = catalog_dir();
    std::fs::write(
        dir.path().join(FORMULAS_FILE),
        r#"{"capacity_kw": "1", "capacity_kw": "2"}"#,
    )
    .unwrap();
    assert!(matches!(
        Catalog::load(dir.path()).unwrap_err(),
        ConfigError::Catalog(..)
    ));
}

#[test]
fn formula_syntax_error_names_the_field() {
    let dir = catalog_dir();
    std::fs::write(
        dir.path().join(FORMULAS_FILE),
        r#"{"capacity_kw": "roof_area_m2 *"}"#,
    )
    .unwrap();
    match Catalog::load(dir.path()).unwrap_err() {
        ConfigError::Formula { field, .. } => assert_eq!(field, "capacity_kw"),
        other => panic!("expected a formula error, got {other}"),
    }
}

#[test]
fn formula_attempting_import_is_rejected_at_load() {
    let dir = catalog_dir();
    std::fs::write(
        dir.path().join(FORMULAS_FILE),
        r#"{"capacity_kw": "__import__('os').system('ls')"}"#,
    )
    .unwrap();
    assert!(matches!(
        Catalog::load(dir.path()).unwrap_err(),
        ConfigError::Formula { .. }
    ));
}

#[test]
fn negative_yield_is_validation_error() {
    let dir = catalog_dir();
    write(dir.path(), "city_to_kwh_day.json", &json!({"台南市": -1.0}));
    let err = Catalog::load(dir.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Validation(_)));
    assert!(err.to_string().contains("台南市"));
}

#[test]
fn overlapping_tiers_load_with_a_warning() {
    let dir = catalog_dir();
    write(
        dir.path(),
        RATE_TABLE_FILE,
        &json!([
            {"min_kw": 1, "max_kw": 20, "standard": 5.7, "high_eff": 6.0},
            {"min_kw": 10, "max_kw": null, "standard": 4.5, "high_eff": 4.8}
        ]),
    );
    let catalog = Catalog::load(dir.path()).unwrap();
    let warnings = catalog.warnings();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].field, RATE_TABLE_FILE);
}
