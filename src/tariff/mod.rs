//! Tiered feed-in-tariff resolution.
//!
//! Tiers are scanned in table order and the first tier whose
//! `[min_kw, max_kw)` range contains the capacity wins. A tier without
//! `max_kw` is open-ended. The chosen base rate is scaled by the region
//! bonus for the installation city and rounded to [`RATE_DECIMALS`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::defaults::{DEFAULT_FIT_RATE, HIGH_EFFICIENCY_LEVELS, RATE_DECIMALS};
use crate::formula::FunctionRegistry;

/// One capacity band of the rate table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateTier {
    pub min_kw: f64,
    /// Exclusive upper bound; `None` means unbounded.
    #[serde(default)]
    pub max_kw: Option<f64>,
    /// Rate for standard-efficiency modules (NTD/kWh).
    #[serde(rename = "standard")]
    pub standard_rate: f64,
    /// Rate for modules in the high-efficiency set (NTD/kWh).
    #[serde(rename = "high_eff")]
    pub high_efficiency_rate: f64,
}

impl RateTier {
    pub fn contains(&self, capacity_kw: f64) -> bool {
        self.min_kw <= capacity_kw && self.max_kw.map_or(true, |max| capacity_kw < max)
    }

    fn upper(&self) -> f64 {
        self.max_kw.unwrap_or(f64::INFINITY)
    }

    pub fn rate_for(&self, efficiency_level: &str) -> f64 {
        if is_high_efficiency(efficiency_level) {
            self.high_efficiency_rate
        } else {
            self.standard_rate
        }
    }
}

pub fn is_high_efficiency(efficiency_level: &str) -> bool {
    HIGH_EFFICIENCY_LEVELS.contains(&efficiency_level)
}

/// The rate table plus per-city bonus ratios.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateSchedule {
    tiers: Vec<RateTier>,
    region_bonus: BTreeMap<String, f64>,
}

impl RateSchedule {
    pub fn new(tiers: Vec<RateTier>, region_bonus: BTreeMap<String, f64>) -> Self {
        Self {
            tiers,
            region_bonus,
        }
    }

    pub fn tiers(&self) -> &[RateTier] {
        &self.tiers
    }

    pub fn region_bonus(&self, city: &str) -> f64 {
        self.region_bonus.get(city).copied().unwrap_or(0.0)
    }

    /// Base rate before the region bonus, falling back to
    /// [`DEFAULT_FIT_RATE`] when no tier matches.
    pub fn base_rate(&self, capacity_kw: f64, efficiency_level: &str) -> f64 {
        self.tiers
            .iter()
            .find(|tier| tier.contains(capacity_kw))
            .map_or(DEFAULT_FIT_RATE, |tier| tier.rate_for(efficiency_level))
    }

    /// Incentive rate for an installation, rounded to [`RATE_DECIMALS`].
    pub fn resolve(&self, capacity_kw: f64, efficiency_level: &str, city: &str) -> f64 {
        let rate = self.base_rate(capacity_kw, efficiency_level) * (1.0 + self.region_bonus(city));
        crate::formula::round_to(rate, RATE_DECIMALS)
    }

    /// Index pairs of tiers whose ranges intersect. Only the earlier tier
    /// of each pair is ever selected.
    pub fn overlapping_tiers(&self) -> Vec<(usize, usize)> {
        let mut out = Vec::new();
        for (i, a) in self.tiers.iter().enumerate() {
            for (j, b) in self.tiers.iter().enumerate().skip(i + 1) {
                if a.min_kw.max(b.min_kw) < a.upper().min(b.upper()) {
                    out.push((i, j));
                }
            }
        }
        out
    }

    /// Expose the resolver to formulas as `get_fit_rate(capacity_kw, efficiency_level)`,
    /// bound to the installation city.
    pub fn register<'f>(&'f self, registry: &mut FunctionRegistry<'f>, city: &'f str) {
        registry.register("get_fit_rate", move |args| {
            crate::formula::arity("get_fit_rate", args, 2, 2)?;
            let capacity_kw = args[0].expect_f64("get_fit_rate")?;
            let level = args[1].as_str().ok_or_else(|| crate::formula::ExprError::Function {
                function: "get_fit_rate".to_string(),
                message: format!("efficiency_level must be a string, got {}", args[1].type_name()),
            })?;
            Ok(self.resolve(capacity_kw, level, city).into())
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::Value;

    fn tier(min_kw: f64, max_kw: Option<f64>, standard: f64, high: f64) -> RateTier {
        RateTier {
            min_kw,
            max_kw,
            standard_rate: standard,
            high_efficiency_rate: high,
        }
    }

    fn schedule() -> RateSchedule {
        RateSchedule::new(
            vec![
                tier(1.0, Some(10.0), 5.7, 6.0),
                tier(10.0, Some(100.0), 4.5, 4.8),
                tier(100.0, None, 4.0, 4.2),
            ],
            BTreeMap::from([("台南市".to_string(), 0.1), ("澎湖縣".to_string(), 0.15)]),
        )
    }

    #[test]
    fn test_tier_selection_respects_half_open_ranges() {
        let s = schedule();
        assert_eq!(s.resolve(1.0, "標準", "台北市"), 5.7);
        assert_eq!(s.resolve(9.99, "標準", "台北市"), 5.7);
        assert_eq!(s.resolve(10.0, "標準", "台北市"), 4.5);
        assert_eq!(s.resolve(5000.0, "標準", "台北市"), 4.0);
    }

    #[test]
    fn test_high_efficiency_levels_use_high_rate() {
        let s = schedule();
        assert_eq!(s.resolve(5.0, "非常高效", "台北市"), 6.0);
        assert_eq!(s.resolve(5.0, "高效", "台北市"), 6.0);
        assert_eq!(s.resolve(5.0, "中等", "台北市"), 5.7);
    }

    #[test]
    fn test_no_matching_tier_uses_default_rate() {
        let s = schedule();
        assert_eq!(s.resolve(0.5, "高效", "台北市"), DEFAULT_FIT_RATE);
        assert_eq!(s.resolve(0.5, "高效", "台南市"), 3.85);
        assert_eq!(RateSchedule::default().resolve(3.0, "高效", "x"), 3.5);
    }

    #[test]
    fn test_region_bonus_applied_and_rounded() {
        let s = schedule();
        // 5.7 * 1.15 = 6.555 (float noise below the fourth decimal)
        assert_eq!(s.resolve(5.0, "標準", "澎湖縣"), 6.555);
        let r = s.resolve(12.0, "高效", "台南市");
        assert_eq!(r, 5.28);
        assert_eq!(r, crate::formula::round_to(r, RATE_DECIMALS));
    }

    #[test]
    fn test_rate_is_monotonic_in_bonus() {
        let mut last = 0.0;
        for step in 0..20 {
            let bonus = f64::from(step) * 0.05;
            let s = RateSchedule::new(
                vec![tier(0.0, None, 4.1234, 4.5678)],
                BTreeMap::from([("c".to_string(), bonus)]),
            );
            let r = s.resolve(3.0, "高效", "c");
            assert!(r >= last, "bonus {bonus}: {r} < {last}");
            last = r;
        }
    }

    #[test]
    fn test_first_match_wins_on_overlap() {
        let s = RateSchedule::new(
            vec![tier(0.0, Some(20.0), 5.0, 5.0), tier(10.0, None, 1.0, 1.0)],
            BTreeMap::new(),
        );
        assert_eq!(s.resolve(15.0, "標準", "x"), 5.0);
        assert_eq!(s.overlapping_tiers(), vec![(0, 1)]);
        assert!(schedule().overlapping_tiers().is_empty());
    }

    #[test]
    fn test_table_rows_deserialize_with_null_max() {
        let rows: Vec<RateTier> = serde_json::from_str(
            r#"[{"min_kw": 1, "max_kw": 10, "standard": 5.7, "high_eff": 6.0},
                {"min_kw": 10, "max_kw": null, "standard": 4.5, "high_eff": 4.8}]"#,
        )
        .unwrap();
        assert_eq!(rows[0].max_kw, Some(10.0));
        assert_eq!(rows[1].max_kw, None);
        assert_eq!(rows[1].high_efficiency_rate, 4.8);
    }

    #[test]
    fn test_registered_function_is_bound_to_city() {
        let s = schedule();
        let mut registry = FunctionRegistry::empty();
        s.register(&mut registry, "台南市");
        let rate = registry
            .call("get_fit_rate", &[Value::Float(12.0), Value::Str("高效".into())])
            .unwrap();
        assert_eq!(rate, Value::Float(5.28));
        assert!(registry.call("get_fit_rate", &[Value::Float(12.0)]).is_err());
    }
}
