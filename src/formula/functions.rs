//! Whitelisted functions callable from formulas.
//!
//! A registry starts with a handful of pure numeric helpers; callers add
//! the domain lookups (city yield, rate resolver) per evaluation. A call to
//! any name not in the registry is rejected.

use std::collections::BTreeMap;

use super::{ExprError, Value};

/// A function exposed to formulas.
pub type NativeFn<'f> = Box<dyn Fn(&[Value]) -> Result<Value, ExprError> + Send + Sync + 'f>;

pub struct FunctionRegistry<'f> {
    functions: BTreeMap<String, NativeFn<'f>>,
}

impl<'f> FunctionRegistry<'f> {
    /// An empty registry: every call is disallowed.
    pub fn empty() -> Self {
        Self {
            functions: BTreeMap::new(),
        }
    }

    /// Registry with the pure numeric helpers `min`, `max`, `abs`, `round`,
    /// `int` and `float`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register("min", |args| extremum("min", args, |a, b| b < a));
        registry.register("max", |args| extremum("max", args, |a, b| b > a));
        registry.register("abs", builtin_abs);
        registry.register("round", builtin_round);
        registry.register("int", builtin_int);
        registry.register("float", builtin_float);
        registry
    }

    pub fn register<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&[Value]) -> Result<Value, ExprError> + Send + Sync + 'f,
    {
        self.functions.insert(name.into(), Box::new(f));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value, ExprError> {
        let f = self
            .functions
            .get(name)
            .ok_or_else(|| ExprError::DisallowedCall(format!("'{name}' is not a known function")))?;
        f(args)
    }
}

/// Check an argument count range, producing a function-scoped error.
pub(crate) fn arity(name: &str, args: &[Value], min: usize, max: usize) -> Result<(), ExprError> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            format!("{min}")
        } else {
            format!("{min} to {max}")
        };
        return Err(ExprError::Function {
            function: name.to_string(),
            message: format!("expected {expected} arguments, got {}", args.len()),
        });
    }
    Ok(())
}

fn extremum(name: &str, args: &[Value], better: fn(f64, f64) -> bool) -> Result<Value, ExprError> {
    let items: Vec<Value> = match args {
        [Value::List(list)] => list.as_ref().clone(),
        _ => args.to_vec(),
    };
    let mut best: Option<(f64, Value)> = None;
    for item in items {
        let n = item.expect_f64(name)?;
        match &best {
            Some((b, _)) if !better(*b, n) => {}
            _ => best = Some((n, item)),
        }
    }
    best.map(|(_, v)| v).ok_or_else(|| ExprError::Function {
        function: name.to_string(),
        message: "expected at least one argument".to_string(),
    })
}

fn builtin_abs(args: &[Value]) -> Result<Value, ExprError> {
    arity("abs", args, 1, 1)?;
    match &args[0] {
        Value::Int(i) => i.checked_abs().map(Value::Int).ok_or(ExprError::Overflow),
        Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
        other => Ok(Value::Float(other.expect_f64("abs")?.abs())),
    }
}

/// `round(x)` rounds half to even and returns an int; `round(x, n)` returns
/// a float with `n` decimals.
fn builtin_round(args: &[Value]) -> Result<Value, ExprError> {
    arity("round", args, 1, 2)?;
    let ndigits = match args.get(1) {
        None | Some(Value::Null) => None,
        Some(v) => Some(v.as_int().ok_or_else(|| ExprError::Function {
            function: "round".to_string(),
            message: format!("ndigits must be an int, got {}", v.type_name()),
        })?),
    };

    match (&args[0], ndigits) {
        (Value::Int(i), _) => Ok(Value::Int(*i)),
        (other, None) => {
            let x = other.expect_f64("round")?;
            float_to_int(x.round_ties_even(), "round")
        }
        (other, Some(n)) => {
            let x = other.expect_f64("round")?;
            let places = i32::try_from(n).map_err(|_| ExprError::Overflow)?;
            Ok(Value::Float(round_to(x, places)))
        }
    }
}

fn builtin_int(args: &[Value]) -> Result<Value, ExprError> {
    arity("int", args, 1, 1)?;
    match &args[0] {
        Value::Int(i) => Ok(Value::Int(*i)),
        Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
        Value::Float(f) => float_to_int(f.trunc(), "int"),
        Value::Str(s) => s.trim().parse::<i64>().map(Value::Int).map_err(|_| ExprError::Function {
            function: "int".to_string(),
            message: format!("invalid literal '{s}'"),
        }),
        other => Err(ExprError::Type(format!(
            "int() argument must be a number or string, not {}",
            other.type_name()
        ))),
    }
}

fn builtin_float(args: &[Value]) -> Result<Value, ExprError> {
    arity("float", args, 1, 1)?;
    match &args[0] {
        Value::Str(s) => s.trim().parse::<f64>().map(Value::Float).map_err(|_| ExprError::Function {
            function: "float".to_string(),
            message: format!("could not convert string '{s}'"),
        }),
        other => Ok(Value::Float(other.expect_f64("float")?)),
    }
}

/// Round to `places` decimals, ties to even, on the exact stored value.
///
/// `{:.n}` formatting is correctly rounded, so `1.115` (stored just below
/// the half) gives `1.11` where scaling by 100 first would give `1.12`.
pub fn round_to(x: f64, places: i32) -> f64 {
    if !x.is_finite() || places > MAX_ROUND_DIGITS {
        return x;
    }
    if places < -MAX_ROUND_DIGITS {
        return 0.0_f64.copysign(x);
    }
    match usize::try_from(places) {
        Ok(precision) => format!("{x:.precision$}").parse().unwrap_or(x),
        Err(_) => {
            let factor = 10f64.powi(-places);
            (x / factor).round_ties_even() * factor
        }
    }
}

/// Beyond this many decimals every finite `f64` is already exact.
const MAX_ROUND_DIGITS: i32 = 323;

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn float_to_int(x: f64, function: &str) -> Result<Value, ExprError> {
    if !x.is_finite() || x >= i64::MAX as f64 || x < i64::MIN as f64 {
        return Err(ExprError::Function {
            function: function.to_string(),
            message: format!("cannot convert {x} to int"),
        });
    }
    Ok(Value::Int(x as i64))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: &[Value]) -> Result<Value, ExprError> {
        FunctionRegistry::with_builtins().call(name, args)
    }

    #[test]
    fn test_round_without_digits_is_bankers_int() {
        assert_eq!(call("round", &[Value::Float(2.5)]).unwrap(), Value::Int(2));
        assert_eq!(call("round", &[Value::Float(3.5)]).unwrap(), Value::Int(4));
        assert!(matches!(call("round", &[Value::Float(2.5)]).unwrap(), Value::Int(_)));
    }

    #[test]
    fn test_round_to_uses_the_stored_value() {
        // each literal is stored just below its printed half
        assert_eq!(round_to(1.115, 2), 1.11);
        assert_eq!(round_to(97.55, 1), 97.5);
        assert_eq!(round_to(2.675, 2), 2.67);
        assert_eq!(round_to(2.255, 2), 2.25);
        // exact halves go to even
        assert_eq!(round_to(0.125, 2), 0.12);
        assert_eq!(round_to(0.375, 2), 0.38);
        assert_eq!(round_to(-1.115, 2), -1.11);
        assert_eq!(round_to(1234.5, -2), 1200.0);
        assert_eq!(round_to(6.6, i32::MAX), 6.6);
        assert_eq!(round_to(5.0, i32::MIN), 0.0);
        assert!(round_to(f64::NAN, 2).is_nan());
    }

    #[test]
    fn test_round_builtin_matches_round_to() {
        let v = call("round", &[Value::Float(1.115), Value::Int(2)]).unwrap();
        assert_eq!(v, Value::Float(1.11));
    }

    #[test]
    fn test_round_with_digits_is_float() {
        let v = call("round", &[Value::Float(3.14159), Value::Int(2)]).unwrap();
        assert_eq!(v, Value::Float(3.14));
    }

    #[test]
    fn test_min_max_keep_original_type() {
        let v = call("max", &[Value::Int(3), Value::Float(2.5)]).unwrap();
        assert!(matches!(v, Value::Int(3)));
        let v = call("min", &[Value::Int(3), Value::Float(2.5)]).unwrap();
        assert_eq!(v, Value::Float(2.5));
    }

    #[test]
    fn test_min_of_nothing_fails() {
        assert!(matches!(call("min", &[]), Err(ExprError::Function { .. })));
    }

    #[test]
    fn test_int_truncates_toward_zero() {
        assert_eq!(call("int", &[Value::Float(-2.7)]).unwrap(), Value::Int(-2));
        assert_eq!(call("int", &[Value::Str(" 42 ".into())]).unwrap(), Value::Int(42));
    }

    #[test]
    fn test_unknown_function_is_disallowed() {
        assert!(matches!(
            call("open", &[Value::Str("/etc/passwd".into())]),
            Err(ExprError::DisallowedCall(_))
        ));
    }

    #[test]
    fn test_registered_closure_can_borrow() {
        let table = vec![1.5_f64, 2.5];
        let mut registry = FunctionRegistry::empty();
        registry.register("first", |_args: &[Value]| Ok(Value::Float(table[0])));
        assert_eq!(registry.call("first", &[]).unwrap(), Value::Float(1.5));
    }

    #[test]
    fn test_arity_errors_name_the_function() {
        let err = call("abs", &[]).unwrap_err();
        assert_eq!(err.to_string(), "abs(): expected 1 arguments, got 0");
    }
}
