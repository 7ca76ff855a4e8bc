//! Formula Evaluation Engine
//!
//! Turns config-declared expressions into computed metric fields. Each
//! formula is compiled once when the catalog loads, then evaluated per
//! request against a layered [`EvaluationContext`].
//!
//! ## Expression language
//!
//! A narrow grammar: literals, arithmetic,
//! comparisons, `and`/`or`/`not`, `a if cond else b`, member/index access
//! into nested mappings, `.get(key, default)` on mappings, and calls to
//! functions registered in a [`FunctionRegistry`]. Nothing else resolves:
//! there is no import, no attribute access beyond data lookup, and no way
//! to reach a function that was not explicitly registered.
//!
//! ## Evaluation order
//!
//! Formulas run strictly in declared order. A formula may read any field
//! bound by an earlier formula in the same pass; a forward reference is an
//! unresolved name and aborts the pass.

mod context;
mod engine;
mod functions;
mod lexer;
mod parser;
mod value;

pub use context::{EvaluationContext, Scope};
pub use engine::{evaluate, eval_expr};
pub(crate) use functions::arity;
pub use functions::{round_to, FunctionRegistry, NativeFn};
pub use parser::{parse, BinaryOp, CmpOp, Expr, UnaryOp};
pub use value::Value;

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use std::fmt;
use thiserror::Error;

/// Failure while parsing or evaluating a single expression.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExprError {
    #[error("syntax error at offset {offset}: {message}")]
    Syntax { offset: usize, message: String },

    #[error("name '{0}' is not defined")]
    UnresolvedName(String),

    #[error("type error: {0}")]
    Type(String),

    #[error("call not allowed: {0}")]
    DisallowedCall(String),

    #[error("construct not allowed: {0}")]
    Disallowed(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("integer overflow")]
    Overflow,

    #[error("key {0} not found")]
    MissingKey(String),

    #[error("index {0} out of range")]
    IndexOutOfRange(i64),

    #[error("{function}(): {message}")]
    Function { function: String, message: String },
}

/// An [`ExprError`] tagged with the formula field that raised it.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{field}: {source}")]
pub struct FormulaError {
    pub field: String,
    pub source: ExprError,
}

impl FormulaError {
    pub fn new(field: impl Into<String>, source: ExprError) -> Self {
        Self {
            field: field.into(),
            source,
        }
    }
}

// ============================================================================
// Formula declarations
// ============================================================================

/// Ordered `field -> expression` declarations as written in config.
///
/// Deserializes from a JSON/TOML object while keeping the declared key
/// order, which the engine depends on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormulaSpec(pub Vec<(String, String)>);

impl FormulaSpec {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'de> Deserialize<'de> for FormulaSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OrderedVisitor;

        impl<'de> Visitor<'de> for OrderedVisitor {
            type Value = FormulaSpec;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an object mapping field names to expression strings")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<FormulaSpec, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((field, expr)) = access.next_entry::<String, String>()? {
                    if entries.iter().any(|(f, _)| f == &field) {
                        return Err(serde::de::Error::custom(format!(
                            "duplicate formula field '{field}'"
                        )));
                    }
                    entries.push((field, expr));
                }
                Ok(FormulaSpec(entries))
            }
        }

        deserializer.deserialize_map(OrderedVisitor)
    }
}

/// A named, compiled formula.
#[derive(Debug, Clone)]
pub struct Formula {
    pub field: String,
    pub source: String,
    pub expr: Expr,
}

impl Formula {
    pub fn compile(field: impl Into<String>, source: impl Into<String>) -> Result<Self, FormulaError> {
        let field = field.into();
        let source = source.into();
        let expr = parse(&source).map_err(|e| FormulaError::new(field.clone(), e))?;
        Ok(Self {
            field,
            source,
            expr,
        })
    }
}

/// The compiled formula list, in declared order.
#[derive(Debug, Clone, Default)]
pub struct FormulaSet {
    formulas: Vec<Formula>,
}

impl FormulaSet {
    /// Compile every declaration, stopping at the first syntax error.
    pub fn compile(spec: &FormulaSpec) -> Result<Self, FormulaError> {
        let formulas = spec
            .0
            .iter()
            .map(|(field, source)| Formula::compile(field, source))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { formulas })
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Formula> {
        self.formulas.iter()
    }

    pub fn len(&self) -> usize {
        self.formulas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formulas.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&Formula> {
        self.formulas.iter().find(|f| f.field == field)
    }

    /// Names read by each formula that are only bound by a *later* formula.
    ///
    /// Such a name fails at evaluation time unless the request or module
    /// happens to supply it; the catalog loader reports these as warnings.
    pub fn forward_references(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        for (i, formula) in self.formulas.iter().enumerate() {
            for name in formula.expr.names() {
                let defined_later = self.formulas[i + 1..].iter().any(|f| f.field == name);
                if defined_later {
                    out.push((formula.field.clone(), name.to_string()));
                }
            }
        }
        out
    }
}

impl<'a> IntoIterator for &'a FormulaSet {
    type Item = &'a Formula;
    type IntoIter = std::slice::Iter<'a, Formula>;

    fn into_iter(self) -> Self::IntoIter {
        self.formulas.iter()
    }
}
