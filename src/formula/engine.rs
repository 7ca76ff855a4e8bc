//! Tree-walking interpreter over the formula AST.

use std::cmp::Ordering;
use std::sync::Arc;

use super::functions::arity;
use super::parser::{BinaryOp, CmpOp, Expr, UnaryOp};
use super::{EvaluationContext, ExprError, Formula, FormulaError, Scope, Value};

/// Run `formulas` in order, binding each result into the context's computed
/// layer. Stops at the first failing formula.
pub fn evaluate<'a, 'f, I>(
    mut context: EvaluationContext<'f>,
    formulas: I,
) -> Result<EvaluationContext<'f>, FormulaError>
where
    I: IntoIterator<Item = &'a Formula>,
{
    for formula in formulas {
        let value = eval_expr(&formula.expr, &context)
            .map_err(|e| FormulaError::new(formula.field.clone(), e))?;
        tracing::trace!(field = %formula.field, value = %value, "formula evaluated");
        context.bind(Scope::Computed, formula.field.clone(), value);
    }
    Ok(context)
}

/// Evaluate a single expression against a context.
pub fn eval_expr(expr: &Expr, ctx: &EvaluationContext<'_>) -> Result<Value, ExprError> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Name(name) => ctx.lookup(name).cloned(),
        Expr::Unary(op, operand) => unary(*op, eval_expr(operand, ctx)?),
        Expr::Binary(op, lhs, rhs) => {
            let l = eval_expr(lhs, ctx)?;
            let r = eval_expr(rhs, ctx)?;
            binary(*op, &l, &r)
        }
        Expr::Compare(first, rest) => {
            let mut left = eval_expr(first, ctx)?;
            for (op, operand) in rest {
                let right = eval_expr(operand, ctx)?;
                if !compare(*op, &left, &right)? {
                    return Ok(Value::Bool(false));
                }
                left = right;
            }
            Ok(Value::Bool(true))
        }
        Expr::And(lhs, rhs) => {
            let l = eval_expr(lhs, ctx)?;
            if l.is_truthy() {
                eval_expr(rhs, ctx)
            } else {
                Ok(l)
            }
        }
        Expr::Or(lhs, rhs) => {
            let l = eval_expr(lhs, ctx)?;
            if l.is_truthy() {
                Ok(l)
            } else {
                eval_expr(rhs, ctx)
            }
        }
        Expr::Not(operand) => Ok(Value::Bool(!eval_expr(operand, ctx)?.is_truthy())),
        Expr::Conditional {
            condition,
            then,
            otherwise,
        } => {
            if eval_expr(condition, ctx)?.is_truthy() {
                eval_expr(then, ctx)
            } else {
                eval_expr(otherwise, ctx)
            }
        }
        Expr::Index(target, key) => {
            let target = eval_expr(target, ctx)?;
            let key = eval_expr(key, ctx)?;
            index(&target, &key)
        }
        Expr::Member(target, name) => match eval_expr(target, ctx)? {
            Value::Map(entries) => entries
                .get(name)
                .cloned()
                .ok_or_else(|| ExprError::MissingKey(format!("'{name}'"))),
            other => Err(ExprError::Disallowed(format!(
                "attribute '.{name}' on {}",
                other.type_name()
            ))),
        },
        Expr::Call(name, args) => {
            if !ctx.functions().contains(name) {
                return Err(ExprError::DisallowedCall(format!(
                    "'{name}' is not a known function"
                )));
            }
            let args = args
                .iter()
                .map(|a| eval_expr(a, ctx))
                .collect::<Result<Vec<_>, _>>()?;
            ctx.functions().call(name, &args)
        }
        Expr::MethodCall(target, method, args) => {
            let target = eval_expr(target, ctx)?;
            let args = args
                .iter()
                .map(|a| eval_expr(a, ctx))
                .collect::<Result<Vec<_>, _>>()?;
            method_call(&target, method, &args)
        }
    }
}

/// Numeric operand with bools folded into ints.
#[derive(Debug, Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn of(v: &Value) -> Option<Self> {
        match v {
            Value::Int(i) => Some(Num::Int(*i)),
            Value::Bool(b) => Some(Num::Int(i64::from(*b))),
            Value::Float(f) => Some(Num::Float(*f)),
            _ => None,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn to_f64(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Float(f) => f,
        }
    }
}

fn unary(op: UnaryOp, v: Value) -> Result<Value, ExprError> {
    match (op, Num::of(&v)) {
        (UnaryOp::Neg, Some(Num::Int(i))) => i.checked_neg().map(Value::Int).ok_or(ExprError::Overflow),
        (UnaryOp::Neg, Some(Num::Float(f))) => Ok(Value::Float(-f)),
        (UnaryOp::Pos, Some(Num::Int(i))) => Ok(Value::Int(i)),
        (UnaryOp::Pos, Some(Num::Float(f))) => Ok(Value::Float(f)),
        (_, None) => Err(ExprError::Type(format!(
            "bad operand type for unary {}: '{}'",
            if op == UnaryOp::Neg { "-" } else { "+" },
            v.type_name()
        ))),
    }
}

fn op_symbol(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::FloorDiv => "//",
        BinaryOp::Mod => "%",
        BinaryOp::Pow => "**",
    }
}

fn binary(op: BinaryOp, l: &Value, r: &Value) -> Result<Value, ExprError> {
    match (op, l, r) {
        (BinaryOp::Add, Value::Str(a), Value::Str(b)) => return Ok(Value::Str(format!("{a}{b}"))),
        (BinaryOp::Add, Value::List(a), Value::List(b)) => {
            let mut joined = a.as_ref().clone();
            joined.extend(b.iter().cloned());
            return Ok(Value::List(Arc::new(joined)));
        }
        _ => {}
    }

    let (Some(a), Some(b)) = (Num::of(l), Num::of(r)) else {
        return Err(ExprError::Type(format!(
            "unsupported operand types for {}: '{}' and '{}'",
            op_symbol(op),
            l.type_name(),
            r.type_name()
        )));
    };

    match (a, b) {
        (Num::Int(x), Num::Int(y)) => int_binary(op, x, y),
        _ => float_binary(op, a.to_f64(), b.to_f64()),
    }
}

fn int_binary(op: BinaryOp, x: i64, y: i64) -> Result<Value, ExprError> {
    let checked = |v: Option<i64>| v.map(Value::Int).ok_or(ExprError::Overflow);
    match op {
        BinaryOp::Add => checked(x.checked_add(y)),
        BinaryOp::Sub => checked(x.checked_sub(y)),
        BinaryOp::Mul => checked(x.checked_mul(y)),
        #[allow(clippy::cast_precision_loss)]
        BinaryOp::Div => {
            if y == 0 {
                return Err(ExprError::DivisionByZero);
            }
            Ok(Value::Float(x as f64 / y as f64))
        }
        BinaryOp::FloorDiv => {
            if y == 0 {
                return Err(ExprError::DivisionByZero);
            }
            let q = x.checked_div(y).ok_or(ExprError::Overflow)?;
            let adjust = x % y != 0 && ((x < 0) != (y < 0));
            Ok(Value::Int(if adjust { q - 1 } else { q }))
        }
        BinaryOp::Mod => {
            if y == 0 {
                return Err(ExprError::DivisionByZero);
            }
            let r = x.checked_rem(y).ok_or(ExprError::Overflow)?;
            Ok(Value::Int(if r != 0 && ((r < 0) != (y < 0)) { r + y } else { r }))
        }
        BinaryOp::Pow => {
            if y >= 0 {
                let exp = u32::try_from(y).map_err(|_| ExprError::Overflow)?;
                checked(x.checked_pow(exp))
            } else {
                float_binary(op, Num::Int(x).to_f64(), Num::Int(y).to_f64())
            }
        }
    }
}

fn float_binary(op: BinaryOp, x: f64, y: f64) -> Result<Value, ExprError> {
    let value = match op {
        BinaryOp::Add => x + y,
        BinaryOp::Sub => x - y,
        BinaryOp::Mul => x * y,
        BinaryOp::Div => {
            if y == 0.0 {
                return Err(ExprError::DivisionByZero);
            }
            x / y
        }
        BinaryOp::FloorDiv => {
            if y == 0.0 {
                return Err(ExprError::DivisionByZero);
            }
            (x / y).floor()
        }
        BinaryOp::Mod => {
            if y == 0.0 {
                return Err(ExprError::DivisionByZero);
            }
            x - y * (x / y).floor()
        }
        BinaryOp::Pow => {
            if x == 0.0 && y < 0.0 {
                return Err(ExprError::DivisionByZero);
            }
            x.powf(y)
        }
    };
    Ok(Value::Float(value))
}

fn cmp_symbol(op: CmpOp) -> &'static str {
    match op {
        CmpOp::Eq => "==",
        CmpOp::Ne => "!=",
        CmpOp::Lt => "<",
        CmpOp::Le => "<=",
        CmpOp::Gt => ">",
        CmpOp::Ge => ">=",
    }
}

fn compare(op: CmpOp, l: &Value, r: &Value) -> Result<bool, ExprError> {
    if matches!(op, CmpOp::Eq | CmpOp::Ne) {
        return Ok((l == r) == (op == CmpOp::Eq));
    }

    let ordering = match (l, r) {
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        _ => match (Num::of(l), Num::of(r)) {
            (Some(a), Some(b)) => a.to_f64().partial_cmp(&b.to_f64()),
            _ => {
                return Err(ExprError::Type(format!(
                    "'{}' not supported between '{}' and '{}'",
                    cmp_symbol(op),
                    l.type_name(),
                    r.type_name()
                )))
            }
        },
    };

    // NaN compares false against everything.
    let Some(ordering) = ordering else {
        return Ok(false);
    };
    Ok(match op {
        CmpOp::Lt => ordering == Ordering::Less,
        CmpOp::Le => ordering != Ordering::Greater,
        CmpOp::Gt => ordering == Ordering::Greater,
        CmpOp::Ge => ordering != Ordering::Less,
        CmpOp::Eq => ordering == Ordering::Equal,
        CmpOp::Ne => ordering != Ordering::Equal,
    })
}

fn map_key(key: &Value) -> String {
    match key {
        Value::Str(s) => s.clone(),
        other => other.to_string(),
    }
}

fn index(target: &Value, key: &Value) -> Result<Value, ExprError> {
    match target {
        Value::Map(entries) => {
            let k = map_key(key);
            entries
                .get(&k)
                .cloned()
                .ok_or_else(|| ExprError::MissingKey(format!("'{k}'")))
        }
        Value::List(items) => {
            let i = key.as_int().ok_or_else(|| {
                ExprError::Type(format!("list indices must be integers, not {}", key.type_name()))
            })?;
            let len = i64::try_from(items.len()).map_err(|_| ExprError::Overflow)?;
            let pos = if i < 0 { len + i } else { i };
            usize::try_from(pos)
                .ok()
                .and_then(|p| items.get(p))
                .cloned()
                .ok_or(ExprError::IndexOutOfRange(i))
        }
        other => Err(ExprError::Type(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

fn method_call(target: &Value, method: &str, args: &[Value]) -> Result<Value, ExprError> {
    match (target, method) {
        (Value::Map(entries), "get") => {
            arity("get", args, 1, 2)?;
            Ok(entries
                .get(&map_key(&args[0]))
                .cloned()
                .unwrap_or_else(|| args.get(1).cloned().unwrap_or(Value::Null)))
        }
        _ => Err(ExprError::DisallowedCall(format!(
            "method '.{method}()' on {}",
            target.type_name()
        ))),
    }
}
