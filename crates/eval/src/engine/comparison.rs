//! The one comparison routine behind `==`, `!=`, `<`, ... and the sequence
//! search built-ins.

use crate::engine::coercion::coerce_to_string;
use crate::engine::runtime::{Environment, Error, ErrorCode};
use crate::value::{DateKind, Value};
use core::cmp::Ordering;
use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl CompareOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Gt => ">",
            CompareOp::Le => "<=",
            CompareOp::Ge => ">=",
        }
    }

    fn is_equality(self) -> bool {
        matches!(self, CompareOp::Eq | CompareOp::Ne)
    }

    fn holds(self, ord: Ordering) -> bool {
        match self {
            CompareOp::Eq => ord == Ordering::Equal,
            CompareOp::Ne => ord != Ordering::Equal,
            CompareOp::Lt => ord == Ordering::Less,
            CompareOp::Gt => ord == Ordering::Greater,
            CompareOp::Le => ord != Ordering::Greater,
            CompareOp::Ge => ord != Ordering::Less,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// `Strict` serves the comparison operators; `Lenient` serves `seq_contains`
/// and friends, where operands that can't be compared are simply not equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareMode {
    Strict,
    Lenient,
}

fn failure(msg: impl Into<String>) -> Error {
    Error::from_code(ErrorCode::ComparisonFailure, msg)
}

fn only_equality(kind: &str, op: CompareOp) -> Error {
    Error::from_code(
        ErrorCode::UnsupportedOperation,
        format!("can't use operator \"{op}\" on {kind} values; only \"==\" and \"!=\" are allowed"),
    )
}

/// Outcome of an attempted comparison before the mode decides what a mismatch means.
enum Compared {
    Ordered(Ordering),
    Mismatch(Error),
}

fn compare_defined(
    left: &Value,
    op: CompareOp,
    right: &Value,
    env: &Environment,
) -> Result<Compared, Error> {
    if let (Some(a), Some(b)) = (left.as_number(), right.as_number()) {
        return env.arithmetic.compare_numbers(&a, &b).map(Compared::Ordered);
    }
    if let (Some(a), Some(b)) = (left.as_date(), right.as_date()) {
        if a.kind == DateKind::Unknown || b.kind == DateKind::Unknown {
            return Ok(Compared::Mismatch(failure(
                "can't compare dates whose kind (date, time or date-time) is unknown",
            )));
        }
        if a.kind != b.kind {
            return Ok(Compared::Mismatch(failure(format!(
                "can't compare a {} value with a {} value",
                a.kind.name(),
                b.kind.name()
            ))));
        }
        return Ok(Compared::Ordered(a.instant.cmp(&b.instant)));
    }
    if let (Some(a), Some(b)) = (left.as_string(), right.as_string()) {
        if !op.is_equality() {
            return Err(only_equality("string", op));
        }
        return Ok(Compared::Ordered(env.collator.compare(&a, &b)));
    }
    if let (Some(a), Some(b)) = (left.as_bool(), right.as_bool()) {
        if !op.is_equality() {
            return Err(only_equality("boolean", op));
        }
        return Ok(Compared::Ordered(a.cmp(&b)));
    }
    if env.classic_compatible {
        let a = coerce_to_string(Some(left), env, None)?;
        let b = coerce_to_string(Some(right), env, None)?;
        return Ok(Compared::Ordered(env.collator.compare(&a, &b)));
    }
    Ok(Compared::Mismatch(failure(format!(
        "can't compare values of these types: left is {}, right is {}",
        left.type_description(),
        right.type_description()
    ))))
}

/// Compares two operands; `None` is the undefined marker.
///
/// In classic-compatible mode undefined compares as the empty string. In
/// lenient mode undefined or mutually incomparable operands are unequal
/// instead of an error.
pub fn compare_values(
    left: Option<&Value>,
    op: CompareOp,
    right: Option<&Value>,
    env: &Environment,
    mode: CompareMode,
) -> Result<bool, Error> {
    let empty = Value::from("");
    let (left, right) = match (left, right) {
        (Some(l), Some(r)) => (l, r),
        _ if env.classic_compatible => (left.unwrap_or(&empty), right.unwrap_or(&empty)),
        _ if mode == CompareMode::Lenient => return Ok(op == CompareOp::Ne),
        _ => {
            let side = if left.is_none() { "left" } else { "right" };
            return Err(Error::from_code(
                ErrorCode::InvalidReference,
                format!("the {side} operand of \"{op}\" is undefined"),
            ));
        }
    };
    match compare_defined(left, op, right, env)? {
        Compared::Ordered(ord) => Ok(op.holds(ord)),
        Compared::Mismatch(_) if mode == CompareMode::Lenient && op.is_equality() => {
            Ok(op == CompareOp::Ne)
        }
        Compared::Mismatch(err) => Err(err),
    }
}

/// Lenient equality as used by the sequence search built-ins.
pub fn values_equal(a: &Value, b: &Value, env: &Environment) -> Result<bool, Error> {
    compare_values(Some(a), CompareOp::Eq, Some(b), env, CompareMode::Lenient)
}
