//! Expression nodes and their evaluation against an [`Environment`].

use crate::engine::arithmetic::to_exact_integer;
use crate::engine::coercion::{coerce_to_bool, coerce_to_string};
use crate::engine::comparison::{CompareMode, CompareOp, compare_values};
use crate::engine::functions::BuiltinCall;
use crate::engine::runtime::{Environment, Error, ErrorCode, SourceLocation};
use crate::value::{Evaluated, Number, Value};
use core::fmt;
use indexmap::IndexMap;
use std::sync::{Arc, OnceLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithmeticOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulus,
}

impl ArithmeticOp {
    pub fn symbol(self) -> &'static str {
        match self {
            ArithmeticOp::Add => "+",
            ArithmeticOp::Subtract => "-",
            ArithmeticOp::Multiply => "*",
            ArithmeticOp::Divide => "/",
            ArithmeticOp::Modulus => "%",
        }
    }
}

impl fmt::Display for ArithmeticOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug)]
pub enum ExprKind {
    String(Arc<str>),
    Number(Number),
    /// Numeric literal text, converted by the environment's arithmetic engine.
    NumberText(Arc<str>),
    Boolean(bool),
    Sequence(Vec<Expr>),
    Hash(Vec<(Expr, Expr)>),
    Variable(String),
    /// `target.key`
    Dot { target: Box<Expr>, key: String },
    /// `target[key]`
    Index { target: Box<Expr>, key: Box<Expr> },
    /// `target?name` or `target?name(args)`
    Builtin {
        target: Box<Expr>,
        name: String,
        args: Vec<Expr>,
    },
    Compare {
        left: Box<Expr>,
        op: CompareOp,
        right: Box<Expr>,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Arithmetic {
        left: Box<Expr>,
        op: ArithmeticOp,
        right: Box<Expr>,
    },
    Negate(Box<Expr>),
    /// `target!fallback`, or `target!` without a fallback.
    Default {
        target: Box<Expr>,
        fallback: Option<Box<Expr>>,
    },
    /// `target??`
    Exists(Box<Expr>),
    Parenthesized(Box<Expr>),
}

/// An immutable expression node.
///
/// Nodes whose value can't depend on the environment compute it once, when
/// constructed; evaluating them returns that value.
#[derive(Debug)]
pub struct Expr {
    kind: ExprKind,
    location: SourceLocation,
    constant: OnceLock<Value>,
}

fn constant_value(kind: &ExprKind) -> Option<Value> {
    match kind {
        ExprKind::String(s) => Some(Value::String(s.clone())),
        ExprKind::Number(n) => Some(Value::Number(*n)),
        ExprKind::Boolean(b) => Some(Value::Boolean(*b)),
        ExprKind::Sequence(items) => items
            .iter()
            .map(|e| e.constant.get().cloned())
            .collect::<Option<Vec<_>>>()
            .map(Value::sequence),
        ExprKind::Hash(entries) => {
            let mut map = IndexMap::with_capacity(entries.len());
            for (k, v) in entries {
                let key = k.constant.get()?.as_string()?;
                map.insert(key.to_string(), v.constant.get()?.clone());
            }
            Some(Value::hash(map))
        }
        ExprKind::Not(inner) => inner
            .constant
            .get()
            .and_then(Value::as_bool)
            .map(|b| Value::Boolean(!b)),
        ExprKind::Parenthesized(inner) => inner.constant.get().cloned(),
        _ => None,
    }
}

impl Expr {
    pub fn new(kind: ExprKind, location: SourceLocation) -> Self {
        let constant = OnceLock::new();
        if let Some(v) = constant_value(&kind) {
            let _ = constant.set(v);
        }
        Self {
            kind,
            location,
            constant,
        }
    }

    fn unlocated(kind: ExprKind) -> Self {
        Self::new(kind, SourceLocation::default())
    }

    #[must_use]
    pub fn at(mut self, line: u32, column: u32) -> Self {
        self.location = SourceLocation::new(line, column);
        self
    }

    pub fn kind(&self) -> &ExprKind {
        &self.kind
    }

    pub fn location(&self) -> SourceLocation {
        self.location
    }

    /// The value computed at construction, if the node is constant.
    pub fn constant(&self) -> Option<&Value> {
        self.constant.get()
    }

    pub fn string(s: impl Into<Arc<str>>) -> Self {
        Self::unlocated(ExprKind::String(s.into()))
    }

    pub fn number(n: impl Into<Number>) -> Self {
        Self::unlocated(ExprKind::Number(n.into()))
    }

    pub fn number_text(text: impl Into<Arc<str>>) -> Self {
        Self::unlocated(ExprKind::NumberText(text.into()))
    }

    pub fn boolean(b: bool) -> Self {
        Self::unlocated(ExprKind::Boolean(b))
    }

    pub fn sequence(items: Vec<Expr>) -> Self {
        Self::unlocated(ExprKind::Sequence(items))
    }

    pub fn hash(entries: Vec<(Expr, Expr)>) -> Self {
        Self::unlocated(ExprKind::Hash(entries))
    }

    pub fn variable(name: impl Into<String>) -> Self {
        Self::unlocated(ExprKind::Variable(name.into()))
    }

    pub fn dot(target: Expr, key: impl Into<String>) -> Self {
        Self::unlocated(ExprKind::Dot {
            target: Box::new(target),
            key: key.into(),
        })
    }

    pub fn index(target: Expr, key: Expr) -> Self {
        Self::unlocated(ExprKind::Index {
            target: Box::new(target),
            key: Box::new(key),
        })
    }

    pub fn builtin(target: Expr, name: impl Into<String>, args: Vec<Expr>) -> Self {
        Self::unlocated(ExprKind::Builtin {
            target: Box::new(target),
            name: name.into(),
            args,
        })
    }

    pub fn compare(left: Expr, op: CompareOp, right: Expr) -> Self {
        Self::unlocated(ExprKind::Compare {
            left: Box::new(left),
            op,
            right: Box::new(right),
        })
    }

    pub fn and(left: Expr, right: Expr) -> Self {
        Self::unlocated(ExprKind::And(Box::new(left), Box::new(right)))
    }

    pub fn or(left: Expr, right: Expr) -> Self {
        Self::unlocated(ExprKind::Or(Box::new(left), Box::new(right)))
    }

    pub fn not(inner: Expr) -> Self {
        Self::unlocated(ExprKind::Not(Box::new(inner)))
    }

    pub fn arithmetic(left: Expr, op: ArithmeticOp, right: Expr) -> Self {
        Self::unlocated(ExprKind::Arithmetic {
            left: Box::new(left),
            op,
            right: Box::new(right),
        })
    }

    pub fn negate(inner: Expr) -> Self {
        Self::unlocated(ExprKind::Negate(Box::new(inner)))
    }

    pub fn default_to(target: Expr, fallback: Option<Expr>) -> Self {
        Self::unlocated(ExprKind::Default {
            target: Box::new(target),
            fallback: fallback.map(Box::new),
        })
    }

    pub fn exists(target: Expr) -> Self {
        Self::unlocated(ExprKind::Exists(Box::new(target)))
    }

    pub fn parenthesized(inner: Expr) -> Self {
        Self::unlocated(ExprKind::Parenthesized(Box::new(inner)))
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Expr]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

/// Canonical source form, used to name expressions in error messages.
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::String(s) => write!(f, "{s:?}"),
            ExprKind::Number(n) => match n {
                Number::Int(i) => write!(f, "{i}"),
                Number::Long(l) => write!(f, "{l}"),
                Number::BigInteger(b) => write!(f, "{b}"),
                Number::Decimal(d) => write!(f, "{d}"),
                Number::Float(v) => write!(f, "{v}"),
                Number::Double(v) => write!(f, "{v}"),
            },
            ExprKind::NumberText(t) => f.write_str(t),
            ExprKind::Boolean(b) => write!(f, "{b}"),
            ExprKind::Sequence(items) => {
                f.write_str("[")?;
                write_list(f, items)?;
                f.write_str("]")
            }
            ExprKind::Hash(entries) => {
                f.write_str("{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                f.write_str("}")
            }
            ExprKind::Variable(name) => f.write_str(name),
            ExprKind::Dot { target, key } => write!(f, "{target}.{key}"),
            ExprKind::Index { target, key } => write!(f, "{target}[{key}]"),
            ExprKind::Builtin { target, name, args } => {
                write!(f, "{target}?{name}")?;
                if !args.is_empty() {
                    f.write_str("(")?;
                    write_list(f, args)?;
                    f.write_str(")")?;
                }
                Ok(())
            }
            ExprKind::Compare { left, op, right } => write!(f, "{left} {op} {right}"),
            ExprKind::And(l, r) => write!(f, "{l} && {r}"),
            ExprKind::Or(l, r) => write!(f, "{l} || {r}"),
            ExprKind::Not(inner) => write!(f, "!{inner}"),
            ExprKind::Arithmetic { left, op, right } => write!(f, "{left} {op} {right}"),
            ExprKind::Negate(inner) => write!(f, "-{inner}"),
            ExprKind::Default { target, fallback } => match fallback {
                Some(fb) => write!(f, "{target}!{fb}"),
                None => write!(f, "{target}!"),
            },
            ExprKind::Exists(target) => write!(f, "{target}??"),
            ExprKind::Parenthesized(inner) => write!(f, "({inner})"),
        }
    }
}

fn undefined_error(expr: &Expr) -> Error {
    Error::from_code(
        ErrorCode::InvalidReference,
        format!("the following has evaluated to undefined: {expr}"),
    )
    .at(Some(expr.location))
}

/// Evaluates `expr`; `Ok(None)` is the undefined marker.
pub fn evaluate(expr: &Expr, env: &Environment) -> Result<Evaluated, Error> {
    eval(expr, env, false).map_err(|e| e.at(Some(expr.location)))
}

/// Like [`evaluate`], but undefined is an error.
pub fn evaluate_to_value(expr: &Expr, env: &Environment) -> Result<Value, Error> {
    evaluate(expr, env)?.ok_or_else(|| undefined_error(expr))
}

/// Evaluates a condition.
pub fn evaluate_to_bool(expr: &Expr, env: &Environment) -> Result<bool, Error> {
    let v = evaluate(expr, env)?;
    let blame = expr.to_string();
    coerce_to_bool(v.as_ref(), env, Some(&blame)).map_err(|e| e.at(Some(expr.location)))
}

/// Evaluates an interpolation, `${expr}`.
pub fn evaluate_to_string(expr: &Expr, env: &Environment) -> Result<Arc<str>, Error> {
    let v = evaluate(expr, env)?;
    let blame = expr.to_string();
    coerce_to_string(v.as_ref(), env, Some(&blame)).map_err(|e| e.at(Some(expr.location)))
}

fn required(expr: &Expr, env: &Environment) -> Result<Value, Error> {
    eval(expr, env, false)?.ok_or_else(|| undefined_error(expr))
}

/// Core evaluation. With `lenient`, an undefined left side of `.` or `[]`
/// yields undefined instead of failing; used below `!` and `??`.
fn eval(expr: &Expr, env: &Environment, lenient: bool) -> Result<Evaluated, Error> {
    if let Some(v) = expr.constant.get() {
        return Ok(Some(v.clone()));
    }
    let loc = Some(expr.location);
    match &expr.kind {
        ExprKind::String(s) => Ok(Some(Value::String(s.clone()))),
        ExprKind::Number(n) => Ok(Some(Value::Number(*n))),
        ExprKind::Boolean(b) => Ok(Some(Value::Boolean(*b))),
        ExprKind::NumberText(text) => env
            .arithmetic
            .to_number(text)
            .map(|n| Some(Value::Number(n)))
            .map_err(|e| e.at(loc)),
        ExprKind::Sequence(items) => {
            let values = items
                .iter()
                .map(|item| required(item, env))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Some(Value::sequence(values)))
        }
        ExprKind::Hash(entries) => {
            let mut map = IndexMap::with_capacity(entries.len());
            for (k, v) in entries {
                let key = required(k, env)?;
                let Some(key) = key.as_string() else {
                    return Err(Error::from_code(
                        ErrorCode::CoercionFailure,
                        format!("hash keys must be strings, but {k} is {}", key.type_description()),
                    )
                    .at(Some(k.location)));
                };
                map.insert(key.to_string(), required(v, env)?);
            }
            Ok(Some(Value::hash(map)))
        }
        ExprKind::Variable(name) => Ok(env.variable(name)),
        ExprKind::Dot { target, key } => {
            let Some(t) = eval(target, env, lenient)? else {
                return if lenient { Ok(None) } else { Err(undefined_error(target)) };
            };
            let Some(map) = t.as_hash() else {
                return Err(Error::from_code(
                    ErrorCode::CoercionFailure,
                    format!("expected a hash, but {target} has evaluated to {}", t.type_description()),
                )
                .at(loc));
            };
            Ok(map.get(key).cloned())
        }
        ExprKind::Index { target, key } => {
            let Some(t) = eval(target, env, lenient)? else {
                return if lenient { Ok(None) } else { Err(undefined_error(target)) };
            };
            let k = required(key, env)?;
            index_value(&t, &k, target, key)
        }
        ExprKind::Builtin { target, name, args } => {
            let t = required(target, env)?;
            let args = args
                .iter()
                .map(|a| required(a, env))
                .collect::<Result<Vec<_>, _>>()?;
            let call = BuiltinCall::new(env, name).at(expr.location);
            env.builtins.call(&call, &t, &args)
        }
        ExprKind::Compare { left, op, right } => {
            let l = eval(left, env, false)?;
            let r = eval(right, env, false)?;
            compare_values(l.as_ref(), *op, r.as_ref(), env, CompareMode::Strict)
                .map(|b| Some(Value::Boolean(b)))
                .map_err(|e| e.at(loc))
        }
        ExprKind::And(l, r) => {
            Ok(Some(Value::Boolean(evaluate_to_bool(l, env)? && evaluate_to_bool(r, env)?)))
        }
        ExprKind::Or(l, r) => {
            Ok(Some(Value::Boolean(evaluate_to_bool(l, env)? || evaluate_to_bool(r, env)?)))
        }
        ExprKind::Not(inner) => Ok(Some(Value::Boolean(!evaluate_to_bool(inner, env)?))),
        ExprKind::Arithmetic { left, op, right } => {
            arithmetic(left, *op, right, env).map(Some).map_err(|e| e.at(loc))
        }
        ExprKind::Negate(inner) => {
            let v = required(inner, env)?;
            let n = number_operand(&v, inner)?;
            env.arithmetic
                .subtract(&Number::Int(0), &n)
                .map(|r| Some(Value::Number(r)))
                .map_err(|e| e.at(loc))
        }
        ExprKind::Default { target, fallback } => match eval(target, env, true)? {
            Some(v) => Ok(Some(v)),
            None => match fallback {
                Some(fb) => eval(fb, env, false),
                None => Ok(Some(Value::from(""))),
            },
        },
        ExprKind::Exists(target) => Ok(Some(Value::Boolean(eval(target, env, true)?.is_some()))),
        ExprKind::Parenthesized(inner) => eval(inner, env, lenient),
    }
}

fn index_value(target: &Value, key: &Value, target_expr: &Expr, key_expr: &Expr) -> Result<Evaluated, Error> {
    if let Some(n) = key.as_number() {
        let i = to_exact_integer(&n).map_err(|e| e.at(Some(key_expr.location)))?;
        if i < 0 {
            return Err(Error::from_code(
                ErrorCode::InvalidArgument,
                format!("negative index {i} in {target_expr}[{key_expr}]"),
            )
            .at(Some(key_expr.location)));
        }
        let i = i as usize;
        if let Some(items) = target.as_sequence() {
            return Ok(items.get(i).cloned());
        }
        if let Some(s) = target.as_string() {
            return Ok(s.chars().nth(i).map(|c| Value::from(c.to_string())));
        }
        return Err(Error::from_code(
            ErrorCode::CoercionFailure,
            format!(
                "expected a sequence or string, but {target_expr} has evaluated to {}",
                target.type_description()
            ),
        )
        .at(Some(target_expr.location)));
    }
    if let Some(k) = key.as_string() {
        if let Some(map) = target.as_hash() {
            return Ok(map.get(&*k).cloned());
        }
        return Err(Error::from_code(
            ErrorCode::CoercionFailure,
            format!(
                "expected a hash, but {target_expr} has evaluated to {}",
                target.type_description()
            ),
        )
        .at(Some(target_expr.location)));
    }
    Err(Error::from_code(
        ErrorCode::CoercionFailure,
        format!(
            "the key {key_expr} must be a number or string, but it has evaluated to {}",
            key.type_description()
        ),
    )
    .at(Some(key_expr.location)))
}

fn number_operand(v: &Value, expr: &Expr) -> Result<Number, Error> {
    v.as_number().ok_or_else(|| {
        Error::from_code(
            ErrorCode::CoercionFailure,
            format!("expected a number, but {expr} has evaluated to {}", v.type_description()),
        )
        .at(Some(expr.location))
    })
}

fn concatenate(l: &Value, r: &Value, left: &Expr, right: &Expr, env: &Environment) -> Result<Option<Value>, Error> {
    if let (Some(a), Some(b)) = (l.as_hash(), r.as_hash()) {
        let mut merged: IndexMap<String, Value> = IndexMap::clone(&a);
        for (k, v) in b.iter() {
            merged.insert(k.clone(), v.clone());
        }
        return Ok(Some(Value::hash(merged)));
    }
    if let (Some(a), Some(b)) = (l.as_sequence(), r.as_sequence()) {
        let joined: Vec<Value> = a.iter().chain(b.iter()).cloned().collect();
        return Ok(Some(Value::sequence(joined)));
    }
    if l.as_string().is_some() || r.as_string().is_some() {
        let a = coerce_to_string(Some(l), env, Some(&left.to_string()))?;
        let b = coerce_to_string(Some(r), env, Some(&right.to_string()))?;
        let mut s = String::with_capacity(a.len() + b.len());
        s.push_str(&a);
        s.push_str(&b);
        return Ok(Some(Value::from(s)));
    }
    Ok(None)
}

fn arithmetic(left: &Expr, op: ArithmeticOp, right: &Expr, env: &Environment) -> Result<Value, Error> {
    let empty = Value::from("");
    let l = match eval(left, env, false)? {
        Some(v) => v,
        None if op == ArithmeticOp::Add && env.classic_compatible => empty.clone(),
        None => return Err(undefined_error(left)),
    };
    let r = match eval(right, env, false)? {
        Some(v) => v,
        None if op == ArithmeticOp::Add && env.classic_compatible => empty,
        None => return Err(undefined_error(right)),
    };
    if op == ArithmeticOp::Add {
        if let (Some(a), Some(b)) = (l.as_number(), r.as_number()) {
            return env.arithmetic.add(&a, &b).map(Value::Number);
        }
        if let Some(v) = concatenate(&l, &r, left, right, env)? {
            return Ok(v);
        }
        return Err(Error::from_code(
            ErrorCode::CoercionFailure,
            format!(
                "can't add {} to {}: the operands must be numbers, strings, sequences or hashes",
                r.type_description(),
                l.type_description()
            ),
        ));
    }
    let a = number_operand(&l, left)?;
    let b = number_operand(&r, right)?;
    let engine = &env.arithmetic;
    let result = match op {
        ArithmeticOp::Add => engine.add(&a, &b),
        ArithmeticOp::Subtract => engine.subtract(&a, &b),
        ArithmeticOp::Multiply => engine.multiply(&a, &b),
        ArithmeticOp::Divide => engine.divide(&a, &b),
        ArithmeticOp::Modulus => engine.modulus(&a, &b),
    };
    result.map(Value::Number)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_nodes_are_folded() {
        let seq = Expr::sequence(vec![Expr::number(1), Expr::string("a")]);
        assert!(seq.constant().is_some());
        let not = Expr::not(Expr::boolean(true));
        assert_eq!(not.constant().and_then(Value::as_bool), Some(false));
        assert!(Expr::sequence(vec![Expr::variable("x")]).constant().is_none());
    }

    #[test]
    fn display_round_trips_source_shape() {
        let e = Expr::builtin(
            Expr::dot(Expr::variable("user"), "name"),
            "replace",
            vec![Expr::string("a"), Expr::string("b")],
        );
        assert_eq!(e.to_string(), "user.name?replace(\"a\", \"b\")");
        let d = Expr::default_to(Expr::variable("x"), Some(Expr::number(0)));
        assert_eq!(d.to_string(), "x!0");
    }
}
