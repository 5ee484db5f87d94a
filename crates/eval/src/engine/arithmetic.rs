//! Pluggable numeric policies.
//!
//! [`LegacyArithmetic`] promotes both operands to the wider native
//! representation (int < long < float < double, big integer and decimal on
//! top); [`PreciseArithmetic`] normalizes everything through
//! [`rust_decimal::Decimal`] so values like `0.1` and `0.1f32` don't produce
//! floating point artifacts. Both refuse to order NaN.

use crate::consts::{PRECISE_MAX_SCALE, PRECISE_MIN_SCALE};
use crate::engine::runtime::{Error, ErrorCode};
use crate::value::Number;
use core::cmp::Ordering;
use core::fmt;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

pub trait ArithmeticEngine: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;
    fn compare_numbers(&self, first: &Number, second: &Number) -> Result<Ordering, Error>;
    fn add(&self, first: &Number, second: &Number) -> Result<Number, Error>;
    fn subtract(&self, first: &Number, second: &Number) -> Result<Number, Error>;
    fn multiply(&self, first: &Number, second: &Number) -> Result<Number, Error>;
    fn divide(&self, first: &Number, second: &Number) -> Result<Number, Error>;
    fn modulus(&self, first: &Number, second: &Number) -> Result<Number, Error>;
    /// Parse a numeric literal; the error carries the literal text.
    fn to_number(&self, literal: &str) -> Result<Number, Error>;
}

fn nan_error(first: &Number, second: &Number) -> Error {
    Error::from_code(
        ErrorCode::ArithmeticFailure,
        format!(
            "can't compare NaN: left operand is {}, right operand is {}",
            describe(first),
            describe(second)
        ),
    )
}

fn describe(n: &Number) -> String {
    match n {
        Number::Int(v) => v.to_string(),
        Number::Long(v) => v.to_string(),
        Number::Float(v) => v.to_string(),
        Number::Double(v) => v.to_string(),
        Number::BigInteger(v) => v.to_string(),
        Number::Decimal(v) => v.to_string(),
    }
}

fn overflow(op: &str) -> Error {
    Error::from_code(ErrorCode::ArithmeticFailure, format!("numeric overflow in {op}"))
}

fn division_by_zero() -> Error {
    Error::from_code(ErrorCode::ArithmeticFailure, "division by zero")
}

fn malformed_literal(literal: &str) -> Error {
    Error::from_code(
        ErrorCode::ArithmeticFailure,
        format!("can't convert this string to number: \"{literal}\""),
    )
}

/// Validates `[+-]?(digits[.digits*]|.digits)([eE][+-]?digits)?` and returns
/// the mantissa/exponent split.
fn split_literal(literal: &str) -> Option<(&str, Option<i32>)> {
    let s = literal.trim();
    let (mantissa, exponent) = match s.find(['e', 'E']) {
        Some(pos) => (&s[..pos], Some(s[pos + 1..].parse::<i32>().ok()?)),
        None => (s, None),
    };
    let digits = mantissa.strip_prefix(['+', '-']).unwrap_or(mantissa);
    let (int_part, frac_part) = match digits.split_once('.') {
        Some((i, f)) => (i, f),
        None => (digits, ""),
    };
    let all_digits = |p: &str| p.bytes().all(|b| b.is_ascii_digit());
    if (int_part.is_empty() && frac_part.is_empty()) || !all_digits(int_part) || !all_digits(frac_part)
    {
        return None;
    }
    Some((mantissa, exponent))
}

/// Parse a literal into a decimal, or a double when it exceeds decimal range.
fn parse_literal(literal: &str) -> Result<Number, Error> {
    let (mantissa, exponent) = split_literal(literal).ok_or_else(|| malformed_literal(literal))?;
    let mantissa = mantissa.strip_prefix('+').unwrap_or(mantissa);
    let parsed = match exponent {
        None => mantissa.parse::<Decimal>().ok(),
        Some(exp) => {
            let m = if mantissa.ends_with('.') {
                &mantissa[..mantissa.len() - 1]
            } else {
                mantissa
            };
            Decimal::from_scientific(&format!("{m}e{exp}")).ok()
        }
    };
    match parsed {
        Some(d) => Ok(Number::Decimal(d)),
        None => literal
            .trim()
            .parse::<f64>()
            .map(Number::Double)
            .map_err(|_| malformed_literal(literal)),
    }
}

/// Narrowest integral representation of an integral decimal.
pub(crate) fn optimize_integral(d: Decimal) -> Number {
    if d.fract().is_zero() {
        if let Some(i) = d.to_i32() {
            return Number::Int(i);
        }
        if let Some(l) = d.to_i64() {
            return Number::Long(l);
        }
        if let Some(b) = d.to_i128() {
            return Number::BigInteger(b);
        }
    }
    Number::Decimal(d)
}

/// Narrow a number to an exact `i32`, as required by index and size arguments.
pub fn to_exact_integer(n: &Number) -> Result<i32, Error> {
    if n.is_nan() || n.is_infinite() {
        return Err(Error::from_code(
            ErrorCode::ArithmeticFailure,
            format!("{} can't be converted to an integer", describe(n)),
        ));
    }
    let Some(v) = n.to_i64_exact() else {
        return Err(Error::from_code(
            ErrorCode::ArithmeticFailure,
            format!(
                "{} has a fractional part or is out of range, so it can't be used as an integer",
                describe(n)
            ),
        ));
    };
    i32::try_from(v).map_err(|_| {
        Error::from_code(
            ErrorCode::ArithmeticFailure,
            format!("{v} doesn't fit into a 32 bit integer"),
        )
    })
}

/// Normalizes through `Decimal`; mirrors the classic big-decimal engine.
#[derive(Debug, Clone)]
pub struct PreciseArithmetic {
    min_scale: u32,
    max_scale: u32,
}

impl Default for PreciseArithmetic {
    fn default() -> Self {
        Self {
            min_scale: PRECISE_MIN_SCALE,
            max_scale: PRECISE_MAX_SCALE,
        }
    }
}

impl PreciseArithmetic {
    /// `min_scale` is the least number of fraction digits kept by division,
    /// `max_scale` caps the fraction digits of products.
    pub fn new(min_scale: u32, max_scale: u32) -> Self {
        Self {
            min_scale,
            max_scale: max_scale.max(min_scale),
        }
    }

    fn operands(first: &Number, second: &Number) -> Result<(Decimal, Decimal), Error> {
        let to_dec = |n: &Number| {
            n.to_decimal().ok_or_else(|| {
                Error::from_code(
                    ErrorCode::ArithmeticFailure,
                    format!("can't convert {} to a decimal number", describe(n)),
                )
            })
        };
        Ok((to_dec(first)?, to_dec(second)?))
    }
}

impl ArithmeticEngine for PreciseArithmetic {
    fn name(&self) -> &'static str {
        "precise"
    }

    fn compare_numbers(&self, first: &Number, second: &Number) -> Result<Ordering, Error> {
        if first.is_nan() || second.is_nan() {
            return Err(nan_error(first, second));
        }
        // Signs first: cheap, and lets infinities compare without conversion.
        let (s1, s2) = (first.signum(), second.signum());
        if s1 != s2 {
            return Ok(s1.cmp(&s2));
        }
        if s1 == 0 {
            return Ok(Ordering::Equal);
        }
        match (first.to_decimal(), second.to_decimal()) {
            (Some(a), Some(b)) => Ok(a.cmp(&b)),
            _ => first
                .to_f64()
                .partial_cmp(&second.to_f64())
                .ok_or_else(|| nan_error(first, second)),
        }
    }

    fn add(&self, first: &Number, second: &Number) -> Result<Number, Error> {
        let (a, b) = Self::operands(first, second)?;
        a.checked_add(b)
            .map(Number::Decimal)
            .ok_or_else(|| overflow("addition"))
    }

    fn subtract(&self, first: &Number, second: &Number) -> Result<Number, Error> {
        let (a, b) = Self::operands(first, second)?;
        a.checked_sub(b)
            .map(Number::Decimal)
            .ok_or_else(|| overflow("subtraction"))
    }

    fn multiply(&self, first: &Number, second: &Number) -> Result<Number, Error> {
        let (a, b) = Self::operands(first, second)?;
        let mut result = a.checked_mul(b).ok_or_else(|| overflow("multiplication"))?;
        if result.scale() > self.max_scale {
            result = result.round_dp_with_strategy(self.max_scale, RoundingStrategy::MidpointAwayFromZero);
        }
        Ok(Number::Decimal(result))
    }

    fn divide(&self, first: &Number, second: &Number) -> Result<Number, Error> {
        let (a, b) = Self::operands(first, second)?;
        if b.is_zero() {
            return Err(division_by_zero());
        }
        let scale = a.scale().max(b.scale()).max(self.min_scale);
        let quotient = a.checked_div(b).ok_or_else(|| overflow("division"))?;
        Ok(Number::Decimal(
            quotient.round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero),
        ))
    }

    fn modulus(&self, first: &Number, second: &Number) -> Result<Number, Error> {
        let a = truncate_to_i64(first)?;
        let b = truncate_to_i64(second)?;
        if b == 0 {
            return Err(division_by_zero());
        }
        a.checked_rem(b)
            .map(Number::Long)
            .ok_or_else(|| overflow("modulus"))
    }

    fn to_number(&self, literal: &str) -> Result<Number, Error> {
        parse_literal(literal)
    }
}

fn truncate_to_i64(n: &Number) -> Result<i64, Error> {
    match n {
        Number::Int(i) => Ok(i64::from(*i)),
        Number::Long(l) => Ok(*l),
        Number::BigInteger(b) => i64::try_from(*b).map_err(|_| overflow("modulus")),
        Number::Decimal(d) => d.trunc().to_i64().ok_or_else(|| overflow("modulus")),
        Number::Float(_) | Number::Double(_) => {
            let v = n.to_f64().trunc();
            if v.is_finite() && v.abs() < 9.2e18 {
                Ok(v as i64)
            } else {
                Err(overflow("modulus"))
            }
        }
    }
}

/// Conservative widening engine.
#[derive(Debug, Clone, Default)]
pub struct LegacyArithmetic;

/// Promotion ladder of the legacy engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Rank {
    Int,
    Long,
    Float,
    Double,
    BigInteger,
    Decimal,
}

fn rank(n: &Number) -> Rank {
    match n {
        Number::Int(_) => Rank::Int,
        Number::Long(_) => Rank::Long,
        Number::Float(_) => Rank::Float,
        Number::Double(_) => Rank::Double,
        Number::BigInteger(_) => Rank::BigInteger,
        Number::Decimal(_) => Rank::Decimal,
    }
}

fn common_rank(a: &Number, b: &Number) -> Rank {
    let (ra, rb) = (rank(a), rank(b));
    let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
    match hi {
        // float + long keeps the wider bit width
        Rank::Float if lo == Rank::Long => Rank::Double,
        // big integer + floating point must not lose the fraction
        Rank::BigInteger if matches!(lo, Rank::Float | Rank::Double) => Rank::Decimal,
        _ => hi,
    }
}

fn as_i128(n: &Number) -> i128 {
    match n {
        Number::Int(i) => i128::from(*i),
        Number::Long(l) => i128::from(*l),
        Number::BigInteger(b) => *b,
        Number::Decimal(d) => d.trunc().to_i128().unwrap_or(0),
        Number::Float(_) | Number::Double(_) => n.to_f64() as i128,
    }
}

/// Integer result in the narrowest of int/long/big integer not below `floor`.
fn integral(value: i128, floor: Rank) -> Number {
    if floor <= Rank::Int
        && let Ok(i) = i32::try_from(value)
    {
        return Number::Int(i);
    }
    if floor <= Rank::Long
        && let Ok(l) = i64::try_from(value)
    {
        return Number::Long(l);
    }
    Number::BigInteger(value)
}

impl LegacyArithmetic {
    fn decimal_pair(first: &Number, second: &Number) -> Result<(Decimal, Decimal), Error> {
        PreciseArithmetic::operands(first, second)
    }

    fn integer_op(
        first: &Number,
        second: &Number,
        rank: Rank,
        op: &str,
        f: impl Fn(i128, i128) -> Option<i128>,
    ) -> Result<Number, Error> {
        let r = f(as_i128(first), as_i128(second)).ok_or_else(|| overflow(op))?;
        Ok(integral(r, rank))
    }
}

impl ArithmeticEngine for LegacyArithmetic {
    fn name(&self) -> &'static str {
        "legacy"
    }

    fn compare_numbers(&self, first: &Number, second: &Number) -> Result<Ordering, Error> {
        if first.is_nan() || second.is_nan() {
            return Err(nan_error(first, second));
        }
        match common_rank(first, second) {
            Rank::Int | Rank::Long | Rank::BigInteger => Ok(as_i128(first).cmp(&as_i128(second))),
            Rank::Float => {
                let (a, b) = (first.to_f64() as f32, second.to_f64() as f32);
                a.partial_cmp(&b).ok_or_else(|| nan_error(first, second))
            }
            Rank::Double => first
                .to_f64()
                .partial_cmp(&second.to_f64())
                .ok_or_else(|| nan_error(first, second)),
            Rank::Decimal => match (first.to_decimal(), second.to_decimal()) {
                (Some(a), Some(b)) => Ok(a.cmp(&b)),
                _ => first
                    .to_f64()
                    .partial_cmp(&second.to_f64())
                    .ok_or_else(|| nan_error(first, second)),
            },
        }
    }

    fn add(&self, first: &Number, second: &Number) -> Result<Number, Error> {
        match common_rank(first, second) {
            r @ (Rank::Int | Rank::Long | Rank::BigInteger) => {
                Self::integer_op(first, second, r, "addition", i128::checked_add)
            }
            Rank::Float => Ok(Number::Float(first.to_f64() as f32 + second.to_f64() as f32)),
            Rank::Double => Ok(Number::Double(first.to_f64() + second.to_f64())),
            Rank::Decimal => {
                let (a, b) = Self::decimal_pair(first, second)?;
                a.checked_add(b).map(Number::Decimal).ok_or_else(|| overflow("addition"))
            }
        }
    }

    fn subtract(&self, first: &Number, second: &Number) -> Result<Number, Error> {
        match common_rank(first, second) {
            r @ (Rank::Int | Rank::Long | Rank::BigInteger) => {
                Self::integer_op(first, second, r, "subtraction", i128::checked_sub)
            }
            Rank::Float => Ok(Number::Float(first.to_f64() as f32 - second.to_f64() as f32)),
            Rank::Double => Ok(Number::Double(first.to_f64() - second.to_f64())),
            Rank::Decimal => {
                let (a, b) = Self::decimal_pair(first, second)?;
                a.checked_sub(b).map(Number::Decimal).ok_or_else(|| overflow("subtraction"))
            }
        }
    }

    fn multiply(&self, first: &Number, second: &Number) -> Result<Number, Error> {
        match common_rank(first, second) {
            r @ (Rank::Int | Rank::Long | Rank::BigInteger) => {
                Self::integer_op(first, second, r, "multiplication", i128::checked_mul)
            }
            Rank::Float => Ok(Number::Float(first.to_f64() as f32 * second.to_f64() as f32)),
            Rank::Double => Ok(Number::Double(first.to_f64() * second.to_f64())),
            Rank::Decimal => {
                let (a, b) = Self::decimal_pair(first, second)?;
                a.checked_mul(b).map(Number::Decimal).ok_or_else(|| overflow("multiplication"))
            }
        }
    }

    fn divide(&self, first: &Number, second: &Number) -> Result<Number, Error> {
        match common_rank(first, second) {
            r @ (Rank::Int | Rank::Long) => {
                let (a, b) = (as_i128(first), as_i128(second));
                if b == 0 {
                    return Err(division_by_zero());
                }
                if a % b == 0 {
                    Ok(integral(a / b, r))
                } else {
                    Ok(Number::Double(a as f64 / b as f64))
                }
            }
            Rank::BigInteger => {
                let (a, b) = (as_i128(first), as_i128(second));
                if b == 0 {
                    return Err(division_by_zero());
                }
                if a % b == 0 {
                    Ok(Number::BigInteger(a / b))
                } else {
                    PreciseArithmetic::default().divide(first, second)
                }
            }
            Rank::Float => Ok(Number::Float(first.to_f64() as f32 / second.to_f64() as f32)),
            Rank::Double => Ok(Number::Double(first.to_f64() / second.to_f64())),
            Rank::Decimal => PreciseArithmetic::default().divide(first, second),
        }
    }

    fn modulus(&self, first: &Number, second: &Number) -> Result<Number, Error> {
        match common_rank(first, second) {
            r @ (Rank::Int | Rank::Long | Rank::BigInteger) => {
                let (a, b) = (as_i128(first), as_i128(second));
                if b == 0 {
                    return Err(division_by_zero());
                }
                let rem = a.checked_rem(b).ok_or_else(|| overflow("modulus"))?;
                Ok(integral(rem, r))
            }
            Rank::Float => Ok(Number::Float(first.to_f64() as f32 % second.to_f64() as f32)),
            Rank::Double => Ok(Number::Double(first.to_f64() % second.to_f64())),
            Rank::Decimal => Err(Error::from_code(
                ErrorCode::UnsupportedOperation,
                "can't calculate remainder on decimals",
            )),
        }
    }

    fn to_number(&self, literal: &str) -> Result<Number, Error> {
        match parse_literal(literal)? {
            Number::Decimal(d) => Ok(optimize_integral(d)),
            other => Ok(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_grammar() {
        assert!(split_literal("1.5e3").is_some());
        assert!(split_literal("-.5").is_some());
        assert!(split_literal("5.").is_some());
        assert!(split_literal(".").is_none());
        assert!(split_literal("1,5").is_none());
        assert!(split_literal("1e").is_none());
    }

    #[test]
    fn legacy_int_overflow_widens_to_long() {
        let r = LegacyArithmetic
            .add(&Number::Int(i32::MAX), &Number::Int(1))
            .unwrap();
        assert_eq!(r, Number::Long(i64::from(i32::MAX) + 1));
    }

    #[test]
    fn float_with_long_promotes_to_double() {
        assert_eq!(common_rank(&Number::Float(1.0), &Number::Long(1)), Rank::Double);
        assert_eq!(
            common_rank(&Number::BigInteger(1), &Number::Double(1.0)),
            Rank::Decimal
        );
    }
}
