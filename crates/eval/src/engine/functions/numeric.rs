use super::{BuiltinCall, BuiltinRegistry};
use crate::engine::arithmetic::optimize_integral;
use crate::engine::coercion::format_computer_number;
use crate::engine::runtime::{Error, ErrorCode};
use crate::value::{Evaluated, Number, Value};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

#[derive(Debug, Clone, Copy)]
enum Rounding {
    /// Half goes toward positive infinity.
    HalfUp,
    Floor,
    Ceiling,
}

impl Rounding {
    fn apply_decimal(self, d: Decimal) -> Decimal {
        match self {
            // Near the top of the range there is no fraction left to round.
            Rounding::HalfUp => d.checked_add(Decimal::new(5, 1)).map_or(d, |v| v.floor()),
            Rounding::Floor => d.floor(),
            Rounding::Ceiling => d.ceil(),
        }
    }

    fn apply_f64(self, v: f64) -> f64 {
        match self {
            Rounding::HalfUp => (v + 0.5).floor(),
            Rounding::Floor => v.floor(),
            Rounding::Ceiling => v.ceil(),
        }
    }
}

fn not_finite(call: &BuiltinCall<'_>, n: &Number) -> Error {
    call.error(
        ErrorCode::ArithmeticFailure,
        format!("can't round {}", format_computer_number(n)),
    )
}

/// Rounds to a whole number, keeping the narrowest integral representation.
fn round_with(call: &BuiltinCall<'_>, n: Number, mode: Rounding) -> Result<Number, Error> {
    match n {
        Number::Int(_) | Number::Long(_) | Number::BigInteger(_) => Ok(n),
        Number::Decimal(d) => Ok(optimize_integral(mode.apply_decimal(d))),
        Number::Float(_) | Number::Double(_) => {
            if n.is_nan() || n.is_infinite() {
                return Err(not_finite(call, &n));
            }
            if let Some(d) = n.to_decimal() {
                return Ok(optimize_integral(mode.apply_decimal(d)));
            }
            let rounded = mode.apply_f64(n.to_f64());
            Ok(Decimal::from_f64_retain(rounded)
                .map_or(Number::Double(rounded), optimize_integral))
        }
    }
}

fn rounding_builtin(reg: &mut BuiltinRegistry, name: &str, mode: Rounding) {
    reg.register(name, 0, move |call, target, _args| {
        let n = call.target_number(target)?;
        round_with(call, n, mode).map(|r| Some(Value::Number(r)))
    });
}

pub(super) fn abs_fn(call: &BuiltinCall<'_>, target: &Value, _args: &[Value]) -> Result<Evaluated, Error> {
    let n = call.target_number(target)?;
    let abs = match n {
        Number::Int(i) => i.checked_abs().map_or(Number::Long(-i64::from(i)), Number::Int),
        Number::Long(l) => l.checked_abs().map_or(Number::BigInteger(-i128::from(l)), Number::Long),
        Number::BigInteger(b) => Number::BigInteger(b.checked_abs().ok_or_else(|| {
            call.error(ErrorCode::ArithmeticFailure, "integer overflow in ?abs")
        })?),
        Number::Decimal(d) => Number::Decimal(d.abs()),
        Number::Float(f) => Number::Float(f.abs()),
        Number::Double(d) => Number::Double(d.abs()),
    };
    Ok(Some(Value::Number(abs)))
}

/// `?int`: truncation toward zero into a 32 bit integer.
pub(super) fn int_fn(call: &BuiltinCall<'_>, target: &Value, _args: &[Value]) -> Result<Evaluated, Error> {
    let n = call.target_number(target)?;
    let truncated = match n {
        Number::Int(i) => Some(i),
        Number::Long(l) => i32::try_from(l).ok(),
        Number::BigInteger(b) => i32::try_from(b).ok(),
        Number::Decimal(d) => d.trunc().to_i32(),
        Number::Float(_) | Number::Double(_) => {
            let v = n.to_f64().trunc();
            (v.is_finite() && v >= f64::from(i32::MIN) && v <= f64::from(i32::MAX)).then_some(v as i32)
        }
    };
    truncated.map(|i| Some(Value::from(i))).ok_or_else(|| {
        call.error(
            ErrorCode::ArithmeticFailure,
            format!("{} doesn't fit into a 32 bit integer", format_computer_number(&n)),
        )
    })
}

/// `?c`: numbers in computer format, booleans as `true`/`false`.
pub(super) fn c_fn(call: &BuiltinCall<'_>, target: &Value, _args: &[Value]) -> Result<Evaluated, Error> {
    if let Some(n) = target.as_number() {
        return Ok(Some(Value::from(format_computer_number(&n))));
    }
    if let Some(b) = target.as_bool() {
        return Ok(Some(Value::from(if b { "true" } else { "false" })));
    }
    Err(call.error(
        ErrorCode::CoercionFailure,
        format!("expected a number or boolean, but the target is {}", target.type_description()),
    ))
}

pub(super) fn register(reg: &mut BuiltinRegistry) {
    reg.register("abs", 0, abs_fn);
    rounding_builtin(reg, "round", Rounding::HalfUp);
    rounding_builtin(reg, "floor", Rounding::Floor);
    rounding_builtin(reg, "ceiling", Rounding::Ceiling);
    reg.register("int", 0, int_fn);
    reg.register("is_nan", 0, |call, target, _| {
        Ok(Some(Value::from(call.target_number(target)?.is_nan())))
    });
    reg.register("is_infinite", 0, |call, target, _| {
        Ok(Some(Value::from(call.target_number(target)?.is_infinite())))
    });
    reg.register("c", 0, c_fn);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn half_rounds_toward_positive_infinity() {
        let d = |s: &str| s.parse::<Decimal>().unwrap();
        assert_eq!(Rounding::HalfUp.apply_decimal(d("1.5")), d("2"));
        assert_eq!(Rounding::HalfUp.apply_decimal(d("-1.5")), d("-1"));
        assert_eq!(Rounding::HalfUp.apply_f64(-2.5), -2.0);
        assert_eq!(Rounding::Ceiling.apply_decimal(d("-0.2")), d("0"));
    }
}
