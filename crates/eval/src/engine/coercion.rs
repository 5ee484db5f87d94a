//! Conversions from model values to strings and booleans, plus emptiness.

use crate::engine::runtime::{Environment, Error, ErrorCode};
use crate::engine::temporal::{format_with_setting, unknown_kind};
use crate::value::{DateKind, DateValue, Number, Value};
use rust_decimal::RoundingStrategy;
use std::sync::Arc;

/// How numbers are rendered when a template prints them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NumberFormat {
    /// Locale dependent: digit grouping, at most three fraction digits, half-even rounding.
    #[default]
    Number,
    /// Locale independent "computer" format, as produced by `?c`.
    Computer,
}

/// `(decimal separator, grouping separator)` for a locale tag like `de-CH` or `fr_FR`.
pub fn locale_symbols(locale: &str) -> (char, char) {
    let mut parts = locale.split(['-', '_']);
    let language = parts.next().unwrap_or("").to_ascii_lowercase();
    let region = parts.next().unwrap_or("").to_ascii_uppercase();
    match (language.as_str(), region.as_str()) {
        ("de", "CH") | ("it", "CH") => ('.', '\''),
        ("de" | "es" | "it" | "nl" | "pt" | "id" | "tr" | "da", _) => (',', '.'),
        ("fr" | "ru" | "pl" | "cs" | "sv" | "fi" | "nb" | "uk", _) => (',', '\u{a0}'),
        _ => ('.', ','),
    }
}

fn group_digits(int_part: &str, grouping: char) -> String {
    let len = int_part.len();
    let mut out = String::with_capacity(len + len / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(grouping);
        }
        out.push(ch);
    }
    out
}

/// Plain decimal text (`-123.45`) rounded half-even to three fraction digits.
fn rounded_plain_text(n: &Number) -> String {
    match n.to_decimal() {
        Some(d) => {
            let r = d
                .round_dp_with_strategy(3, RoundingStrategy::MidpointNearestEven)
                .normalize();
            if r.is_zero() { "0".to_string() } else { r.to_string() }
        }
        None => {
            let text = format!("{:.3}", n.to_f64());
            let text = text.trim_end_matches('0').trim_end_matches('.');
            if text == "-0" { "0".to_string() } else { text.to_string() }
        }
    }
}

/// Locale dependent rendering used for `NumberFormat::Number`.
pub fn format_locale_number(n: &Number, locale: &str) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        let sign = if n.signum() < 0 { "-" } else { "" };
        return format!("{sign}\u{221e}");
    }
    let (decimal, grouping) = locale_symbols(locale);
    let text = rounded_plain_text(n);
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.as_str()),
    };
    let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));
    let mut out = String::new();
    if negative {
        out.push('-');
    }
    out.push_str(&group_digits(int_part, grouping));
    if !frac_part.is_empty() {
        out.push(decimal);
        out.push_str(frac_part);
    }
    out
}

/// Locale independent rendering: no grouping, `.` separator, `INF`/`-INF`/`NaN`.
pub fn format_computer_number(n: &Number) -> String {
    match n {
        Number::Int(i) => i.to_string(),
        Number::Long(l) => l.to_string(),
        Number::BigInteger(b) => b.to_string(),
        Number::Decimal(d) => {
            let d = d.normalize();
            if d.is_zero() { "0".to_string() } else { d.to_string() }
        }
        Number::Float(_) | Number::Double(_) => {
            let v = n.to_f64();
            if v.is_nan() {
                "NaN".to_string()
            } else if v.is_infinite() {
                (if v < 0.0 { "-INF" } else { "INF" }).to_string()
            } else if let Number::Float(f) = n {
                trim_float_text(f.to_string())
            } else {
                trim_float_text(v.to_string())
            }
        }
    }
}

fn trim_float_text(text: String) -> String {
    match text.as_str() {
        "-0" => "0".to_string(),
        _ => text,
    }
}

pub fn format_number(n: &Number, env: &Environment) -> String {
    match env.number_format {
        NumberFormat::Number => format_locale_number(n, &env.locale),
        NumberFormat::Computer => format_computer_number(n),
    }
}

/// Formats a date with the environment's format setting for its kind.
pub fn format_date(d: &DateValue, env: &Environment) -> Result<String, Error> {
    let setting = match d.kind {
        DateKind::Date => &env.date_format,
        DateKind::Time => &env.time_format,
        DateKind::DateTime => &env.datetime_format,
        DateKind::Unknown => return Err(unknown_kind()),
    };
    format_with_setting(d, setting, env.time_zone, env.calendar)
}

fn describe_blame(blame: Option<&str>) -> String {
    match blame {
        Some(expr) => format!("the expression `{expr}`"),
        None => "the value".to_string(),
    }
}

/// String coercion for interpolation and string-expecting operands.
///
/// Tries, in order: number, date, string, boolean. Booleans only convert in
/// classic-compatible mode or when a boolean format is configured; undefined
/// only converts in classic-compatible mode.
pub fn coerce_to_string(
    value: Option<&Value>,
    env: &Environment,
    blame: Option<&str>,
) -> Result<Arc<str>, Error> {
    let Some(value) = value else {
        if env.classic_compatible {
            return Ok(Arc::from(""));
        }
        return Err(Error::from_code(
            ErrorCode::CoercionFailure,
            format!(
                "{} is undefined and can't be converted to a string",
                describe_blame(blame)
            ),
        ));
    };
    if let Some(n) = value.as_number() {
        return Ok(format_number(&n, env).into());
    }
    if let Some(d) = value.as_date() {
        return format_date(&d, env).map(Arc::from);
    }
    if let Some(s) = value.as_string() {
        return Ok(s);
    }
    if let Some(b) = value.as_bool() {
        if env.classic_compatible {
            return Ok(Arc::from(if b { "true" } else { "" }));
        }
        if let Some((yes, no)) = &env.boolean_format {
            return Ok(Arc::from(if b { yes.as_str() } else { no.as_str() }));
        }
        return Err(Error::from_code(
            ErrorCode::CoercionFailure,
            format!(
                "{} is a boolean, which can't be converted to a string without a boolean format \
                 (use ?string(\"yes\", \"no\") or ?c)",
                describe_blame(blame)
            ),
        ));
    }
    Err(Error::from_code(
        ErrorCode::CoercionFailure,
        format!(
            "expected string, number, date or boolean, but {} has evaluated to {}",
            describe_blame(blame),
            value.type_description()
        ),
    ))
}

/// Emptiness test used by `??`-style checks and classic boolean coercion.
pub fn is_empty(value: Option<&Value>) -> bool {
    let Some(value) = value else {
        return true;
    };
    if let Value::Host(h) = value {
        return h.is_empty();
    }
    if let Some(items) = value.as_sequence() {
        return items.is_empty();
    }
    if let Some(s) = value.as_string() {
        return s.is_empty();
    }
    if let Some(items) = value.as_collection() {
        return items.is_empty();
    }
    if let Some(map) = value.as_hash() {
        return map.is_empty();
    }
    !(value.as_number().is_some() || value.as_date().is_some() || value.as_bool().is_some())
}

pub fn coerce_to_bool(
    value: Option<&Value>,
    env: &Environment,
    blame: Option<&str>,
) -> Result<bool, Error> {
    if let Some(b) = value.and_then(Value::as_bool) {
        return Ok(b);
    }
    if env.classic_compatible {
        return Ok(!is_empty(value));
    }
    let found = value.map_or_else(|| "undefined".to_string(), Value::type_description);
    Err(Error::from_code(
        ErrorCode::CoercionFailure,
        format!(
            "expected a boolean, but {} has evaluated to {found}",
            describe_blame(blame)
        ),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    #[test]
    fn locale_grouping_and_rounding() {
        let n = Number::Decimal(Decimal::from_str("1234567.12351").unwrap());
        assert_eq!(format_locale_number(&n, "en-US"), "1,234,567.124");
        assert_eq!(format_locale_number(&n, "de-DE"), "1.234.567,124");
        assert_eq!(format_locale_number(&Number::Double(0.0625), "en"), "0.062");
        assert_eq!(format_locale_number(&Number::Int(-1000), "de-CH"), "-1'000");
    }

    #[test]
    fn computer_format_specials() {
        assert_eq!(format_computer_number(&Number::Double(f64::INFINITY)), "INF");
        assert_eq!(format_computer_number(&Number::Double(f64::NAN)), "NaN");
        assert_eq!(format_computer_number(&Number::Double(1.5)), "1.5");
        assert_eq!(format_computer_number(&Number::Double(3.0)), "3");
    }

    #[test]
    fn scalars_are_never_empty() {
        assert!(!is_empty(Some(&Value::from(0))));
        assert!(!is_empty(Some(&Value::from(false))));
        assert!(is_empty(Some(&Value::from(""))));
        assert!(is_empty(None));
    }
}
