//! Date built-ins: kind conversion, string parsing and the `iso_*` family.

use super::{BuiltinCall, BuiltinRegistry};
use crate::engine::runtime::{Error, ErrorCode};
use crate::engine::temporal::{
    Accuracy, DateFormatSpec, Dialect, FormatOptions, TimeZoneSpec, format_iso8601,
    parse_iso8601_date, parse_iso8601_datetime, parse_iso8601_time, parse_xs_date,
    parse_xs_datetime, parse_xs_time, resolve_time_zone,
};
use crate::value::{DateKind, DateValue, Evaluated, Value};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};

fn parse_with_pattern(
    call: &BuiltinCall<'_>,
    input: &str,
    pattern: &str,
    kind: DateKind,
) -> Result<DateValue, Error> {
    let failed = |e: chrono::ParseError| {
        call.error(
            ErrorCode::ParseFailure,
            format!("can't parse {input:?} with the pattern {pattern:?}: {e}"),
        )
    };
    let local: NaiveDateTime = match kind {
        DateKind::Date => NaiveDate::parse_from_str(input, pattern)
            .map_err(failed)?
            .and_time(NaiveTime::default()),
        DateKind::Time => NaiveDate::default().and_time(NaiveTime::parse_from_str(input, pattern).map_err(failed)?),
        _ => NaiveDateTime::parse_from_str(input, pattern).map_err(failed)?,
    };
    let offset = call.env.time_zone.offset_for_local(&local);
    let instant = offset
        .from_local_datetime(&local)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| call.error(ErrorCode::ParseFailure, format!("{input:?} is not a valid local time")))?;
    Ok(DateValue::new(instant, kind))
}

/// Parses `input` as a value of `kind` using a format setting (`xs`, `iso` or a pattern).
fn parse_date_string(
    call: &BuiltinCall<'_>,
    input: &str,
    setting: &str,
    kind: DateKind,
) -> Result<DateValue, Error> {
    let env = call.env;
    let tz = &env.time_zone;
    let parsed = match DateFormatSpec::parse(setting).map_err(|e| e.at(call.location))? {
        DateFormatSpec::Dialect { dialect: Dialect::Xs, .. } => match kind {
            DateKind::Date => parse_xs_date(input, tz, env.calendar),
            DateKind::Time => parse_xs_time(input, tz),
            _ => parse_xs_datetime(input, tz, env.calendar),
        },
        DateFormatSpec::Dialect { dialect: Dialect::Iso8601, .. } => match kind {
            DateKind::Date => parse_iso8601_date(input, tz, env.calendar),
            DateKind::Time => parse_iso8601_time(input, tz),
            _ => parse_iso8601_datetime(input, tz, env.calendar),
        },
        DateFormatSpec::Pattern(pattern) => parse_with_pattern(call, input, &pattern, kind),
    };
    parsed.map_err(|e| e.at(call.location))
}

/// `?date`, `?time`, `?datetime`: marks a date value's kind, or parses a string.
fn to_kind(call: &BuiltinCall<'_>, target: &Value, args: &[Value], kind: DateKind) -> Result<Evaluated, Error> {
    if let Some(d) = target.as_date() {
        if !args.is_empty() {
            return Err(call.error(
                ErrorCode::ArgumentCount,
                "no format argument is allowed when the target is already a date",
            ));
        }
        return Ok(Some(Value::Date(d.with_kind(kind))));
    }
    let Some(input) = target.as_string() else {
        return Err(call.error(
            ErrorCode::CoercionFailure,
            format!("expected a string or date, but the target is {}", target.type_description()),
        ));
    };
    let setting = match call.opt_string_arg(args, 0)? {
        Some(s) => s.to_string(),
        None => match kind {
            DateKind::Date => call.env.date_format.clone(),
            DateKind::Time => call.env.time_format.clone(),
            _ => call.env.datetime_format.clone(),
        },
    };
    parse_date_string(call, input.trim(), &setting, kind).map(|d| Some(Value::Date(d)))
}

fn target_date(call: &BuiltinCall<'_>, target: &Value) -> Result<DateValue, Error> {
    target.as_date().ok_or_else(|| {
        call.error(
            ErrorCode::CoercionFailure,
            format!("expected a date, but the target is {}", target.type_description()),
        )
    })
}

fn if_unknown(call: &BuiltinCall<'_>, target: &Value, kind: DateKind) -> Result<Evaluated, Error> {
    let d = target_date(call, target)?;
    let d = if d.kind == DateKind::Unknown { d.with_kind(kind) } else { d };
    Ok(Some(Value::Date(d)))
}

/// Where the `iso_*` built-ins take their zone from.
#[derive(Debug, Clone, Copy)]
enum IsoZone {
    Utc,
    Local,
    Argument,
}

fn iso_fn(
    call: &BuiltinCall<'_>,
    target: &Value,
    args: &[Value],
    zone: IsoZone,
    accuracy: Accuracy,
    show_offset: Option<bool>,
) -> Result<Evaluated, Error> {
    let d = target_date(call, target)?;
    let tz = match zone {
        IsoZone::Utc => TimeZoneSpec::Utc,
        IsoZone::Local => call.env.time_zone,
        IsoZone::Argument => {
            let name = call.string_arg(args, 0)?;
            resolve_time_zone(&name).map_err(|e| e.at(call.location))?
        }
    };
    let opts = FormatOptions::for_kind(d.kind, tz)
        .map_err(|e| e.at(call.location))?
        .with_accuracy(accuracy)
        .with_offset(show_offset)
        .with_calendar(call.env.calendar);
    Ok(Some(Value::from(format_iso8601(&d, &opts))))
}

fn register_iso_family(reg: &mut BuiltinRegistry) {
    const VARIANTS: [(&str, Accuracy, Option<bool>); 8] = [
        ("", Accuracy::Seconds, None),
        ("_nz", Accuracy::Seconds, Some(false)),
        ("_ms", Accuracy::Milliseconds, None),
        ("_ms_nz", Accuracy::Milliseconds, Some(false)),
        ("_m", Accuracy::Minutes, None),
        ("_m_nz", Accuracy::Minutes, Some(false)),
        ("_h", Accuracy::Hours, None),
        ("_h_nz", Accuracy::Hours, Some(false)),
    ];
    for (suffix, accuracy, show_offset) in VARIANTS {
        for (prefix, zone, arity) in [
            ("iso_utc", IsoZone::Utc, 0),
            ("iso_local", IsoZone::Local, 0),
            ("iso", IsoZone::Argument, 1),
        ] {
            reg.register(&format!("{prefix}{suffix}"), arity, move |call, target, args| {
                iso_fn(call, target, args, zone, accuracy, show_offset)
            });
        }
    }
}

pub(super) fn register(reg: &mut BuiltinRegistry) {
    for (name, kind) in [
        ("date", DateKind::Date),
        ("time", DateKind::Time),
        ("datetime", DateKind::DateTime),
    ] {
        reg.register_range(name, 0, 1, move |call, target, args| to_kind(call, target, args, kind));
        reg.register(&format!("{name}_if_unknown"), 0, move |call, target, _| {
            if_unknown(call, target, kind)
        });
    }
    register_iso_family(reg);
}
