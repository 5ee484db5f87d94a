use super::calendar::{CalendarPolicy, split_millis};
use super::zones::TimeZoneSpec;
use super::{Accuracy, Dialect};
use crate::engine::runtime::{Error, ErrorCode};
use crate::value::{DateKind, DateValue};
use chrono::format::{Item, StrftimeItems};
use core::fmt::Write;

/// What to print and how.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatOptions {
    pub show_date: bool,
    pub show_time: bool,
    /// `None` prints the offset only when the time part is shown.
    pub show_offset: Option<bool>,
    pub accuracy: Accuracy,
    pub time_zone: TimeZoneSpec,
    pub calendar: CalendarPolicy,
}

impl FormatOptions {
    pub fn new(time_zone: TimeZoneSpec) -> Self {
        Self {
            show_date: true,
            show_time: true,
            show_offset: None,
            accuracy: Accuracy::Milliseconds,
            time_zone,
            calendar: CalendarPolicy::default(),
        }
    }

    /// Date and time parts according to the kind of the value.
    pub fn for_kind(kind: DateKind, time_zone: TimeZoneSpec) -> Result<Self, Error> {
        let (show_date, show_time) = match kind {
            DateKind::Date => (true, false),
            DateKind::Time => (false, true),
            DateKind::DateTime => (true, true),
            DateKind::Unknown => return Err(unknown_kind()),
        };
        Ok(Self {
            show_date,
            show_time,
            ..Self::new(time_zone)
        })
    }

    #[must_use]
    pub fn with_accuracy(mut self, accuracy: Accuracy) -> Self {
        self.accuracy = accuracy;
        self
    }

    #[must_use]
    pub fn with_offset(mut self, show: Option<bool>) -> Self {
        self.show_offset = show;
        self
    }

    #[must_use]
    pub fn with_calendar(mut self, calendar: CalendarPolicy) -> Self {
        self.calendar = calendar;
        self
    }
}

pub(crate) fn unknown_kind() -> Error {
    Error::from_code(
        ErrorCode::CoercionFailure,
        "can't format a date whose kind (date, time or date-time) is unknown; \
         use ?date, ?time or ?datetime to mark it",
    )
}

fn push_year(out: &mut String, astronomical: i64, dialect: Dialect) {
    let shown = match dialect {
        Dialect::Iso8601 => astronomical,
        // XML Schema has no year 0: 1 BC is written as -0001.
        Dialect::Xs if astronomical <= 0 => astronomical - 1,
        Dialect::Xs => astronomical,
    };
    if shown < 0 {
        out.push('-');
    }
    let _ = write!(out, "{:04}", shown.unsigned_abs());
}

fn push_offset(out: &mut String, offset_secs: i32) {
    if offset_secs == 0 {
        out.push('Z');
        return;
    }
    out.push(if offset_secs < 0 { '-' } else { '+' });
    let abs = offset_secs.unsigned_abs();
    let _ = write!(out, "{:02}:{:02}", abs / 3600, abs / 60 % 60);
    if abs % 60 != 0 {
        let _ = write!(out, ":{:02}", abs % 60);
    }
}

fn format_with(instant: &DateValue, opts: &FormatOptions, dialect: Dialect) -> String {
    let offset = opts.time_zone.offset_at(&instant.instant).local_minus_utc();
    let local = instant.timestamp_millis() + i64::from(offset) * 1000;
    let (days, ms_of_day) = split_millis(local);
    let mut out = String::with_capacity(29);
    if opts.show_date {
        let date = opts.calendar.from_days(days);
        push_year(&mut out, date.year, dialect);
        let _ = write!(out, "-{:02}-{:02}", date.month, date.day);
    }
    if opts.show_time {
        if opts.show_date {
            out.push('T');
        }
        let secs = ms_of_day / 1000;
        let millis = ms_of_day % 1000;
        let _ = write!(out, "{:02}", secs / 3600);
        if opts.accuracy >= Accuracy::Minutes {
            let _ = write!(out, ":{:02}", secs / 60 % 60);
            if opts.accuracy >= Accuracy::Seconds {
                let _ = write!(out, ":{:02}", secs % 60);
            }
        }
        match opts.accuracy {
            Accuracy::MillisecondsForced => {
                let _ = write!(out, ".{millis:03}");
            }
            Accuracy::Milliseconds if millis != 0 => {
                let digits = format!("{millis:03}");
                out.push('.');
                out.push_str(digits.trim_end_matches('0'));
            }
            _ => {}
        }
    }
    let wants_offset = opts.show_offset.unwrap_or(opts.show_time);
    let offset_allowed = opts.show_time || dialect == Dialect::Xs;
    if wants_offset && offset_allowed {
        push_offset(&mut out, offset);
    }
    out
}

/// ISO 8601 extended format; BC years use astronomical numbering (1 BC is `0000`).
pub fn format_iso8601(value: &DateValue, opts: &FormatOptions) -> String {
    format_with(value, opts, Dialect::Iso8601)
}

/// XML Schema format; 1 BC is `-0001`.
pub fn format_xs(value: &DateValue, opts: &FormatOptions) -> String {
    format_with(value, opts, Dialect::Xs)
}

/// A parsed date format setting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateFormatSpec {
    /// `iso` or `xs` followed by option letters (`h`, `m`, `s`, `ms`, `nz`, `fz`, `fu`).
    Dialect {
        dialect: Dialect,
        accuracy: Accuracy,
        show_offset: Option<bool>,
        force_utc: bool,
    },
    /// Anything else is a `strftime` pattern.
    Pattern(String),
}

fn bad_format(setting: &str, reason: &str) -> Error {
    Error::from_code(
        ErrorCode::InvalidArgument,
        format!("malformed date format {setting:?}: {reason}"),
    )
}

impl DateFormatSpec {
    pub fn parse(setting: &str) -> Result<Self, Error> {
        let (head, rest) = setting
            .split_once([' ', '_'])
            .unwrap_or((setting, ""));
        let dialect = match head {
            "iso" => Dialect::Iso8601,
            "xs" => Dialect::Xs,
            _ => return Ok(DateFormatSpec::Pattern(setting.to_string())),
        };
        let mut accuracy = None;
        let mut show_offset = None;
        let mut force_utc = false;
        for token in rest.split([' ', '_']).filter(|t| !t.is_empty()) {
            match token {
                "h" | "m" | "s" | "ms" => {
                    if accuracy.is_some() {
                        return Err(bad_format(setting, "accuracy was already specified"));
                    }
                    if dialect == Dialect::Xs && matches!(token, "h" | "m") {
                        return Err(bad_format(
                            setting,
                            "the XML Schema format doesn't support less than seconds accuracy",
                        ));
                    }
                    accuracy = Some(match token {
                        "h" => Accuracy::Hours,
                        "m" => Accuracy::Minutes,
                        "s" => Accuracy::Seconds,
                        _ => Accuracy::MillisecondsForced,
                    });
                }
                "nz" | "fz" => {
                    if show_offset.is_some() {
                        return Err(bad_format(setting, "zone offset visibility was already specified"));
                    }
                    show_offset = Some(token == "fz");
                }
                "fu" => {
                    if force_utc {
                        return Err(bad_format(setting, "\"fu\" was already specified"));
                    }
                    force_utc = true;
                }
                other => return Err(bad_format(setting, &format!("unknown option {other:?}"))),
            }
        }
        Ok(DateFormatSpec::Dialect {
            dialect,
            accuracy: accuracy.unwrap_or(Accuracy::Milliseconds),
            show_offset,
            force_utc,
        })
    }
}

/// Formats a date value with a format setting (`iso ...`, `xs ...` or a `strftime` pattern).
pub fn format_with_setting(
    value: &DateValue,
    setting: &str,
    time_zone: TimeZoneSpec,
    calendar: CalendarPolicy,
) -> Result<String, Error> {
    match DateFormatSpec::parse(setting)? {
        DateFormatSpec::Dialect {
            dialect,
            accuracy,
            show_offset,
            force_utc,
        } => {
            let zone = if force_utc { TimeZoneSpec::Utc } else { time_zone };
            let opts = FormatOptions::for_kind(value.kind, zone)?
                .with_accuracy(accuracy)
                .with_offset(show_offset)
                .with_calendar(calendar);
            Ok(format_with(value, &opts, dialect))
        }
        DateFormatSpec::Pattern(pattern) => format_pattern(value, &pattern, time_zone),
    }
}

fn format_pattern(value: &DateValue, pattern: &str, time_zone: TimeZoneSpec) -> Result<String, Error> {
    if value.kind == DateKind::Unknown {
        return Err(unknown_kind());
    }
    let items: Vec<Item<'_>> = StrftimeItems::new(pattern).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return Err(bad_format(pattern, "invalid strftime pattern"));
    }
    let offset = time_zone.offset_at(&value.instant);
    let local = value.instant.with_timezone(&offset);
    let mut out = String::new();
    write!(out, "{}", local.format_with_items(items.into_iter()))
        .map_err(|_| bad_format(pattern, "pattern can't be applied to this value"))?;
    Ok(out)
}
