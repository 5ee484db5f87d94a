use crate::engine::runtime::{Error, ErrorCode};
use chrono::{DateTime, FixedOffset, LocalResult, NaiveDateTime, Offset, TimeZone, Utc};
use chrono_tz::Tz;
use core::fmt;

/// Time zone used to interpret zone-less input and to render instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeZoneSpec {
    #[default]
    Utc,
    Fixed(FixedOffset),
    /// IANA zone with daylight saving rules.
    Named(Tz),
}

fn utc_offset() -> FixedOffset {
    Utc.fix()
}

impl TimeZoneSpec {
    /// Offset in effect at `instant`.
    pub fn offset_at(&self, instant: &DateTime<Utc>) -> FixedOffset {
        match self {
            TimeZoneSpec::Utc => utc_offset(),
            TimeZoneSpec::Fixed(off) => *off,
            TimeZoneSpec::Named(tz) => tz.offset_from_utc_datetime(&instant.naive_utc()).fix(),
        }
    }

    /// Offset to apply to a wall clock reading in this zone.
    ///
    /// Ambiguous readings (clocks turned back) take the earlier offset; readings
    /// inside a gap (clocks turned forward) take the offset in effect after it.
    pub fn offset_for_local(&self, local: &NaiveDateTime) -> FixedOffset {
        match self {
            TimeZoneSpec::Utc => utc_offset(),
            TimeZoneSpec::Fixed(off) => *off,
            TimeZoneSpec::Named(tz) => match tz.offset_from_local_datetime(local) {
                LocalResult::Single(off) => off.fix(),
                LocalResult::Ambiguous(earliest, _) => earliest.fix(),
                LocalResult::None => tz.offset_from_utc_datetime(local).fix(),
            },
        }
    }

    pub fn is_utc(&self) -> bool {
        match self {
            TimeZoneSpec::Utc => true,
            TimeZoneSpec::Fixed(off) => off.local_minus_utc() == 0,
            TimeZoneSpec::Named(_) => false,
        }
    }
}

impl fmt::Display for TimeZoneSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeZoneSpec::Utc => f.write_str("UTC"),
            TimeZoneSpec::Fixed(off) => write!(f, "GMT{off}"),
            TimeZoneSpec::Named(tz) => f.write_str(tz.name()),
        }
    }
}

/// Parses `+H`, `+HH`, `+HHMM`, `+HH:MM` (or `-`) into seconds east of UTC.
fn parse_offset_suffix(suffix: &str) -> Option<i32> {
    let (sign, rest) = match suffix.as_bytes().first()? {
        b'+' => (1, &suffix[1..]),
        b'-' => (-1, &suffix[1..]),
        _ => return None,
    };
    if !rest.bytes().all(|b| b.is_ascii_digit() || b == b':') {
        return None;
    }
    let (hours, minutes) = match rest.split_once(':') {
        Some((h, m)) if (1..=2).contains(&h.len()) && m.len() == 2 => (h, m),
        Some(_) => return None,
        None => match rest.len() {
            1 | 2 => (rest, "0"),
            3 | 4 => rest.split_at(rest.len() - 2),
            _ => return None,
        },
    };
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if hours > 23 || minutes > 59 {
        return None;
    }
    Some(sign * (hours * 3600 + minutes * 60))
}

/// Resolves a time zone name.
///
/// `GMT`, `UTC` and `UT` (any case) with an optional offset suffix give UTC or
/// a fixed offset; every other name is looked up in the IANA database. Unknown
/// names are an error, never a silent fallback to GMT.
pub fn resolve_time_zone(name: &str) -> Result<TimeZoneSpec, Error> {
    let upper = name.to_ascii_uppercase();
    for prefix in ["GMT", "UTC", "UT"] {
        if let Some(suffix) = upper.strip_prefix(prefix) {
            if suffix.is_empty() {
                return Ok(TimeZoneSpec::Utc);
            }
            if let Some(secs) = parse_offset_suffix(suffix) {
                return Ok(match secs {
                    0 => TimeZoneSpec::Utc,
                    _ => FixedOffset::east_opt(secs)
                        .map(TimeZoneSpec::Fixed)
                        .unwrap_or(TimeZoneSpec::Utc),
                });
            }
        }
    }
    match name.parse::<Tz>() {
        Ok(tz) => Ok(TimeZoneSpec::Named(tz)),
        Err(_) => {
            tracing::debug!(zone = name, "time zone not found");
            Err(Error::from_code(
                ErrorCode::UnrecognizedTimeZone,
                format!("unrecognized time zone: {name:?}"),
            ))
        }
    }
}
