//! Parsers for the XML Schema (`xs`) and ISO 8601 date/time literals.
//!
//! All parsers consume the whole input; anything left over is an error. A
//! literal without an offset is read as a wall clock reading in the caller's
//! default zone.

use super::calendar::{CalendarPolicy, CivilDate, MILLIS_PER_DAY};
use super::zones::TimeZoneSpec;
use crate::engine::runtime::{Error, ErrorCode};
use crate::value::{DateKind, DateValue};
use chrono::{DateTime, FixedOffset};

/// Separator style shared by the date, time and offset parts of an ISO literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    Basic,
    Extended,
}

#[derive(Debug, Clone, Copy)]
struct TimeOfDay {
    hour: u32,
    minute: u32,
    second: u32,
    millis: u32,
}

impl TimeOfDay {
    fn millis_of_day(&self) -> i64 {
        ((i64::from(self.hour) * 60 + i64::from(self.minute)) * 60 + i64::from(self.second))
            * 1000
            + i64::from(self.millis)
    }
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            bytes: input.as_bytes(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn eat(&mut self, b: u8) -> bool {
        if self.peek() == Some(b) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, b: u8) -> Option<()> {
        self.eat(b).then_some(())
    }

    fn digit_run(&mut self) -> &'a [u8] {
        let start = self.pos;
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        &self.bytes[start..self.pos]
    }

    /// Exactly `n` digits.
    fn fixed(&mut self, n: usize) -> Option<u32> {
        let end = self.pos + n;
        let slice = self.bytes.get(self.pos..end)?;
        if !slice.iter().all(u8::is_ascii_digit) {
            return None;
        }
        self.pos = end;
        Some(number(slice) as u32)
    }

    fn next_is_digit(&self) -> bool {
        self.peek().is_some_and(|b| b.is_ascii_digit())
    }
}

fn number(digits: &[u8]) -> i64 {
    digits
        .iter()
        .fold(0i64, |acc, d| acc.saturating_mul(10).saturating_add(i64::from(d - b'0')))
}

/// Milliseconds from a fraction, extra digits truncated.
fn fraction_millis(digits: &[u8]) -> u32 {
    let mut millis = 0;
    for i in 0..3 {
        millis = millis * 10 + digits.get(i).map_or(0, |d| u32::from(d - b'0'));
    }
    millis
}

// Years beyond this many digits can't be represented as an instant anyway.
const MAX_YEAR_DIGITS: usize = 9;

fn year_from_digits(digits: &[u8]) -> Option<i64> {
    (digits.len() >= 4 && digits.len() <= MAX_YEAR_DIGITS).then(|| number(digits))
}

fn xs_date(c: &mut Cursor<'_>) -> Option<CivilDate> {
    let negative = c.eat(b'-');
    let year = year_from_digits(c.digit_run())?;
    if year == 0 {
        return None;
    }
    c.expect(b'-')?;
    let month = c.fixed(2)?;
    c.expect(b'-')?;
    let day = c.fixed(2)?;
    // "-0001" is 1 BC, which is astronomical year 0.
    let year = if negative { 1 - year } else { year };
    Some(CivilDate { year, month, day })
}

fn iso_date(c: &mut Cursor<'_>) -> Option<(CivilDate, Layout)> {
    let negative = c.eat(b'-');
    let run = c.digit_run();
    let (year, month, day, layout) = if c.eat(b'-') {
        let year = year_from_digits(run)?;
        let month = c.fixed(2)?;
        c.expect(b'-')?;
        (year, month, c.fixed(2)?, Layout::Extended)
    } else {
        if run.len() < 8 {
            return None;
        }
        let (year_digits, md) = run.split_at(run.len() - 4);
        let year = year_from_digits(year_digits)?;
        (year, number(&md[..2]) as u32, number(&md[2..]) as u32, Layout::Basic)
    };
    let year = if negative { -year } else { year };
    Some((CivilDate { year, month, day }, layout))
}

fn fraction(c: &mut Cursor<'_>, separators: &[u8]) -> Option<u32> {
    match c.peek() {
        Some(b) if separators.contains(&b) => {
            c.pos += 1;
            let digits = c.digit_run();
            if digits.is_empty() {
                return None;
            }
            Some(fraction_millis(digits))
        }
        _ => Some(0),
    }
}

fn xs_time(c: &mut Cursor<'_>) -> Option<TimeOfDay> {
    let hour = c.fixed(2)?;
    c.expect(b':')?;
    let minute = c.fixed(2)?;
    c.expect(b':')?;
    let second = c.fixed(2)?;
    let millis = fraction(c, b".")?;
    Some(TimeOfDay {
        hour,
        minute,
        second,
        millis,
    })
}

/// ISO time with optional minutes and seconds; only seconds take a fraction.
fn iso_time(c: &mut Cursor<'_>, layout: Layout) -> Option<TimeOfDay> {
    let hour = c.fixed(2)?;
    let mut time = TimeOfDay {
        hour,
        minute: 0,
        second: 0,
        millis: 0,
    };
    let more = |c: &mut Cursor<'_>| match layout {
        Layout::Extended => c.eat(b':'),
        Layout::Basic => c.next_is_digit(),
    };
    if more(c) {
        time.minute = c.fixed(2)?;
        if more(c) {
            time.second = c.fixed(2)?;
            time.millis = fraction(c, b".,")?;
        }
    }
    Some(time)
}

fn offset(hours: u32, minutes: u32, negative: bool) -> Option<FixedOffset> {
    if hours > 23 || minutes > 59 {
        return None;
    }
    let secs = (hours * 3600 + minutes * 60) as i32;
    FixedOffset::east_opt(if negative { -secs } else { secs })
}

fn sign(c: &mut Cursor<'_>) -> Option<bool> {
    if c.eat(b'+') {
        Some(false)
    } else if c.eat(b'-') {
        Some(true)
    } else {
        None
    }
}

/// `Z` or `[+-]HH:MM`; `None` inside means no offset was written.
fn xs_offset(c: &mut Cursor<'_>) -> Option<Option<FixedOffset>> {
    if c.eat(b'Z') {
        return Some(FixedOffset::east_opt(0));
    }
    let Some(negative) = sign(c) else {
        return Some(None);
    };
    let hours = c.fixed(2)?;
    c.expect(b':')?;
    let minutes = c.fixed(2)?;
    offset(hours, minutes, negative).map(Some)
}

/// `Z` or `[+-]HH` with optional minutes in the given layout.
fn iso_offset(c: &mut Cursor<'_>, layout: Layout) -> Option<Option<FixedOffset>> {
    if c.eat(b'Z') {
        return Some(FixedOffset::east_opt(0));
    }
    let Some(negative) = sign(c) else {
        return Some(None);
    };
    let hours = c.fixed(2)?;
    let has_minutes = match layout {
        Layout::Extended => c.eat(b':'),
        Layout::Basic => c.next_is_digit(),
    };
    let minutes = if has_minutes { c.fixed(2)? } else { 0 };
    offset(hours, minutes, negative).map(Some)
}

fn malformed(what: &str, input: &str) -> Error {
    Error::from_code(
        ErrorCode::ParseFailure,
        format!("malformed {what}: {input:?}"),
    )
}

fn validate_time(t: &TimeOfDay) -> bool {
    let midnight_end = t.hour == 24 && t.minute == 0 && t.second == 0 && t.millis == 0;
    (t.hour < 24 || midnight_end) && t.minute <= 59 && t.second <= 59
}

/// Combines the parsed parts into an instant.
fn assemble(
    input: &str,
    what: &str,
    days: i64,
    time: Option<TimeOfDay>,
    explicit: Option<FixedOffset>,
    default_tz: &TimeZoneSpec,
    kind: DateKind,
) -> Result<DateValue, Error> {
    let millis_of_day = time.as_ref().map_or(0, TimeOfDay::millis_of_day);
    let local = days
        .checked_mul(MILLIS_PER_DAY)
        .and_then(|m| m.checked_add(millis_of_day))
        .ok_or_else(|| malformed(what, input))?;
    let offset = match explicit {
        Some(off) => off,
        None => {
            let naive = DateTime::from_timestamp_millis(local)
                .ok_or_else(|| malformed(what, input))?
                .naive_utc();
            default_tz.offset_for_local(&naive)
        }
    };
    local
        .checked_sub(i64::from(offset.local_minus_utc()) * 1000)
        .and_then(|instant| DateValue::from_millis(instant, kind))
        .ok_or_else(|| malformed(what, input))
}

fn finish<T>(c: &Cursor<'_>, parsed: Option<T>) -> Option<T> {
    parsed.filter(|_| c.at_end())
}

pub fn parse_xs_date(
    input: &str,
    default_tz: &TimeZoneSpec,
    calendar: CalendarPolicy,
) -> Result<DateValue, Error> {
    let mut c = Cursor::new(input);
    let parsed = xs_date(&mut c).and_then(|d| Some((d, xs_offset(&mut c)?)));
    let (date, off) = finish(&c, parsed).ok_or_else(|| malformed("XML Schema date", input))?;
    let days = calendar.to_days(date).ok_or_else(|| malformed("XML Schema date", input))?;
    assemble(input, "XML Schema date", days, None, off, default_tz, DateKind::Date)
}

pub fn parse_xs_time(input: &str, default_tz: &TimeZoneSpec) -> Result<DateValue, Error> {
    let mut c = Cursor::new(input);
    let parsed = xs_time(&mut c).and_then(|t| Some((t, xs_offset(&mut c)?)));
    let (time, off) = finish(&c, parsed)
        .filter(|(t, _)| validate_time(t))
        .ok_or_else(|| malformed("XML Schema time", input))?;
    assemble(input, "XML Schema time", 0, Some(time), off, default_tz, DateKind::Time)
}

pub fn parse_xs_datetime(
    input: &str,
    default_tz: &TimeZoneSpec,
    calendar: CalendarPolicy,
) -> Result<DateValue, Error> {
    const WHAT: &str = "XML Schema dateTime";
    let mut c = Cursor::new(input);
    let parsed = xs_date(&mut c).and_then(|d| {
        c.expect(b'T')?;
        let t = xs_time(&mut c)?;
        Some((d, t, xs_offset(&mut c)?))
    });
    let (date, time, off) = finish(&c, parsed)
        .filter(|(_, t, _)| validate_time(t))
        .ok_or_else(|| malformed(WHAT, input))?;
    let days = calendar.to_days(date).ok_or_else(|| malformed(WHAT, input))?;
    assemble(input, WHAT, days, Some(time), off, default_tz, DateKind::DateTime)
}

pub fn parse_iso8601_date(
    input: &str,
    default_tz: &TimeZoneSpec,
    calendar: CalendarPolicy,
) -> Result<DateValue, Error> {
    const WHAT: &str = "ISO 8601 date";
    let mut c = Cursor::new(input);
    let parsed = iso_date(&mut c);
    let (date, _) = finish(&c, parsed).ok_or_else(|| malformed(WHAT, input))?;
    let days = calendar.to_days(date).ok_or_else(|| malformed(WHAT, input))?;
    assemble(input, WHAT, days, None, None, default_tz, DateKind::Date)
}

fn iso_time_with_offset(
    input: &str,
    layout: Layout,
) -> Option<(TimeOfDay, Option<FixedOffset>)> {
    let mut c = Cursor::new(input);
    let parsed = iso_time(&mut c, layout).and_then(|t| Some((t, iso_offset(&mut c, layout)?)));
    finish(&c, parsed)
}

pub fn parse_iso8601_time(input: &str, default_tz: &TimeZoneSpec) -> Result<DateValue, Error> {
    const WHAT: &str = "ISO 8601 time";
    let (time, off) = iso_time_with_offset(input, Layout::Extended)
        .or_else(|| iso_time_with_offset(input, Layout::Basic))
        .filter(|(t, _)| validate_time(t))
        .ok_or_else(|| malformed(WHAT, input))?;
    assemble(input, WHAT, 0, Some(time), off, default_tz, DateKind::Time)
}

pub fn parse_iso8601_datetime(
    input: &str,
    default_tz: &TimeZoneSpec,
    calendar: CalendarPolicy,
) -> Result<DateValue, Error> {
    const WHAT: &str = "ISO 8601 date-time";
    let mut c = Cursor::new(input);
    let parsed = iso_date(&mut c).and_then(|(d, layout)| {
        c.expect(b'T')?;
        let t = iso_time(&mut c, layout)?;
        Some((d, t, iso_offset(&mut c, layout)?))
    });
    let (date, time, off) = finish(&c, parsed)
        .filter(|(_, t, _)| validate_time(t))
        .ok_or_else(|| malformed(WHAT, input))?;
    let days = calendar.to_days(date).ok_or_else(|| malformed(WHAT, input))?;
    assemble(input, WHAT, days, Some(time), off, default_tz, DateKind::DateTime)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn millis(v: Result<DateValue, Error>) -> i64 {
        v.unwrap().timestamp_millis()
    }

    #[test]
    fn fraction_is_truncated() {
        assert_eq!(fraction_millis(b"12346"), 123);
        assert_eq!(fraction_millis(b"5"), 500);
    }

    #[test]
    fn basic_date_year_takes_leading_digits() {
        let mut c = Cursor::new("120060101");
        let (date, layout) = iso_date(&mut c).unwrap();
        assert_eq!(date, CivilDate { year: 12006, month: 1, day: 1 });
        assert_eq!(layout, Layout::Basic);
    }

    #[test]
    fn hour_24_rolls_over() {
        let tz = TimeZoneSpec::Utc;
        assert_eq!(millis(parse_xs_time("24:00:00", &tz)), MILLIS_PER_DAY);
        assert!(parse_xs_time("24:00:01", &tz).is_err());
    }

    #[test]
    fn mixed_layouts_are_rejected() {
        let tz = TimeZoneSpec::Utc;
        let cal = CalendarPolicy::default();
        assert!(parse_iso8601_datetime("2012-01-01T101010", &tz, cal).is_err());
        assert!(parse_iso8601_datetime("20120101T10:10:10", &tz, cal).is_err());
        assert!(parse_iso8601_datetime("20120101T101010Z", &tz, cal).is_ok());
    }
}
