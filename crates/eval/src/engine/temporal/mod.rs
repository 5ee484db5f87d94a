//! Date/time codec: XML Schema and ISO 8601 literals, calendars and zones.

mod calendar;
mod format;
mod parse;
mod zones;

pub use calendar::CalendarPolicy;
pub use format::{DateFormatSpec, FormatOptions, format_iso8601, format_with_setting, format_xs};
pub use parse::{
    parse_iso8601_date, parse_iso8601_datetime, parse_iso8601_time, parse_xs_date,
    parse_xs_datetime, parse_xs_time,
};
pub use zones::{TimeZoneSpec, resolve_time_zone};

pub(crate) use format::unknown_kind;

/// Literal syntax family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    Iso8601,
    /// XML Schema 1.0 `xs:date`, `xs:time` and `xs:dateTime`.
    Xs,
}

/// Finest time field written by the formatters; ordered from coarse to fine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Accuracy {
    Hours,
    Minutes,
    Seconds,
    /// Milliseconds with trailing zeros removed, omitted when zero.
    Milliseconds,
    /// Always three millisecond digits.
    MillisecondsForced,
}
