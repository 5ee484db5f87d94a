/// Name of the collation that orders strings by Unicode code point.
pub const CODEPOINT_COLLATION: &str = "codepoint";
/// Name of the three-level (base letter, accent, case) collation used by default.
pub const LOCALE_COLLATION: &str = "locale";
/// Name of the base-letter-only collation (case and accent insensitive).
pub const PRIMARY_COLLATION: &str = "primary";

pub const DEFAULT_LOCALE: &str = "en-US";

/// Upper bound of compiled patterns kept by a [`crate::PatternCache`] unless configured otherwise.
pub const DEFAULT_PATTERN_CACHE_CAPACITY: usize = 100;

/// First day of the Gregorian calendar in the hybrid Julian/Gregorian calendar.
pub const GREGORIAN_SWITCHOVER: (i64, u32, u32) = (1582, 10, 15);

/// Minimum scale of quotients computed by the precise arithmetic engine.
pub const PRECISE_MIN_SCALE: u32 = 12;
/// Maximum scale kept on products computed by the precise arithmetic engine.
pub const PRECISE_MAX_SCALE: u32 = 12;

pub const DEFAULT_DATE_FORMAT: &str = "iso";
pub const DEFAULT_TIME_FORMAT: &str = "iso";
pub const DEFAULT_DATETIME_FORMAT: &str = "iso";
