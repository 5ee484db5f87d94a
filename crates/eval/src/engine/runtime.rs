use crate::consts;
use crate::engine::arithmetic::{ArithmeticEngine, PreciseArithmetic};
use crate::engine::coercion::NumberFormat;
use crate::engine::collation::{Collation, CollationRegistry};
use crate::engine::functions::{BuiltinRegistry, default_builtin_registry};
use crate::engine::regex_cache::PatternCache;
use crate::engine::temporal::{CalendarPolicy, TimeZoneSpec, resolve_time_zone};
use crate::value::Value;
use core::fmt;
use std::collections::HashMap;
use std::sync::Arc;

/// Failure kinds surfaced by the evaluation core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    CoercionFailure,      // value lacks the capability an operation needs
    ComparisonFailure,    // operands not mutually comparable, date kinds differ/unknown
    ParseFailure,         // malformed date/time, glob or regex literal
    UnrecognizedTimeZone, // time zone name not in the registry
    ArithmeticFailure,    // NaN comparison, overflow, unparsable numeric literal
    ArgumentCount,        // built-in called with the wrong number of arguments
    UnsupportedOperation, // e.g. ordering operator on strings/booleans
    InvalidReference,     // undefined value where a value is required
    InvalidArgument,      // argument of the right type but unusable value
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::CoercionFailure => "coercion-failure",
            ErrorCode::ComparisonFailure => "comparison-failure",
            ErrorCode::ParseFailure => "parse-failure",
            ErrorCode::UnrecognizedTimeZone => "unrecognized-time-zone",
            ErrorCode::ArithmeticFailure => "arithmetic-failure",
            ErrorCode::ArgumentCount => "argument-count",
            ErrorCode::UnsupportedOperation => "unsupported-operation",
            ErrorCode::InvalidReference => "invalid-reference",
            ErrorCode::InvalidArgument => "invalid-argument",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Position of an expression in the template source (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SourceLocation {
    pub line: u32,
    pub column: u32,
}

impl SourceLocation {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    pub location: Option<SourceLocation>,
    #[source]
    pub source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    pub fn from_code(code: ErrorCode, msg: impl Into<String>) -> Self {
        Self {
            code,
            message: msg.into(),
            location: None,
            source: None,
        }
    }

    /// Compose an error with a source cause.
    #[must_use]
    pub fn with_source(
        mut self,
        source: impl Into<Option<Arc<dyn std::error::Error + Send + Sync>>>,
    ) -> Self {
        self.source = source.into();
        self
    }

    /// Attach a location unless a more precise one was recorded already.
    #[must_use]
    pub fn at(mut self, location: Option<SourceLocation>) -> Self {
        if self.location.is_none() {
            self.location = location;
        }
        self
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }
}

impl From<fancy_regex::Error> for Error {
    fn from(e: fancy_regex::Error) -> Self {
        Error::from_code(ErrorCode::ParseFailure, format!("malformed regular expression: {e}"))
            .with_source(Some(Arc::new(e) as Arc<dyn std::error::Error + Send + Sync>))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "error: {} ({})", self.message, self.code)?;
        if let Some(loc) = &self.location {
            write!(f, " at {loc}")?;
        }
        Ok(())
    }
}

/// Per-render evaluation context.
///
/// Created at the start of a render and dropped at its end; never shared
/// between concurrently running renders. The pattern cache and the built-in
/// registry are shared through `Arc` and may be handed to many environments.
#[derive(Clone)]
pub struct Environment {
    pub locale: String,
    pub time_zone: TimeZoneSpec,
    pub collator: Arc<dyn Collation>,
    pub arithmetic: Arc<dyn ArithmeticEngine>,
    pub classic_compatible: bool,
    pub calendar: CalendarPolicy,
    pub number_format: NumberFormat,
    pub date_format: String,
    pub time_format: String,
    pub datetime_format: String,
    /// `(true_text, false_text)`; `None` means booleans don't coerce to strings.
    pub boolean_format: Option<(String, String)>,
    pub data_model: Option<Value>,
    pub locals: HashMap<String, Value>,
    pub builtins: Arc<BuiltinRegistry>,
    pub patterns: Arc<PatternCache>,
}

impl Default for Environment {
    fn default() -> Self {
        let collations = CollationRegistry::default();
        Self {
            locale: consts::DEFAULT_LOCALE.to_string(),
            time_zone: TimeZoneSpec::Utc,
            collator: collations.default_collation(),
            arithmetic: Arc::new(PreciseArithmetic::default()),
            classic_compatible: false,
            calendar: CalendarPolicy::ProlepticGregorian,
            number_format: NumberFormat::Number,
            date_format: consts::DEFAULT_DATE_FORMAT.to_string(),
            time_format: consts::DEFAULT_TIME_FORMAT.to_string(),
            datetime_format: consts::DEFAULT_DATETIME_FORMAT.to_string(),
            boolean_format: None,
            data_model: None,
            locals: HashMap::new(),
            builtins: default_builtin_registry(),
            patterns: Arc::new(PatternCache::new()),
        }
    }
}

impl Environment {
    pub fn builder() -> EnvironmentBuilder {
        EnvironmentBuilder::new()
    }

    /// Look up a top-level variable: locals first, then the data model.
    pub fn variable(&self, name: &str) -> Option<Value> {
        if let Some(v) = self.locals.get(name) {
            return Some(v.clone());
        }
        self.data_model
            .as_ref()
            .and_then(Value::as_hash)
            .and_then(|root| root.get(name).cloned())
    }

    pub fn set_variable(&mut self, name: impl Into<String>, value: Value) {
        self.locals.insert(name.into(), value);
    }

    pub fn set_locale(&mut self, locale: impl Into<String>) {
        self.locale = locale.into();
    }

    /// Switch the time zone by name; unknown names are rejected.
    pub fn set_time_zone(&mut self, name: &str) -> Result<(), Error> {
        self.time_zone = resolve_time_zone(name)?;
        Ok(())
    }
}

/// Builder for [`Environment`], one `with_*` method per setting.
pub struct EnvironmentBuilder {
    env: Environment,
}

impl Default for EnvironmentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EnvironmentBuilder {
    pub fn new() -> Self {
        Self {
            env: Environment::default(),
        }
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.env.locale = locale.into();
        self
    }

    pub fn with_time_zone(mut self, tz: TimeZoneSpec) -> Self {
        self.env.time_zone = tz;
        self
    }

    /// Fixed offset east of UTC in minutes.
    pub fn with_offset_minutes(mut self, offset_minutes: i32) -> Self {
        if let Some(tz) = chrono::FixedOffset::east_opt(offset_minutes * 60) {
            self.env.time_zone = TimeZoneSpec::Fixed(tz);
        }
        self
    }

    pub fn with_collator(mut self, collator: Arc<dyn Collation>) -> Self {
        self.env.collator = collator;
        self
    }

    pub fn with_arithmetic(mut self, engine: Arc<dyn ArithmeticEngine>) -> Self {
        self.env.arithmetic = engine;
        self
    }

    pub fn with_classic_compatible(mut self, on: bool) -> Self {
        self.env.classic_compatible = on;
        self
    }

    pub fn with_calendar(mut self, calendar: CalendarPolicy) -> Self {
        self.env.calendar = calendar;
        self
    }

    pub fn with_number_format(mut self, format: NumberFormat) -> Self {
        self.env.number_format = format;
        self
    }

    pub fn with_date_format(mut self, format: impl Into<String>) -> Self {
        self.env.date_format = format.into();
        self
    }

    pub fn with_time_format(mut self, format: impl Into<String>) -> Self {
        self.env.time_format = format.into();
        self
    }

    pub fn with_datetime_format(mut self, format: impl Into<String>) -> Self {
        self.env.datetime_format = format.into();
        self
    }

    pub fn with_boolean_format(
        mut self,
        true_text: impl Into<String>,
        false_text: impl Into<String>,
    ) -> Self {
        self.env.boolean_format = Some((true_text.into(), false_text.into()));
        self
    }

    pub fn with_data_model(mut self, root: Value) -> Self {
        self.env.data_model = Some(root);
        self
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.env.locals.insert(name.into(), value.into());
        self
    }

    pub fn with_builtins(mut self, reg: Arc<BuiltinRegistry>) -> Self {
        self.env.builtins = reg;
        self
    }

    pub fn with_pattern_cache(mut self, cache: Arc<PatternCache>) -> Self {
        self.env.patterns = cache;
        self
    }

    pub fn build(self) -> Environment {
        self.env
    }
}
