//! Semantic value model.
//!
//! Every expression evaluates to a [`Value`] or to "undefined" (`None` in an
//! [`Evaluated`]). Consumers must ask a value for a capability
//! ([`Value::has`], [`Value::as_string`], ...) instead of matching on the
//! variant: several variants expose more than one capability at once (a regex
//! match result is a boolean, a sequence and a collection at the same time) and
//! host objects expose whatever their adapter declares.

use chrono::{DateTime, Utc};
use core::fmt;
use indexmap::IndexMap;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::sync::Arc;

bitflags::bitflags! {
    /// Capability facets a value can expose.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u8 {
        const STRING = 1;
        const NUMBER = 1 << 1;
        const DATE = 1 << 2;
        const BOOLEAN = 1 << 3;
        const SEQUENCE = 1 << 4;
        const COLLECTION = 1 << 5;
        const HASH = 1 << 6;
    }
}

impl Capabilities {
    /// Human readable rendering used in error messages, e.g. `sequence+collection+boolean`.
    pub fn describe(self) -> String {
        const NAMES: [(Capabilities, &str); 7] = [
            (Capabilities::STRING, "string"),
            (Capabilities::NUMBER, "number"),
            (Capabilities::DATE, "date"),
            (Capabilities::BOOLEAN, "boolean"),
            (Capabilities::SEQUENCE, "sequence"),
            (Capabilities::COLLECTION, "collection"),
            (Capabilities::HASH, "hash"),
        ];
        let parts: Vec<&str> = NAMES
            .iter()
            .filter(|(cap, _)| self.contains(*cap))
            .map(|(_, name)| *name)
            .collect();
        if parts.is_empty() {
            "nothing usable".to_string()
        } else {
            parts.join("+")
        }
    }
}

/// Numeric payload with its concrete representation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    BigInteger(i128),
    Decimal(Decimal),
}

impl Number {
    pub fn type_name(&self) -> &'static str {
        match self {
            Number::Int(_) => "int",
            Number::Long(_) => "long",
            Number::Float(_) => "float",
            Number::Double(_) => "double",
            Number::BigInteger(_) => "big integer",
            Number::Decimal(_) => "decimal",
        }
    }

    pub fn is_nan(&self) -> bool {
        match self {
            Number::Float(f) => f.is_nan(),
            Number::Double(d) => d.is_nan(),
            _ => false,
        }
    }

    pub fn is_infinite(&self) -> bool {
        match self {
            Number::Float(f) => f.is_infinite(),
            Number::Double(d) => d.is_infinite(),
            _ => false,
        }
    }

    /// Sign of the number (-1, 0, 1); NaN reports 0.
    pub fn signum(&self) -> i32 {
        match self {
            Number::Int(i) => i.signum(),
            Number::Long(l) => l.signum() as i32,
            Number::BigInteger(b) => b.signum() as i32,
            Number::Decimal(d) => {
                if d.is_zero() {
                    0
                } else if d.is_sign_negative() {
                    -1
                } else {
                    1
                }
            }
            Number::Float(f) => signum_f64(f64::from(*f)),
            Number::Double(d) => signum_f64(*d),
        }
    }

    /// Lossy conversion to `f64`.
    pub fn to_f64(&self) -> f64 {
        match self {
            Number::Int(i) => f64::from(*i),
            Number::Long(l) => *l as f64,
            Number::Float(f) => f64::from(*f),
            Number::Double(d) => *d,
            Number::BigInteger(b) => *b as f64,
            Number::Decimal(d) => d.to_f64().unwrap_or(f64::NAN),
        }
    }

    /// Exact decimal view; `None` for NaN, infinities and magnitudes beyond `Decimal`.
    pub fn to_decimal(&self) -> Option<Decimal> {
        match self {
            Number::Int(i) => Some(Decimal::from(*i)),
            Number::Long(l) => Some(Decimal::from(*l)),
            Number::BigInteger(b) => Decimal::try_from_i128_with_scale(*b, 0).ok(),
            Number::Decimal(d) => Some(*d),
            // Shortest round-trip text, so 0.1f64 becomes 0.1 and not its binary expansion.
            Number::Float(f) if f.is_finite() => f.to_string().parse().ok(),
            Number::Double(d) if d.is_finite() => {
                let text = d.to_string();
                text.parse().ok().or_else(|| Decimal::from_scientific(&format!("{d:e}")).ok())
            }
            Number::Float(_) | Number::Double(_) => None,
        }
    }

    /// Integral view if the number has no fractional part and fits an `i64`.
    pub fn to_i64_exact(&self) -> Option<i64> {
        match self {
            Number::Int(i) => Some(i64::from(*i)),
            Number::Long(l) => Some(*l),
            Number::BigInteger(b) => i64::try_from(*b).ok(),
            Number::Decimal(d) => {
                if d.fract().is_zero() {
                    d.to_i64()
                } else {
                    None
                }
            }
            Number::Float(_) | Number::Double(_) => {
                let v = self.to_f64();
                if v.is_finite() && v.fract() == 0.0 && v.abs() < 9.2e18 {
                    Some(v as i64)
                } else {
                    None
                }
            }
        }
    }
}

fn signum_f64(v: f64) -> i32 {
    if v > 0.0 {
        1
    } else if v < 0.0 {
        -1
    } else {
        0
    }
}

impl From<i32> for Number {
    fn from(v: i32) -> Self {
        Number::Int(v)
    }
}

impl From<i64> for Number {
    fn from(v: i64) -> Self {
        Number::Long(v)
    }
}

impl From<f64> for Number {
    fn from(v: f64) -> Self {
        Number::Double(v)
    }
}

impl From<Decimal> for Number {
    fn from(v: Decimal) -> Self {
        Number::Decimal(v)
    }
}

/// Which parts of a date value are meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DateKind {
    Date,
    Time,
    DateTime,
    Unknown,
}

impl DateKind {
    pub fn name(self) -> &'static str {
        match self {
            DateKind::Date => "date-only",
            DateKind::Time => "time-only",
            DateKind::DateTime => "date-time",
            DateKind::Unknown => "unknown",
        }
    }
}

/// An instant plus the information which of its parts are in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateValue {
    pub instant: DateTime<Utc>,
    pub kind: DateKind,
}

impl DateValue {
    pub fn new(instant: DateTime<Utc>, kind: DateKind) -> Self {
        Self { instant, kind }
    }

    pub fn from_millis(millis: i64, kind: DateKind) -> Option<Self> {
        DateTime::<Utc>::from_timestamp_millis(millis).map(|instant| Self { instant, kind })
    }

    pub fn timestamp_millis(&self) -> i64 {
        self.instant.timestamp_millis()
    }

    #[must_use]
    pub fn with_kind(self, kind: DateKind) -> Self {
        Self { kind, ..self }
    }
}

/// Adapter the object wrapping layer implements for host objects.
///
/// `model_view` returns the plain model value used to satisfy capability
/// queries; it must expose at least the capabilities reported by
/// `capabilities`.
pub trait HostObject: Send + Sync + fmt::Debug {
    fn type_name(&self) -> &str;
    fn capabilities(&self) -> Capabilities;
    fn is_empty(&self) -> bool;
    fn model_view(&self) -> Option<Value>;
}

/// Result of a `matches` built-in: boolean (entire input matched), sequence
/// and collection (all found matches).
#[derive(Debug)]
pub struct RegexMatch {
    pub input: Arc<str>,
    pub entire_input_matched: bool,
    /// Groups of the entire-input match (group 0 first); empty when it did not match.
    pub entire_input_groups: Arc<[Value]>,
    /// One [`Value::MatchItem`] per match found while scanning the input.
    pub matches: Arc<[Value]>,
}

/// A matched part of the input together with its capture groups.
#[derive(Debug)]
pub struct MatchItem {
    pub text: Arc<str>,
    pub groups: Arc<[Value]>,
}

#[derive(Debug, Clone)]
pub enum Value {
    String(Arc<str>),
    Number(Number),
    Date(DateValue),
    Boolean(bool),
    Sequence(Arc<[Value]>),
    Collection(Arc<[Value]>),
    Hash(Arc<IndexMap<String, Value>>),
    Match(Arc<RegexMatch>),
    MatchItem(Arc<MatchItem>),
    Host(Arc<dyn HostObject>),
}

/// Outcome of evaluating an expression: `None` is the undefined marker.
pub type Evaluated = Option<Value>;

impl Value {
    pub fn string(s: impl Into<Arc<str>>) -> Self {
        Value::String(s.into())
    }

    pub fn sequence(items: Vec<Value>) -> Self {
        Value::Sequence(items.into())
    }

    pub fn collection(items: Vec<Value>) -> Self {
        Value::Collection(items.into())
    }

    pub fn hash(entries: IndexMap<String, Value>) -> Self {
        Value::Hash(Arc::new(entries))
    }

    pub fn capabilities(&self) -> Capabilities {
        match self {
            Value::String(_) | Value::MatchItem(_) => Capabilities::STRING,
            Value::Number(_) => Capabilities::NUMBER,
            Value::Date(_) => Capabilities::DATE,
            Value::Boolean(_) => Capabilities::BOOLEAN,
            Value::Sequence(_) => Capabilities::SEQUENCE,
            Value::Collection(_) => Capabilities::COLLECTION,
            Value::Hash(_) => Capabilities::HASH,
            Value::Match(_) => {
                Capabilities::BOOLEAN | Capabilities::SEQUENCE | Capabilities::COLLECTION
            }
            Value::Host(h) => h.capabilities(),
        }
    }

    pub fn has(&self, capability: Capabilities) -> bool {
        self.capabilities().contains(capability)
    }

    fn host_view(&self, capability: Capabilities) -> Option<Value> {
        match self {
            Value::Host(h) if h.capabilities().contains(capability) => h.model_view(),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<Arc<str>> {
        match self {
            Value::String(s) => Some(s.clone()),
            Value::MatchItem(m) => Some(m.text.clone()),
            Value::Host(_) => self
                .host_view(Capabilities::STRING)
                .and_then(|v| v.as_string()),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<Number> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Host(_) => self
                .host_view(Capabilities::NUMBER)
                .and_then(|v| v.as_number()),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<DateValue> {
        match self {
            Value::Date(d) => Some(*d),
            Value::Host(_) => self.host_view(Capabilities::DATE).and_then(|v| v.as_date()),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            Value::Match(m) => Some(m.entire_input_matched),
            Value::Host(_) => self
                .host_view(Capabilities::BOOLEAN)
                .and_then(|v| v.as_bool()),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<Arc<[Value]>> {
        match self {
            Value::Sequence(items) => Some(items.clone()),
            Value::Match(m) => Some(m.matches.clone()),
            Value::Host(_) => self
                .host_view(Capabilities::SEQUENCE)
                .and_then(|v| v.as_sequence()),
            _ => None,
        }
    }

    /// Items in iteration order of a collection (forward-only view).
    pub fn as_collection(&self) -> Option<Arc<[Value]>> {
        match self {
            Value::Collection(items) => Some(items.clone()),
            Value::Match(m) => Some(m.matches.clone()),
            Value::Host(_) => self
                .host_view(Capabilities::COLLECTION)
                .and_then(|v| v.as_collection().or_else(|| v.as_sequence())),
            _ => None,
        }
    }

    pub fn as_hash(&self) -> Option<Arc<IndexMap<String, Value>>> {
        match self {
            Value::Hash(map) => Some(map.clone()),
            Value::Host(_) => self.host_view(Capabilities::HASH).and_then(|v| v.as_hash()),
            _ => None,
        }
    }

    /// Items of a sequence, or of a collection when the value is not indexable.
    pub fn iterable_items(&self) -> Option<Arc<[Value]>> {
        self.as_sequence().or_else(|| self.as_collection())
    }

    /// Description used in error messages: the capability set, plus the host type if any.
    pub fn type_description(&self) -> String {
        match self {
            Value::Host(h) => format!("{} ({})", self.capabilities().describe(), h.type_name()),
            _ => self.capabilities().describe(),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s.into())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Number(Number::Int(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Number(Number::Long(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(Number::Double(v))
    }
}

impl From<Number> for Value {
    fn from(n: Number) -> Self {
        Value::Number(n)
    }
}

impl From<DateValue> for Value {
    fn from(d: DateValue) -> Self {
        Value::Date(d)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::sequence(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_result_exposes_three_capabilities() {
        let m = Value::Match(Arc::new(RegexMatch {
            input: "ab".into(),
            entire_input_matched: true,
            entire_input_groups: Arc::from(vec![Value::from("ab")]),
            matches: Arc::from(vec![]),
        }));
        assert!(m.has(Capabilities::BOOLEAN));
        assert!(m.has(Capabilities::SEQUENCE));
        assert!(m.has(Capabilities::COLLECTION));
        assert!(!m.has(Capabilities::STRING));
        assert_eq!(m.type_description(), "boolean+sequence+collection");
    }

    #[test]
    fn double_to_decimal_uses_shortest_text() {
        let d = Number::Double(0.1).to_decimal().unwrap();
        assert_eq!(d.to_string(), "0.1");
        assert!(Number::Double(f64::NAN).to_decimal().is_none());
    }
}
