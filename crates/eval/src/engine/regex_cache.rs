use crate::consts::DEFAULT_PATTERN_CACHE_CAPACITY;
use crate::engine::runtime::{Error, ErrorCode};
use fancy_regex::{Regex, RegexBuilder};
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::sync::Arc;

bitflags::bitflags! {
    /// Flags of the regular expression built-ins.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RegexFlags: u8 {
        /// `i`
        const CASE_INSENSITIVE = 1;
        /// `m`: `^` and `$` match at line breaks.
        const MULTILINE = 1 << 1;
        /// `s`: `.` matches line breaks.
        const DOT_ALL = 1 << 2;
        /// `c`: whitespace and `#` comments in the pattern are ignored.
        const COMMENTS = 1 << 3;
        /// `r`: the pattern of `replace`/`split` is a regular expression, not a literal.
        const REGEX = 1 << 4;
        /// `f`: replace the first occurrence only.
        const FIRST_ONLY = 1 << 5;
    }
}

impl RegexFlags {
    /// Flags that change how a pattern compiles; the rest only steer the built-ins.
    pub const COMPILE: RegexFlags = RegexFlags::CASE_INSENSITIVE
        .union(RegexFlags::MULTILINE)
        .union(RegexFlags::DOT_ALL)
        .union(RegexFlags::COMMENTS);

    /// Parses a flag string for `builtin`.
    ///
    /// Letters outside `allowed` and unknown letters are logged and ignored.
    pub fn parse(flags: &str, builtin: &str, allowed: RegexFlags) -> RegexFlags {
        let mut out = RegexFlags::empty();
        for ch in flags.chars() {
            let flag = match ch {
                'i' => RegexFlags::CASE_INSENSITIVE,
                'm' => RegexFlags::MULTILINE,
                's' => RegexFlags::DOT_ALL,
                'c' => RegexFlags::COMMENTS,
                'r' => RegexFlags::REGEX,
                'f' => RegexFlags::FIRST_ONLY,
                _ => {
                    tracing::warn!(builtin, flag = %ch, "unknown regular expression flag ignored");
                    continue;
                }
            };
            if allowed.contains(flag) {
                out |= flag;
            } else {
                tracing::warn!(builtin, flag = %ch, "regular expression flag not applicable, ignored");
            }
        }
        out
    }
}

fn compile(pattern: &str, flags: RegexFlags) -> Result<Regex, Error> {
    let mut builder = RegexBuilder::new(pattern);
    builder
        .case_insensitive(flags.contains(RegexFlags::CASE_INSENSITIVE))
        .multi_line(flags.contains(RegexFlags::MULTILINE))
        .dot_matches_new_line(flags.contains(RegexFlags::DOT_ALL))
        .verbose_mode(flags.contains(RegexFlags::COMMENTS));
    builder.build().map_err(|e| {
        Error::from_code(
            ErrorCode::ParseFailure,
            format!("malformed regular expression {pattern:?}: {e}"),
        )
        .with_source(Some(Arc::new(e) as Arc<dyn std::error::Error + Send + Sync>))
    })
}

/// Bounded cache of compiled patterns, keyed by pattern text and compile flags.
///
/// When full, the entry inserted first is evicted. Lookups do not refresh an
/// entry's position. One lock covers the check-then-insert sequence, so two
/// callers asking for the same key get the same `Arc`.
pub struct PatternCache {
    capacity: usize,
    entries: Mutex<IndexMap<(String, RegexFlags), Arc<Regex>>>,
}

impl Default for PatternCache {
    fn default() -> Self {
        Self::new()
    }
}

impl PatternCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_PATTERN_CACHE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(IndexMap::with_capacity(capacity.min(1024))),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn contains(&self, pattern: &str, flags: RegexFlags) -> bool {
        let key = (pattern.to_string(), flags & RegexFlags::COMPILE);
        self.entries.lock().contains_key(&key)
    }

    /// Compiled pattern for `pattern` with the compile-relevant part of `flags`.
    pub fn get_or_compile(&self, pattern: &str, flags: RegexFlags) -> Result<Arc<Regex>, Error> {
        let key = (pattern.to_string(), flags & RegexFlags::COMPILE);
        let mut entries = self.entries.lock();
        if let Some(re) = entries.get(&key) {
            return Ok(Arc::clone(re));
        }
        let re = Arc::new(compile(pattern, key.1)?);
        tracing::trace!(pattern, size = entries.len(), "compiled pattern");
        if entries.len() >= self.capacity
            && let Some((evicted, _)) = entries.shift_remove_index(0)
        {
            tracing::debug!(pattern = %evicted.0, size = entries.len(), "evicted pattern");
        }
        entries.insert(key, Arc::clone(&re));
        Ok(re)
    }

    /// Pattern matching `literal` verbatim.
    pub fn get_or_compile_literal(
        &self,
        literal: &str,
        flags: RegexFlags,
    ) -> Result<Arc<Regex>, Error> {
        self.get_or_compile(&fancy_regex::escape(literal), flags & !RegexFlags::COMMENTS)
    }

    /// Pattern that only matches when it covers the entire input.
    pub fn get_or_compile_anchored(
        &self,
        pattern: &str,
        flags: RegexFlags,
    ) -> Result<Arc<Regex>, Error> {
        // A trailing `#` comment in verbose mode would swallow the closing group.
        let wrapped = if flags.contains(RegexFlags::COMMENTS) {
            format!("\\A(?:{pattern}\n)\\z")
        } else {
            format!("\\A(?:{pattern})\\z")
        };
        self.get_or_compile(&wrapped, flags)
    }
}
