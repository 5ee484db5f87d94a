use crate::consts::{CODEPOINT_COLLATION, LOCALE_COLLATION, PRIMARY_COLLATION};
use crate::engine::runtime::{Error, ErrorCode};
use core::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::canonical_combining_class as ccc;

pub trait Collation: Send + Sync {
    fn name(&self) -> &str;
    fn compare(&self, a: &str, b: &str) -> Ordering;
    fn key(&self, s: &str) -> String {
        s.to_string()
    }
}

pub struct CodepointCollation;

impl Collation for CodepointCollation {
    fn name(&self) -> &str {
        CODEPOINT_COLLATION
    }
    fn compare(&self, a: &str, b: &str) -> Ordering {
        a.cmp(b)
    }
}

/// Base letters only: NFD with combining marks removed, then lowercased.
fn base_letters(s: &str) -> String {
    let no_marks: String = s.nfd().filter(|&ch| ccc(ch) == 0).collect();
    no_marks.to_lowercase()
}

/// Lowercased NFD form (accents kept, case dropped).
fn accented_letters(s: &str) -> String {
    s.nfd().collect::<String>().to_lowercase()
}

/// Three-strength collation: base letters, then accents, then case.
///
/// Strings differing only in their Unicode normalization form compare equal.
/// Lowercase sorts before uppercase on the third level.
pub struct LocaleCollation;

impl Collation for LocaleCollation {
    fn name(&self) -> &str {
        LOCALE_COLLATION
    }
    fn compare(&self, a: &str, b: &str) -> Ordering {
        base_letters(a)
            .cmp(&base_letters(b))
            .then_with(|| accented_letters(a).cmp(&accented_letters(b)))
            .then_with(|| {
                let na: String = a.nfd().collect();
                let nb: String = b.nfd().collect();
                // Swapped case so 'a' < 'A' on the tertiary level.
                let flip = |s: &str| -> String {
                    s.chars()
                        .map(|c| {
                            if c.is_lowercase() {
                                c.to_uppercase().next().unwrap_or(c)
                            } else {
                                c.to_lowercase().next().unwrap_or(c)
                            }
                        })
                        .collect()
                };
                flip(&na).cmp(&flip(&nb))
            })
    }
    fn key(&self, s: &str) -> String {
        s.nfd().collect()
    }
}

/// Case and accent insensitive collation.
pub struct PrimaryCollation;

impl Collation for PrimaryCollation {
    fn name(&self) -> &str {
        PRIMARY_COLLATION
    }
    fn compare(&self, a: &str, b: &str) -> Ordering {
        self.key(a).cmp(&self.key(b))
    }
    fn key(&self, s: &str) -> String {
        base_letters(s)
    }
}

/// Registry of available collations, keyed by name.
pub struct CollationRegistry {
    by_name: HashMap<String, Arc<dyn Collation>>,
}

impl Default for CollationRegistry {
    fn default() -> Self {
        let mut reg = Self {
            by_name: HashMap::new(),
        };
        reg.insert(Arc::new(CodepointCollation));
        reg.insert(Arc::new(LocaleCollation));
        reg.insert(Arc::new(PrimaryCollation));
        reg
    }
}

impl CollationRegistry {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn get(&self, name: &str) -> Option<Arc<dyn Collation>> {
        self.by_name.get(name).cloned()
    }
    pub fn insert(&mut self, collation: Arc<dyn Collation>) {
        self.by_name.insert(collation.name().to_string(), collation);
    }
    pub fn default_collation(&self) -> Arc<dyn Collation> {
        self.get(LOCALE_COLLATION)
            .unwrap_or_else(|| Arc::new(LocaleCollation))
    }
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Collation>, Error> {
        self.get(name).ok_or_else(|| {
            Error::from_code(ErrorCode::InvalidArgument, format!("unknown collation: {name}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locale_collation_orders_by_base_letter_first() {
        let c = LocaleCollation;
        assert_eq!(c.compare("apple", "Banana"), Ordering::Less);
        assert_eq!(c.compare("\u{e9}t\u{e9}", "ete"), Ordering::Greater);
        assert_eq!(c.compare("\u{e9}t\u{e9}", "etz"), Ordering::Less);
        assert_eq!(c.compare("a", "A"), Ordering::Less);
        assert_eq!(c.compare("e\u{301}", "\u{e9}"), Ordering::Equal);
    }

    #[test]
    fn primary_collation_ignores_case_and_accents() {
        assert_eq!(PrimaryCollation.compare("\u{c9}TE", "ete"), Ordering::Equal);
    }
}
