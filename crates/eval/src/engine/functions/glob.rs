//! Path globs (`?`, `*`, `**`) compiled to anchored regular expressions.

use super::{BuiltinCall, BuiltinRegistry};
use crate::engine::regex_cache::RegexFlags;
use crate::engine::runtime::{Error, ErrorCode};
use crate::value::{Evaluated, Value};
use fancy_regex::{Regex, RegexBuilder};

fn glob_error(glob: &str, msg: &str) -> Error {
    Error::from_code(ErrorCode::ParseFailure, format!("malformed glob {glob:?}: {msg}"))
}

/// Appends `literal` (still carrying glob backslash escapes) as quoted regex text.
fn push_literal(out: &mut String, literal: &[char]) {
    let mut unescaped = String::with_capacity(literal.len());
    let mut chars = literal.iter();
    while let Some(&ch) = chars.next() {
        if ch == '\\' {
            // A trailing lone backslash escapes nothing and is dropped.
            if let Some(&next) = chars.next() {
                unescaped.push(next);
            }
        } else {
            unescaped.push(ch);
        }
    }
    out.push_str(&fancy_regex::escape(&unescaped));
}

/// Regex source (unanchored) equivalent to `glob`.
///
/// `?` matches one character other than `/`, `*` a run of such characters.
/// `**` must be a whole path step: `**/` matches zero or more steps and a
/// trailing `**` matches anything. A backslash escapes the next character.
/// Character classes and alternatives are not supported.
pub fn glob_to_regex_source(glob: &str) -> Result<String, Error> {
    let chars: Vec<char> = glob.chars().collect();
    let mut out = String::with_capacity(glob.len() * 2);
    let mut literal_start = 0;
    let mut escaped = false;
    let mut i = 0;
    while i < chars.len() {
        let ch = chars[i];
        if escaped {
            escaped = false;
            i += 1;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '?' => {
                push_literal(&mut out, &chars[literal_start..i]);
                out.push_str("[^/]");
                literal_start = i + 1;
            }
            '*' => {
                push_literal(&mut out, &chars[literal_start..i]);
                if chars.get(i + 1) == Some(&'*') {
                    if i > 0 && chars[i - 1] != '/' {
                        return Err(glob_error(
                            glob,
                            "\"**\" must be either preceded by \"/\" or be at the beginning",
                        ));
                    }
                    match chars.get(i + 2) {
                        None => {
                            out.push_str(".*");
                            i += 1;
                        }
                        Some('/') => {
                            out.push_str("(?:.*?/)*");
                            i += 2;
                        }
                        Some(_) => {
                            return Err(glob_error(
                                glob,
                                "\"**\" must be either followed by \"/\" or be at the end",
                            ));
                        }
                    }
                } else {
                    out.push_str("[^/]*");
                }
                literal_start = i + 1;
            }
            '[' | '{' => {
                return Err(glob_error(
                    glob,
                    &format!("the {ch:?} syntax is unsupported; escape it with a backslash"),
                ));
            }
            _ => {}
        }
        i += 1;
    }
    push_literal(&mut out, &chars[literal_start..]);
    Ok(out)
}

/// Compiles `glob` to a regex that matches whole strings only.
pub fn glob_to_regex(glob: &str, case_insensitive: bool) -> Result<Regex, Error> {
    let source = glob_to_regex_source(glob)?;
    RegexBuilder::new(&format!("\\A(?:{source})\\z"))
        .case_insensitive(case_insensitive)
        .build()
        .map_err(Error::from)
}

/// `?glob_matches(glob, flags?)`; only the `i` flag applies.
pub(super) fn glob_matches_fn(
    call: &BuiltinCall<'_>,
    target: &Value,
    args: &[Value],
) -> Result<Evaluated, Error> {
    let s = call.target_string(target)?;
    let glob = call.string_arg(args, 0)?;
    let flags = match call.opt_string_arg(args, 1)? {
        Some(f) => RegexFlags::parse(&f, call.name, RegexFlags::CASE_INSENSITIVE),
        None => RegexFlags::empty(),
    };
    let source = glob_to_regex_source(&glob).map_err(|e| e.at(call.location))?;
    let re = call.env.patterns.get_or_compile_anchored(&source, flags)?;
    Ok(Some(Value::from(re.is_match(&s)?)))
}

pub(super) fn register(reg: &mut BuiltinRegistry) {
    reg.register_range("glob_matches", 1, 2, glob_matches_fn);
}
