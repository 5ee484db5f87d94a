use super::{BuiltinCall, BuiltinRegistry};
use crate::engine::regex_cache::RegexFlags;
use crate::engine::runtime::{Error, ErrorCode};
use crate::value::{Evaluated, MatchItem, RegexMatch, Value};
use fancy_regex::{Captures, Expander, Regex};
use std::sync::Arc;

fn flags_arg(call: &BuiltinCall<'_>, args: &[Value], index: usize, allowed: RegexFlags) -> Result<RegexFlags, Error> {
    Ok(match call.opt_string_arg(args, index)? {
        Some(f) => RegexFlags::parse(&f, call.name, allowed),
        None => RegexFlags::empty(),
    })
}

/// Capture groups as strings, group 0 first; groups that did not take part are "".
fn group_values(caps: &Captures<'_>) -> Arc<[Value]> {
    (0..caps.len())
        .map(|i| Value::from(caps.get(i).map_or("", |m| m.as_str())))
        .collect()
}

/// `?matches(re, flags?)`.
pub(super) fn matches_fn(call: &BuiltinCall<'_>, target: &Value, args: &[Value]) -> Result<Evaluated, Error> {
    let input = call.target_string(target)?;
    let pattern = call.string_arg(args, 0)?;
    let flags = flags_arg(call, args, 1, RegexFlags::COMPILE)?;
    let scan = call.env.patterns.get_or_compile(&pattern, flags)?;
    let whole = call.env.patterns.get_or_compile_anchored(&pattern, flags)?;

    let (entire_input_matched, entire_input_groups) = match whole.captures(&input)? {
        Some(caps) => (true, group_values(&caps)),
        None => (false, Arc::from(Vec::new())),
    };
    let mut items = Vec::new();
    for caps in scan.captures_iter(&input) {
        let caps = caps?;
        let text = caps.get(0).map_or("", |m| m.as_str());
        items.push(Value::MatchItem(Arc::new(MatchItem {
            text: Arc::from(text),
            groups: group_values(&caps),
        })));
    }
    Ok(Some(Value::Match(Arc::new(RegexMatch {
        entire_input_matched,
        entire_input_groups,
        matches: items.into(),
        input,
    }))))
}

/// `?groups` on a `matches` result or on one of its items.
pub(super) fn groups_fn(call: &BuiltinCall<'_>, target: &Value, _args: &[Value]) -> Result<Evaluated, Error> {
    match target {
        Value::Match(m) => Ok(Some(Value::Sequence(m.entire_input_groups.clone()))),
        Value::MatchItem(item) => Ok(Some(Value::Sequence(item.groups.clone()))),
        other => Err(call.error(
            ErrorCode::CoercionFailure,
            format!(
                "expected the result of ?matches or one of its items, but the target is {}",
                other.type_description()
            ),
        )),
    }
}

/// Replacement of every (or the first) match of `re`, expanding `$n` and `${name}`.
fn regex_replace(re: &Regex, input: &str, replacement: &str, first_only: bool) -> Result<String, Error> {
    let expander = Expander::default();
    expander.check(replacement, re)?;
    let mut out = String::with_capacity(input.len());
    let mut last = 0;
    for caps in re.captures_iter(input) {
        let caps = caps?;
        let Some(m) = caps.get(0) else { continue };
        out.push_str(&input[last..m.start()]);
        expander.append_expansion(&mut out, replacement, &caps);
        last = m.end();
        if first_only {
            break;
        }
    }
    out.push_str(&input[last..]);
    Ok(out)
}

/// Literal replacement through a regex (used for case-insensitive literals).
fn literal_replace_with(re: &Regex, input: &str, replacement: &str, first_only: bool) -> Result<String, Error> {
    let mut out = String::with_capacity(input.len());
    let mut last = 0;
    for m in re.find_iter(input) {
        let m = m?;
        out.push_str(&input[last..m.start()]);
        out.push_str(replacement);
        last = m.end();
        if first_only {
            break;
        }
    }
    out.push_str(&input[last..]);
    Ok(out)
}

/// An empty search string matches before every character and at the end.
fn insert_everywhere(input: &str, replacement: &str, first_only: bool) -> String {
    if first_only {
        return format!("{replacement}{input}");
    }
    let mut out = String::with_capacity(input.len() + replacement.len() * (input.len() + 1));
    out.push_str(replacement);
    for ch in input.chars() {
        out.push(ch);
        out.push_str(replacement);
    }
    out
}

/// `?replace(search, replacement, flags?)`; literal unless the `r` flag is given.
pub(super) fn replace_fn(call: &BuiltinCall<'_>, target: &Value, args: &[Value]) -> Result<Evaluated, Error> {
    let input = call.target_string(target)?;
    let search = call.string_arg(args, 0)?;
    let replacement = call.string_arg(args, 1)?;
    let flags = flags_arg(call, args, 2, RegexFlags::all())?;
    let first_only = flags.contains(RegexFlags::FIRST_ONLY);

    let result = if flags.contains(RegexFlags::REGEX) {
        let re = call.env.patterns.get_or_compile(&search, flags)?;
        regex_replace(&re, &input, &replacement, first_only)?
    } else if search.is_empty() {
        insert_everywhere(&input, &replacement, first_only)
    } else if flags.contains(RegexFlags::CASE_INSENSITIVE) {
        let re = call.env.patterns.get_or_compile_literal(&search, flags)?;
        literal_replace_with(&re, &input, &replacement, first_only)?
    } else if first_only {
        input.replacen(&*search, &replacement, 1)
    } else {
        input.replace(&*search, &replacement)
    };
    Ok(Some(Value::from(result)))
}

/// Pieces of `input` between matches of `re`.
fn regex_split(re: &Regex, input: &str) -> Result<Vec<String>, Error> {
    let mut parts = Vec::new();
    let mut last = 0;
    for m in re.find_iter(input) {
        let m = m?;
        // A zero-width match at the very start produces no leading piece.
        if m.end() == 0 {
            continue;
        }
        parts.push(input[last..m.start()].to_string());
        last = m.end();
    }
    parts.push(input[last..].to_string());
    Ok(parts)
}

/// `?split(separator, flags?)`.
///
/// A literal separator keeps every piece, empty ones included; an empty
/// literal separator splits into characters. In `r` mode trailing empty
/// pieces are dropped.
pub(super) fn split_fn(call: &BuiltinCall<'_>, target: &Value, args: &[Value]) -> Result<Evaluated, Error> {
    let input = call.target_string(target)?;
    let sep = call.string_arg(args, 0)?;
    let allowed = RegexFlags::COMPILE | RegexFlags::REGEX;
    let flags = flags_arg(call, args, 1, allowed)?;

    let parts: Vec<String> = if flags.contains(RegexFlags::REGEX) {
        let re = call.env.patterns.get_or_compile(&sep, flags)?;
        let mut parts = regex_split(&re, &input)?;
        while parts.last().is_some_and(String::is_empty) {
            parts.pop();
        }
        parts
    } else if sep.is_empty() {
        input.chars().map(String::from).collect()
    } else if flags.contains(RegexFlags::CASE_INSENSITIVE) {
        let re = call.env.patterns.get_or_compile_literal(&sep, flags)?;
        regex_split(&re, &input)?
    } else {
        input.split(&*sep).map(str::to_string).collect()
    };
    Ok(Some(Value::sequence(parts.into_iter().map(Value::from).collect())))
}

pub(super) fn register(reg: &mut BuiltinRegistry) {
    reg.register_range("matches", 1, 2, matches_fn);
    reg.register("groups", 0, groups_fn);
    reg.register_range("replace", 2, 3, replace_fn);
    reg.register_range("split", 1, 2, split_fn);
}
