//! String built-ins and the escaping codecs behind them.

use super::{BuiltinCall, BuiltinRegistry};
use crate::engine::coercion::{coerce_to_string, format_computer_number, format_locale_number};
use crate::engine::runtime::{Error, ErrorCode};
use crate::engine::temporal::format_with_setting;
use crate::value::{Evaluated, Value};
use core::fmt::Write as _;
use std::sync::Arc;

/// Copy-on-first-change output buffer over a source string.
struct Rewriter<'a> {
    src: &'a str,
    out: Option<String>,
}

impl<'a> Rewriter<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, out: None }
    }

    /// Buffer for the replacement of the char starting at `byte_idx`.
    fn replace_at(&mut self, byte_idx: usize) -> &mut String {
        let src = self.src;
        self.out.get_or_insert_with(|| {
            let mut buf = String::with_capacity(src.len() + 16);
            buf.push_str(&src[..byte_idx]);
            buf
        })
    }

    fn keep(&mut self, ch: char) {
        if let Some(out) = self.out.as_mut() {
            out.push(ch);
        }
    }

    fn finish(self, original: &Arc<str>) -> Arc<str> {
        match self.out {
            Some(out) => Arc::from(out),
            None => Arc::clone(original),
        }
    }
}

/// Whether a `>` at this point could complete a `]]>` CDATA end marker.
fn may_close_cdata(prev: Option<char>, prev_prev: Option<char>) -> bool {
    match prev {
        None => true,
        Some(']') => prev_prev.is_none_or(|c| c == ']'),
        Some(_) => false,
    }
}

fn escape_markup(s: &Arc<str>, apos: Option<&str>) -> Arc<str> {
    let mut w = Rewriter::new(s);
    for (idx, ch) in s.char_indices() {
        let replacement = match ch {
            '<' => "&lt;",
            '>' => "&gt;",
            '&' => "&amp;",
            '"' => "&quot;",
            '\'' => match apos {
                Some(entity) => entity,
                None => {
                    w.keep(ch);
                    continue;
                }
            },
            _ => {
                w.keep(ch);
                continue;
            }
        };
        w.replace_at(idx).push_str(replacement);
    }
    w.finish(s)
}

/// HTML escaping: `<`, `>`, `&` and `"`; apostrophes are left alone.
pub fn html_escape(s: &Arc<str>) -> Arc<str> {
    escape_markup(s, None)
}

/// XML escaping, apostrophe as `&apos;`.
pub fn xml_escape(s: &Arc<str>) -> Arc<str> {
    escape_markup(s, Some("&apos;"))
}

/// XHTML escaping, apostrophe as `&#39;` (understood by HTML parsers too).
pub fn xhtml_escape(s: &Arc<str>) -> Arc<str> {
    escape_markup(s, Some("&#39;"))
}

fn escape_xml_minimal(s: &Arc<str>, quotes: bool) -> Arc<str> {
    let mut w = Rewriter::new(s);
    let (mut prev, mut prev_prev) = (None, None);
    for (idx, ch) in s.char_indices() {
        let replacement = match ch {
            '<' => Some("&lt;"),
            '&' => Some("&amp;"),
            '"' if quotes => Some("&quot;"),
            '>' if may_close_cdata(prev, prev_prev) => Some("&gt;"),
            _ => None,
        };
        match replacement {
            Some(r) => w.replace_at(idx).push_str(r),
            None => w.keep(ch),
        }
        prev_prev = prev;
        prev = Some(ch);
    }
    w.finish(s)
}

/// Escaping for a double-quoted XML attribute value: `<`, `&`, `"`, and `>`
/// only where it could end a CDATA section.
pub fn xml_enc_q_attr(s: &Arc<str>) -> Arc<str> {
    escape_xml_minimal(s, true)
}

/// Escaping for XML text content: `<`, `&`, and `>` only after `]]`.
pub fn xml_enc_nqg(s: &Arc<str>) -> Arc<str> {
    escape_xml_minimal(s, false)
}

/// RTF escaping: `\`, `{` and `}` get a backslash.
pub fn rtf_escape(s: &Arc<str>) -> Arc<str> {
    let mut w = Rewriter::new(s);
    for (idx, ch) in s.char_indices() {
        if matches!(ch, '\\' | '{' | '}') {
            let out = w.replace_at(idx);
            out.push('\\');
            out.push(ch);
        } else {
            w.keep(ch);
        }
    }
    w.finish(s)
}

enum JsEscape {
    Letter(char),
    Backslash,
    Hex,
}

fn push_hex(out: &mut String, ch: char, json: bool) {
    let code = u32::from(ch);
    // Writing into a String can't fail.
    let _ = if !json && code < 0x100 {
        write!(out, "\\x{code:02X}")
    } else {
        write!(out, "\\u{code:04X}")
    };
}

/// Escapes `s` for a JavaScript (`json == false`) or JSON string literal.
///
/// Besides quotes, backslashes and control characters, this escapes the
/// characters that could end an enclosing HTML `<script>` element or XML
/// CDATA/comment: `/` after `<`, `>` after `]]` or `--`, and `<` before `!`
/// or `?`. Positions at the edges of `s` are treated as dangerous since the
/// neighbouring text is unknown. Returns `s` itself when nothing needed
/// escaping.
pub fn js_string_enc(s: &Arc<str>, json: bool) -> Arc<str> {
    let mut w = Rewriter::new(s);
    let (mut prev, mut prev_prev): (Option<char>, Option<char>) = (None, None);
    let mut chars = s.char_indices().peekable();
    while let Some((idx, ch)) = chars.next() {
        let common = (ch > '>' && ch < '\u{7f}' && ch != '\\')
            || ch == ' '
            || ('\u{a0}'..'\u{2028}').contains(&ch);
        let escape = if common {
            None
        } else {
            match ch {
                '\n' => Some(JsEscape::Letter('n')),
                '\r' => Some(JsEscape::Letter('r')),
                '\u{c}' => Some(JsEscape::Letter('f')),
                '\u{8}' => Some(JsEscape::Letter('b')),
                '\t' => Some(JsEscape::Letter('t')),
                '\0'..='\u{1f}' => Some(JsEscape::Hex),
                '"' | '\\' => Some(JsEscape::Backslash),
                '\'' if !json => Some(JsEscape::Backslash),
                '/' if prev.is_none_or(|p| p == '<') => Some(JsEscape::Backslash),
                '>' => {
                    let dangerous = match prev {
                        None => true,
                        Some(p @ (']' | '-')) => prev_prev.is_none_or(|pp| pp == p),
                        Some(_) => false,
                    };
                    match (dangerous, json) {
                        (false, _) => None,
                        (true, true) => Some(JsEscape::Hex),
                        (true, false) => Some(JsEscape::Backslash),
                    }
                }
                '<' => {
                    let dangerous = chars.peek().is_none_or(|(_, next)| matches!(next, '!' | '?'));
                    dangerous.then_some(JsEscape::Hex)
                }
                '\u{7f}'..='\u{9f}' | '\u{2028}' | '\u{2029}' => Some(JsEscape::Hex),
                _ => None,
            }
        };
        match escape {
            None => w.keep(ch),
            Some(JsEscape::Letter(letter)) => {
                let out = w.replace_at(idx);
                out.push('\\');
                out.push(letter);
            }
            Some(JsEscape::Backslash) => {
                let out = w.replace_at(idx);
                out.push('\\');
                out.push(ch);
            }
            Some(JsEscape::Hex) => push_hex(w.replace_at(idx), ch, json),
        }
        prev_prev = prev;
        prev = Some(ch);
    }
    w.finish(s)
}

fn escaping_builtin(
    reg: &mut BuiltinRegistry,
    name: &str,
    escape: fn(&Arc<str>) -> Arc<str>,
) {
    reg.register(name, 0, move |call, target, _args| {
        let s = call.target_string(target)?;
        Ok(Some(Value::String(escape(&s))))
    });
}

pub(super) fn length_fn(call: &BuiltinCall<'_>, target: &Value, _args: &[Value]) -> Result<Evaluated, Error> {
    let s = call.target_string(target)?;
    let len = i32::try_from(s.chars().count()).unwrap_or(i32::MAX);
    Ok(Some(Value::from(len)))
}

pub(super) fn trim_fn(call: &BuiltinCall<'_>, target: &Value, _args: &[Value]) -> Result<Evaluated, Error> {
    let s = call.target_string(target)?;
    let trimmed = s.trim_matches(|c: char| c <= ' ');
    if trimmed.len() == s.len() {
        return Ok(Some(Value::String(s)));
    }
    Ok(Some(Value::from(trimmed)))
}

fn substring_test(
    reg: &mut BuiltinRegistry,
    name: &str,
    test: fn(&str, &str) -> bool,
) {
    reg.register(name, 1, move |call, target, args| {
        let s = call.target_string(target)?;
        let needle = call.string_arg(args, 0)?;
        Ok(Some(Value::from(test(&s, &needle))))
    });
}

/// `?number`: parses the target with the environment's arithmetic engine.
pub(super) fn number_fn(call: &BuiltinCall<'_>, target: &Value, _args: &[Value]) -> Result<Evaluated, Error> {
    if let Some(n) = target.as_number() {
        return Ok(Some(Value::Number(n)));
    }
    let s = call.target_string(target)?;
    let n = call.env.arithmetic.to_number(s.trim())?;
    Ok(Some(Value::Number(n)))
}

fn boolean_texts(call: &BuiltinCall<'_>, args: &[Value]) -> Result<Option<(Arc<str>, Arc<str>)>, Error> {
    match args.len() {
        0 => Ok(None),
        1 => {
            let spec = call.string_arg(args, 0)?;
            let Some((yes, no)) = spec.split_once(',') else {
                return Err(call.error(
                    ErrorCode::InvalidArgument,
                    format!("boolean format must be \"true_text,false_text\", but was {spec:?}"),
                ));
            };
            Ok(Some((Arc::from(yes), Arc::from(no))))
        }
        2 => Ok(Some((call.string_arg(args, 0)?, call.string_arg(args, 1)?))),
        _ => unreachable!("registry guarantees arity in range"),
    }
}

/// `?string`, `?string(format)`, `?string(yes, no)`.
pub(super) fn string_fn(call: &BuiltinCall<'_>, target: &Value, args: &[Value]) -> Result<Evaluated, Error> {
    let single_format = |what: &str| -> Result<(), Error> {
        if args.len() > 1 {
            return Err(call.error(
                ErrorCode::ArgumentCount,
                format!("?{} expects at most 1 argument when the target is {what}", call.name),
            ));
        }
        Ok(())
    };
    if let Some(n) = target.as_number() {
        single_format("a number")?;
        let text = match call.opt_string_arg(args, 0)?.as_deref() {
            None => return call.target_string(target).map(|s| Some(Value::String(s))),
            Some("c" | "computer") => format_computer_number(&n),
            Some("number") => format_locale_number(&n, &call.env.locale),
            Some(other) => {
                return Err(call.error(
                    ErrorCode::InvalidArgument,
                    format!("unsupported number format {other:?}; use \"number\" or \"c\""),
                ));
            }
        };
        return Ok(Some(Value::from(text)));
    }
    if let Some(d) = target.as_date() {
        single_format("a date")?;
        let Some(setting) = call.opt_string_arg(args, 0)? else {
            return call.target_string(target).map(|s| Some(Value::String(s)));
        };
        let text = format_with_setting(&d, &setting, call.env.time_zone, call.env.calendar)
            .map_err(|e| e.at(call.location))?;
        return Ok(Some(Value::from(text)));
    }
    if let Some(b) = target.as_bool() {
        return match boolean_texts(call, args)? {
            Some((yes, no)) => Ok(Some(Value::String(if b { yes } else { no }))),
            None => coerce_to_string(Some(target), call.env, Some("the left-hand operand of ?string"))
                .map(|s| Some(Value::String(s))),
        };
    }
    call.target_string(target).map(|s| Some(Value::String(s)))
}

pub(super) fn register(reg: &mut BuiltinRegistry) {
    escaping_builtin(reg, "html", html_escape);
    escaping_builtin(reg, "xhtml", xhtml_escape);
    escaping_builtin(reg, "xml", xml_escape);
    escaping_builtin(reg, "rtf", rtf_escape);
    escaping_builtin(reg, "js_string", |s| js_string_enc(s, false));
    escaping_builtin(reg, "json_string", |s| js_string_enc(s, true));
    reg.register("length", 0, length_fn);
    reg.register("upper_case", 0, |call, target, _| {
        let s = call.target_string(target)?;
        Ok(Some(Value::from(s.to_uppercase())))
    });
    reg.register("lower_case", 0, |call, target, _| {
        let s = call.target_string(target)?;
        Ok(Some(Value::from(s.to_lowercase())))
    });
    reg.register("trim", 0, trim_fn);
    substring_test(reg, "contains", |s, needle| s.contains(needle));
    substring_test(reg, "starts_with", |s, needle| s.starts_with(needle));
    substring_test(reg, "ends_with", |s, needle| s.ends_with(needle));
    reg.register("number", 0, number_fn);
    reg.register_range("string", 0, 2, string_fn);
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn arc(s: &str) -> Arc<str> {
        Arc::from(s)
    }

    #[test]
    fn unchanged_input_is_returned_as_is() {
        let s = arc("==> I/m <safe>!");
        assert!(Arc::ptr_eq(&js_string_enc(&s, false), &s));
        let plain = arc("nothing to do");
        assert!(Arc::ptr_eq(&xml_escape(&plain), &plain));
        assert!(Arc::ptr_eq(&rtf_escape(&plain), &plain));
    }

    #[test]
    fn js_and_json_differ_on_apostrophe_and_gt() {
        assert_eq!(&*js_string_enc(&arc("it's"), false), "it\\'s");
        assert_eq!(&*js_string_enc(&arc("it's"), true), "it's");
        assert_eq!(&*js_string_enc(&arc("]]>"), false), "]]\\>");
        assert_eq!(&*js_string_enc(&arc("-->"), true), "--\\u003E");
        assert_eq!(&*js_string_enc(&arc("a>b"), true), "a>b");
    }

    #[test]
    fn js_hex_escapes() {
        assert_eq!(&*js_string_enc(&arc("\u{1}"), false), "\\x01");
        assert_eq!(&*js_string_enc(&arc("\u{1}"), true), "\\u0001");
        assert_eq!(&*js_string_enc(&arc("a\u{2028}"), false), "a\\u2028");
        assert_eq!(&*js_string_enc(&arc("<!--"), false), "\\x3C!--");
        assert_eq!(&*js_string_enc(&arc("x<"), true), "x\\u003C");
        assert_eq!(&*js_string_enc(&arc("</p>"), false), "<\\/p>");
        assert_eq!(&*js_string_enc(&arc("a\n\t\"b"), false), "a\\n\\t\\\"b");
    }

    #[test]
    fn markup_escapes() {
        assert_eq!(&*html_escape(&arc("<a href=\"x\">'&'</a>")), "&lt;a href=&quot;x&quot;&gt;'&amp;'&lt;/a&gt;");
        assert_eq!(&*xml_escape(&arc("'")), "&apos;");
        assert_eq!(&*xhtml_escape(&arc("'")), "&#39;");
        assert_eq!(&*xml_enc_nqg(&arc("a>b]]>\"")), "a>b]]&gt;\"");
        assert_eq!(&*xml_enc_q_attr(&arc(">\"<")), "&gt;&quot;&lt;");
        assert_eq!(&*rtf_escape(&arc("{\\}")), "\\{\\\\\\}");
    }
}
