use super::{BuiltinCall, BuiltinRegistry};
use crate::engine::coercion::coerce_to_string;
use crate::engine::comparison::values_equal;
use crate::engine::runtime::{Environment, Error, ErrorCode};
use crate::value::{DateKind, DateValue, Evaluated, Number, Value};
use core::cmp::Ordering;
use smallvec::SmallVec;
use std::sync::Arc;

pub(super) fn size_fn(call: &BuiltinCall<'_>, target: &Value, _args: &[Value]) -> Result<Evaluated, Error> {
    let len = if let Some(items) = target.iterable_items() {
        items.len()
    } else if let Some(map) = target.as_hash() {
        map.len()
    } else {
        return Err(call.error(
            ErrorCode::CoercionFailure,
            format!("expected a sequence, collection or hash, but the target is {}", target.type_description()),
        ));
    };
    Ok(Some(Value::from(i32::try_from(len).unwrap_or(i32::MAX))))
}

pub(super) fn first_fn(call: &BuiltinCall<'_>, target: &Value, _args: &[Value]) -> Result<Evaluated, Error> {
    Ok(call.target_items(target)?.first().cloned())
}

pub(super) fn last_fn(call: &BuiltinCall<'_>, target: &Value, _args: &[Value]) -> Result<Evaluated, Error> {
    Ok(call.target_sequence(target)?.last().cloned())
}

pub(super) fn reverse_fn(call: &BuiltinCall<'_>, target: &Value, _args: &[Value]) -> Result<Evaluated, Error> {
    let items = call.target_sequence(target)?;
    Ok(Some(Value::Sequence(items.iter().rev().cloned().collect())))
}

/// `?join(separator, empty_text?, end_text?)`.
pub(super) fn join_fn(call: &BuiltinCall<'_>, target: &Value, args: &[Value]) -> Result<Evaluated, Error> {
    let items = call.target_items(target)?;
    let sep = call.string_arg(args, 0)?;
    let empty = call.opt_string_arg(args, 1)?;
    let end = call.opt_string_arg(args, 2)?;
    if items.is_empty() {
        return Ok(Some(Value::String(empty.unwrap_or_else(|| Arc::from("")))));
    }
    let mut out = String::new();
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push_str(&sep);
        }
        let blame = format!("the item at index {i} of the joined sequence");
        out.push_str(&coerce_to_string(Some(item), call.env, Some(&blame)).map_err(|e| e.at(call.location))?);
    }
    if let Some(end) = end {
        out.push_str(&end);
    }
    Ok(Some(Value::from(out)))
}

/// `?chunk(size, filler?)`: consecutive slices of `size` items, the last one
/// padded with `filler` when given.
pub(super) fn chunk_fn(call: &BuiltinCall<'_>, target: &Value, args: &[Value]) -> Result<Evaluated, Error> {
    let items = call.target_sequence(target)?;
    let size = call.integer_arg(args, 0)?;
    if size < 1 {
        return Err(call.error(
            ErrorCode::InvalidArgument,
            format!("the chunk size must be at least 1, but it was {size}"),
        ));
    }
    let size = size as usize;
    let filler = args.get(1);
    let chunks = items
        .chunks(size)
        .map(|chunk| {
            let mut row: Vec<Value> = chunk.to_vec();
            if let Some(filler) = filler {
                row.resize(size, filler.clone());
            }
            Value::sequence(row)
        })
        .collect();
    Ok(Some(Value::sequence(chunks)))
}

/// Sort key type, fixed by the first item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyType {
    String,
    Number,
    Date(DateKind),
    Boolean,
}

impl KeyType {
    fn describe(self) -> &'static str {
        match self {
            KeyType::String => "strings",
            KeyType::Number => "numbers",
            KeyType::Date(_) => "dates",
            KeyType::Boolean => "booleans",
        }
    }
}

#[derive(Debug, Clone)]
enum SortKey {
    String(Arc<str>),
    Number(Number),
    Date(DateValue),
    Boolean(bool),
}

fn key_type_of(key: &Value) -> Option<KeyType> {
    if key.as_number().is_some() {
        Some(KeyType::Number)
    } else if let Some(d) = key.as_date() {
        Some(KeyType::Date(d.kind))
    } else if key.as_string().is_some() {
        Some(KeyType::String)
    } else if key.as_bool().is_some() {
        Some(KeyType::Boolean)
    } else {
        None
    }
}

fn extract_key(key: &Value, ty: KeyType) -> Option<SortKey> {
    match ty {
        KeyType::String => key.as_string().map(SortKey::String),
        KeyType::Number => key.as_number().map(SortKey::Number),
        KeyType::Date(kind) => key.as_date().filter(|d| d.kind == kind).map(SortKey::Date),
        KeyType::Boolean => key.as_bool().map(SortKey::Boolean),
    }
}

fn sort_failure(call: &BuiltinCall<'_>, index: usize, msg: impl AsRef<str>) -> Error {
    Error::from_code(
        ErrorCode::CoercionFailure,
        format!("?{} failed at sequence index {index}: {}", call.name, msg.as_ref()),
    )
    .at(call.location)
}

/// Total order over keys of one type. NaN keys are rejected before sorting.
fn compare_keys(a: &SortKey, b: &SortKey, env: &Environment) -> Ordering {
    match (a, b) {
        (SortKey::String(a), SortKey::String(b)) => env.collator.compare(a, b),
        (SortKey::Number(a), SortKey::Number(b)) => {
            env.arithmetic.compare_numbers(a, b).unwrap_or(Ordering::Equal)
        }
        (SortKey::Date(a), SortKey::Date(b)) => a.instant.cmp(&b.instant),
        (SortKey::Boolean(a), SortKey::Boolean(b)) => a.cmp(b),
        _ => unreachable!("keys share the type of the first item"),
    }
}

/// Stable sort of `items` by the keys produced by `key_of`.
fn sort_items(
    call: &BuiltinCall<'_>,
    items: &[Value],
    key_of: impl Fn(usize, &Value) -> Result<Value, Error>,
) -> Result<Evaluated, Error> {
    if items.is_empty() {
        return Ok(Some(Value::sequence(Vec::new())));
    }
    let mut ty = None;
    let mut pairs: Vec<(SortKey, Value)> = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let key = key_of(i, item)?;
        let expected = match ty {
            Some(t) => t,
            None => {
                let t = key_type_of(&key).ok_or_else(|| {
                    sort_failure(
                        call,
                        i,
                        format!(
                            "values must be strings, numbers, dates or booleans, but this one is {}",
                            key.type_description()
                        ),
                    )
                })?;
                if t == KeyType::Date(DateKind::Unknown) {
                    return Err(sort_failure(call, i, "can't sort dates whose kind is unknown"));
                }
                ty = Some(t);
                t
            }
        };
        let Some(sort_key) = extract_key(&key, expected) else {
            let found = match key_type_of(&key) {
                Some(KeyType::Date(kind)) if matches!(expected, KeyType::Date(_)) => {
                    format!("a {} date", kind.name())
                }
                _ => key.type_description(),
            };
            return Err(sort_failure(
                call,
                i,
                format!(
                    "all values must be {}, because the first value was like that, but this one is {found}",
                    expected.describe()
                ),
            ));
        };
        if let SortKey::Number(n) = &sort_key
            && n.is_nan()
        {
            return Err(sort_failure(call, i, "NaN can't be compared to other numbers"));
        }
        pairs.push((sort_key, item.clone()));
    }

    pairs.sort_by(|(a, _), (b, _)| compare_keys(a, b, call.env));
    Ok(Some(Value::sequence(pairs.into_iter().map(|(_, item)| item).collect())))
}

pub(super) fn sort_fn(call: &BuiltinCall<'_>, target: &Value, _args: &[Value]) -> Result<Evaluated, Error> {
    let items = call.target_sequence(target)?;
    sort_items(call, &items, |_, item| Ok(item.clone()))
}

/// `?sort_by("key")` or `?sort_by(["outer", "inner"])`.
pub(super) fn sort_by_fn(call: &BuiltinCall<'_>, target: &Value, args: &[Value]) -> Result<Evaluated, Error> {
    let items = call.target_sequence(target)?;
    let path: SmallVec<[Arc<str>; 4]> = if let Some(key) = args[0].as_string() {
        SmallVec::from_elem(key, 1)
    } else if let Some(keys) = args[0].as_sequence() {
        keys.iter()
            .map(|k| {
                k.as_string().ok_or_else(|| {
                    call.error(ErrorCode::InvalidArgument, "the key path must contain strings only")
                })
            })
            .collect::<Result<_, _>>()?
    } else {
        return Err(call.error(
            ErrorCode::InvalidArgument,
            format!(
                "the argument must be a string or a sequence of strings, but it was {}",
                args[0].type_description()
            ),
        ));
    };
    if path.is_empty() {
        return Err(call.error(ErrorCode::InvalidArgument, "the key path can't be empty"));
    }

    sort_items(call, &items, |i, item| {
        let mut current = item.clone();
        for (step, key) in path.iter().enumerate() {
            let Some(map) = current.as_hash() else {
                let msg = if step == 0 {
                    format!(
                        "Sequence items must be hashes when using ?{}, but this one is {}",
                        call.name,
                        current.type_description()
                    )
                } else {
                    format!("The \"{}\" subvariable is not a hash, so ?{} can't go on with the key path", path[step - 1], call.name)
                };
                return Err(sort_failure(call, i, msg));
            };
            current = map.get(&**key).cloned().ok_or_else(|| {
                sort_failure(call, i, format!("The \"{key}\" subvariable was not found."))
            })?;
        }
        Ok(current)
    })
}

/// Position of the first item equal to `needle` scanning from `start`,
/// clamped into range.
fn index_of(items: &[Value], needle: &Value, start: Option<i32>, env: &Environment) -> Result<i32, Error> {
    let start = match start {
        None => 0,
        Some(s) if s < 0 => 0,
        Some(s) => s as usize,
    };
    for (i, item) in items.iter().enumerate().skip(start) {
        if values_equal(item, needle, env)? {
            return Ok(i32::try_from(i).unwrap_or(i32::MAX));
        }
    }
    Ok(-1)
}

fn last_index_of(items: &[Value], needle: &Value, start: Option<i32>, env: &Environment) -> Result<i32, Error> {
    let len = items.len();
    let upper = match start {
        None => len,
        Some(s) if s < 0 => return Ok(-1),
        Some(s) => (s as usize).saturating_add(1).min(len),
    };
    for i in (0..upper).rev() {
        if values_equal(&items[i], needle, env)? {
            return Ok(i32::try_from(i).unwrap_or(i32::MAX));
        }
    }
    Ok(-1)
}

pub(super) fn seq_contains_fn(call: &BuiltinCall<'_>, target: &Value, args: &[Value]) -> Result<Evaluated, Error> {
    let items = call.target_items(target)?;
    for item in items.iter() {
        if values_equal(item, &args[0], call.env)? {
            return Ok(Some(Value::from(true)));
        }
    }
    Ok(Some(Value::from(false)))
}

pub(super) fn seq_index_of_fn(call: &BuiltinCall<'_>, target: &Value, args: &[Value]) -> Result<Evaluated, Error> {
    let items = call.target_items(target)?;
    let start = match args.len() {
        1 => None,
        2 => Some(call.integer_arg(args, 1)?),
        _ => unreachable!("registry guarantees arity in range"),
    };
    index_of(&items, &args[0], start, call.env).map(|i| Some(Value::from(i)))
}

pub(super) fn seq_last_index_of_fn(call: &BuiltinCall<'_>, target: &Value, args: &[Value]) -> Result<Evaluated, Error> {
    let items = call.target_items(target)?;
    let start = match args.len() {
        1 => None,
        2 => Some(call.integer_arg(args, 1)?),
        _ => unreachable!("registry guarantees arity in range"),
    };
    last_index_of(&items, &args[0], start, call.env).map(|i| Some(Value::from(i)))
}

pub(super) fn register(reg: &mut BuiltinRegistry) {
    reg.register("size", 0, size_fn);
    reg.register("first", 0, first_fn);
    reg.register("last", 0, last_fn);
    reg.register("reverse", 0, reverse_fn);
    reg.register_range("join", 1, 3, join_fn);
    reg.register_range("chunk", 1, 2, chunk_fn);
    reg.register("sort", 0, sort_fn);
    reg.register("sort_by", 1, sort_by_fn);
    reg.register("seq_contains", 1, seq_contains_fn);
    reg.register_range("seq_index_of", 1, 2, seq_index_of_fn);
    reg.register_range("seq_last_index_of", 1, 2, seq_last_index_of_fn);
}
