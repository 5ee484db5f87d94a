//! Built-in catalog (`x?name` and `x?name(args)`) and its registry.

use crate::engine::arithmetic::to_exact_integer;
use crate::engine::coercion::coerce_to_string;
use crate::engine::runtime::{Environment, Error, ErrorCode, SourceLocation};
use crate::value::{Evaluated, Number, Value};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

pub mod datetime;
pub mod glob;
pub mod numeric;
pub mod regex;
pub mod sequences;
pub mod strings;

pub type Arity = usize;

/// A built-in receives the target value (left of `?`) and the evaluated arguments.
pub type BuiltinImpl =
    Arc<dyn Fn(&BuiltinCall<'_>, &Value, &[Value]) -> Result<Evaluated, Error> + Send + Sync>;

// (min_arity, max_arity, impl)
pub type BuiltinOverload = (Arity, Arity, BuiltinImpl);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    Unknown(String),
    /// The built-in exists, but not for the requested number of arguments.
    WrongArity { name: String, available: Vec<Arity> },
}

impl From<ResolveError> for Error {
    fn from(e: ResolveError) -> Self {
        match e {
            ResolveError::Unknown(name) => Error::from_code(
                ErrorCode::InvalidReference,
                format!("unknown built-in: ?{name}"),
            ),
            ResolveError::WrongArity { name, available } => {
                let counts: Vec<String> = available.iter().map(ToString::to_string).collect();
                Error::from_code(
                    ErrorCode::ArgumentCount,
                    format!(
                        "?{name} expects {} argument(s)",
                        counts.join(" or ")
                    ),
                )
            }
        }
    }
}

/// Call site information handed to every built-in.
pub struct BuiltinCall<'a> {
    pub env: &'a Environment,
    pub name: &'a str,
    pub location: Option<SourceLocation>,
}

impl<'a> BuiltinCall<'a> {
    pub fn new(env: &'a Environment, name: &'a str) -> Self {
        Self {
            env,
            name,
            location: None,
        }
    }

    #[must_use]
    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }

    pub fn error(&self, code: ErrorCode, msg: impl AsRef<str>) -> Error {
        Error::from_code(code, format!("?{}: {}", self.name, msg.as_ref())).at(self.location)
    }

    /// The target as a string; numbers and dates are formatted first.
    pub fn target_string(&self, target: &Value) -> Result<Arc<str>, Error> {
        let blame = format!("the left-hand operand of ?{}", self.name);
        coerce_to_string(Some(target), self.env, Some(&blame)).map_err(|e| e.at(self.location))
    }

    pub fn target_number(&self, target: &Value) -> Result<Number, Error> {
        target.as_number().ok_or_else(|| {
            self.error(
                ErrorCode::CoercionFailure,
                format!("expected a number, but the target is {}", target.type_description()),
            )
        })
    }

    pub fn target_sequence(&self, target: &Value) -> Result<Arc<[Value]>, Error> {
        target.as_sequence().ok_or_else(|| {
            self.error(
                ErrorCode::CoercionFailure,
                format!("expected a sequence, but the target is {}", target.type_description()),
            )
        })
    }

    /// Sequence items, or collection items when the target isn't indexable.
    pub fn target_items(&self, target: &Value) -> Result<Arc<[Value]>, Error> {
        target.iterable_items().ok_or_else(|| {
            self.error(
                ErrorCode::CoercionFailure,
                format!(
                    "expected a sequence or collection, but the target is {}",
                    target.type_description()
                ),
            )
        })
    }

    fn bad_argument(&self, index: usize, expected: &str, found: &Value) -> Error {
        self.error(
            ErrorCode::InvalidArgument,
            format!(
                "argument #{} must be {expected}, but it was {}",
                index + 1,
                found.type_description()
            ),
        )
    }

    pub fn string_arg(&self, args: &[Value], index: usize) -> Result<Arc<str>, Error> {
        let v = &args[index];
        v.as_string().ok_or_else(|| self.bad_argument(index, "a string", v))
    }

    pub fn opt_string_arg(&self, args: &[Value], index: usize) -> Result<Option<Arc<str>>, Error> {
        args.get(index).map(|_| self.string_arg(args, index)).transpose()
    }

    pub fn number_arg(&self, args: &[Value], index: usize) -> Result<Number, Error> {
        let v = &args[index];
        v.as_number().ok_or_else(|| self.bad_argument(index, "a number", v))
    }

    /// Whole number argument that fits an `i32`.
    pub fn integer_arg(&self, args: &[Value], index: usize) -> Result<i32, Error> {
        let n = self.number_arg(args, index)?;
        to_exact_integer(&n).map_err(|e| e.at(self.location))
    }
}

/// Built-ins by name, each with one or more arity ranges.
#[derive(Default)]
pub struct BuiltinRegistry {
    fns: HashMap<String, Vec<BuiltinOverload>>,
}

impl BuiltinRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: &str, arity: Arity, f: F)
    where
        F: 'static + Send + Sync + Fn(&BuiltinCall<'_>, &Value, &[Value]) -> Result<Evaluated, Error>,
    {
        self.register_range(name, arity, arity, f);
    }

    pub fn register_range<F>(&mut self, name: &str, min_arity: Arity, max_arity: Arity, f: F)
    where
        F: 'static + Send + Sync + Fn(&BuiltinCall<'_>, &Value, &[Value]) -> Result<Evaluated, Error>,
    {
        let overloads = self.fns.entry(name.to_string()).or_default();
        overloads.push((min_arity, max_arity, Arc::new(f)));
        // Narrowest range first so the most specific overload wins.
        overloads.sort_by_key(|(min, max, _)| (max - min, *min));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fns.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fns.keys().map(String::as_str)
    }

    pub fn resolve(&self, name: &str, arity: Arity) -> Result<&BuiltinImpl, ResolveError> {
        let Some(overloads) = self.fns.get(name) else {
            return Err(ResolveError::Unknown(name.to_string()));
        };
        if let Some((_, _, f)) = overloads
            .iter()
            .find(|(min, max, _)| (*min..=*max).contains(&arity))
        {
            return Ok(f);
        }
        let mut available: Vec<Arity> = overloads
            .iter()
            .flat_map(|(min, max, _)| *min..=*max)
            .collect();
        available.sort_unstable();
        available.dedup();
        Err(ResolveError::WrongArity {
            name: name.to_string(),
            available,
        })
    }

    /// Resolves and invokes `name` on `target`.
    pub fn call(
        &self,
        call: &BuiltinCall<'_>,
        target: &Value,
        args: &[Value],
    ) -> Result<Evaluated, Error> {
        let f = self
            .resolve(call.name, args.len())
            .map_err(|e| Error::from(e).at(call.location))?;
        f(call, target, args).map_err(|e| e.at(call.location))
    }
}

fn register_default_builtins(reg: &mut BuiltinRegistry) {
    strings::register(reg);
    glob::register(reg);
    regex::register(reg);
    sequences::register(reg);
    numeric::register(reg);
    datetime::register(reg);
}

/// The standard catalog, built once and shared.
pub fn default_builtin_registry() -> Arc<BuiltinRegistry> {
    static DEFAULT: OnceLock<Arc<BuiltinRegistry>> = OnceLock::new();
    DEFAULT
        .get_or_init(|| {
            let mut reg = BuiltinRegistry::new();
            register_default_builtins(&mut reg);
            Arc::new(reg)
        })
        .clone()
}
