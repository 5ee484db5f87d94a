pub mod arithmetic;
pub mod coercion;
pub mod collation;
pub mod comparison;
pub mod evaluator;
pub mod functions;
pub mod regex_cache;
pub mod runtime;
pub mod temporal;
