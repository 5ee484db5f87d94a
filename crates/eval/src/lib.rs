pub mod consts;
pub mod engine;
pub mod value;

pub use engine::arithmetic::{ArithmeticEngine, LegacyArithmetic, PreciseArithmetic};
pub use engine::collation::{Collation, CollationRegistry};
pub use engine::comparison::{CompareMode, CompareOp, compare_values, values_equal};
pub use engine::evaluator::{
    ArithmeticOp, Expr, ExprKind, evaluate, evaluate_to_bool, evaluate_to_string,
    evaluate_to_value,
};
pub use engine::functions::{BuiltinCall, BuiltinRegistry, default_builtin_registry};
pub use engine::regex_cache::{PatternCache, RegexFlags};
pub use engine::runtime::{Environment, EnvironmentBuilder, Error, ErrorCode, SourceLocation};
pub use engine::temporal::{Accuracy, CalendarPolicy, Dialect, TimeZoneSpec};
pub use value::{Capabilities, DateKind, DateValue, Evaluated, HostObject, Number, Value};
