use indexmap::IndexMap;
use pretty_assertions::assert_eq;
use rstest::rstest;
use std::sync::Arc;
use stencil_eval::{
    Capabilities, Environment, ErrorCode, Expr, HostObject, Value, evaluate_to_bool,
    evaluate_to_string,
};

/// Wraps an already converted value and exposes it under a fixed capability set.
#[derive(Debug)]
struct Wrapped {
    capabilities: Capabilities,
    view: Option<Value>,
    empty: bool,
}

impl HostObject for Wrapped {
    fn type_name(&self) -> &str {
        "com.example.Wrapped"
    }
    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }
    fn is_empty(&self) -> bool {
        self.empty
    }
    fn model_view(&self) -> Option<Value> {
        self.view.clone()
    }
}

fn host(capabilities: Capabilities, view: Option<Value>, empty: bool) -> Value {
    Value::Host(Arc::new(Wrapped {
        capabilities,
        view,
        empty,
    }))
}

fn env_with(name: &str, value: Value) -> Environment {
    Environment::builder().with_variable(name, value).build()
}

#[rstest]
fn string_hosts_interpolate_and_feed_builtins() {
    let env = env_with("h", host(Capabilities::STRING, Some(Value::from("wrapped")), false));
    assert_eq!(evaluate_to_string(&Expr::variable("h"), &env).unwrap().as_ref(), "wrapped");
    let upper = Expr::builtin(Expr::variable("h"), "upper_case", vec![]);
    assert_eq!(evaluate_to_string(&upper, &env).unwrap().as_ref(), "WRAPPED");
}

#[rstest]
fn hash_hosts_support_key_access() {
    let mut map = IndexMap::new();
    map.insert("name".to_string(), Value::from("Bob"));
    let env = env_with("h", host(Capabilities::HASH, Some(Value::hash(map)), false));
    let name = Expr::dot(Expr::variable("h"), "name");
    assert_eq!(evaluate_to_string(&name, &env).unwrap().as_ref(), "Bob");
}

#[rstest]
fn views_outside_the_declared_capabilities_are_ignored() {
    // The view is a string, but the host only claims to be a number.
    let env = env_with("h", host(Capabilities::NUMBER, Some(Value::from("text")), false));
    let err = evaluate_to_string(&Expr::variable("h"), &env).unwrap_err();
    assert_eq!(err.code(), ErrorCode::CoercionFailure);
}

#[rstest]
fn opaque_hosts_name_their_type_in_errors() {
    let env = env_with("h", host(Capabilities::empty(), None, false));
    let err = evaluate_to_string(&Expr::variable("h"), &env).unwrap_err();
    assert_eq!(err.code(), ErrorCode::CoercionFailure);
    assert!(err.message.contains("com.example.Wrapped"), "{}", err.message);
}

#[rstest]
#[case(true, false)]
#[case(false, true)]
fn classic_truthiness_asks_the_host(#[case] empty: bool, #[case] expected: bool) {
    let env = Environment::builder()
        .with_classic_compatible(true)
        .with_variable("h", host(Capabilities::empty(), None, empty))
        .build();
    assert_eq!(evaluate_to_bool(&Expr::variable("h"), &env).unwrap(), expected);
}
