use indexmap::IndexMap;
use pretty_assertions::assert_eq;
use rstest::{fixture, rstest};
use stencil_eval::{
    ArithmeticOp, CompareOp, Environment, ErrorCode, Expr, SourceLocation, Value, evaluate,
    evaluate_to_bool, evaluate_to_string, evaluate_to_value,
};

fn hash(entries: Vec<(&str, Value)>) -> Value {
    let map: IndexMap<String, Value> = entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
    Value::hash(map)
}

#[fixture]
fn env() -> Environment {
    let user = hash(vec![
        ("name", Value::from("Ann")),
        ("tags", Value::sequence(vec![Value::from("a"), Value::from("b")])),
    ]);
    Environment::builder()
        .with_data_model(hash(vec![("user", user)]))
        .with_variable("x", 2)
        .build()
}

fn var(name: &str) -> Expr {
    Expr::variable(name)
}

fn text(expr: &Expr, env: &Environment) -> String {
    evaluate_to_string(expr, env).unwrap().to_string()
}

#[rstest]
fn variables_dots_and_indexes(env: Environment) {
    assert_eq!(text(&Expr::dot(var("user"), "name"), &env), "Ann");
    assert_eq!(text(&Expr::index(Expr::dot(var("user"), "tags"), Expr::number(1)), &env), "b");
    assert_eq!(text(&Expr::index(var("user"), Expr::string("name")), &env), "Ann");
    assert_eq!(text(&Expr::index(Expr::string("h\u{e9}llo"), Expr::number(1)), &env), "\u{e9}");
    assert_eq!(text(&var("x"), &env), "2");
}

#[rstest]
fn locals_shadow_the_data_model(mut env: Environment) {
    env.set_variable("user", Value::from("local"));
    assert_eq!(text(&var("user"), &env), "local");
}

#[rstest]
fn missing_values_are_undefined(env: Environment) {
    let out_of_range = Expr::index(Expr::dot(var("user"), "tags"), Expr::number(5));
    assert!(evaluate(&out_of_range, &env).unwrap().is_none());
    assert!(evaluate(&Expr::dot(var("user"), "age"), &env).unwrap().is_none());

    let missing = var("missing").at(2, 5);
    let err = evaluate_to_value(&missing, &env).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidReference);
    assert_eq!(err.message, "the following has evaluated to undefined: missing");
    assert_eq!(err.location, Some(SourceLocation::new(2, 5)));
}

#[rstest]
fn dot_on_undefined_blames_the_target(env: Environment) {
    let expr = Expr::dot(var("missing").at(4, 2), "x").at(4, 9);
    let err = evaluate(&expr, &env).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidReference);
    assert_eq!(err.location, Some(SourceLocation::new(4, 2)));
}

#[rstest]
fn default_and_exists_are_lenient(env: Environment) {
    let deep = || Expr::dot(Expr::dot(var("missing"), "deep"), "er");
    let d = Expr::default_to(deep(), Some(Expr::string("n/a")));
    assert_eq!(text(&d, &env), "n/a");
    let bare = Expr::default_to(var("missing"), None);
    assert_eq!(text(&bare, &env), "");
    assert!(!evaluate_to_bool(&Expr::exists(deep()), &env).unwrap());
    assert!(evaluate_to_bool(&Expr::exists(Expr::dot(var("user"), "name")), &env).unwrap());

    let parens = Expr::default_to(Expr::parenthesized(deep()), Some(Expr::string("p")));
    assert_eq!(text(&parens, &env), "p");

    let present = Expr::default_to(Expr::dot(var("user"), "name"), Some(Expr::string("n/a")));
    assert_eq!(text(&present, &env), "Ann");
}

#[rstest]
fn arithmetic_and_negation(env: Environment) {
    let times = Expr::arithmetic(var("x"), ArithmeticOp::Multiply, Expr::number(3));
    assert_eq!(text(&times, &env), "6");
    let rem = Expr::arithmetic(Expr::number(7), ArithmeticOp::Modulus, var("x"));
    assert_eq!(text(&rem, &env), "1");
    assert_eq!(text(&Expr::negate(var("x")), &env), "-2");

    let sum = Expr::arithmetic(Expr::number_text("1.5"), ArithmeticOp::Add, Expr::number_text("1"));
    assert_eq!(text(&sum, &env), "2.5");
}

#[rstest]
fn division_by_zero_is_located(env: Environment) {
    let expr = Expr::arithmetic(Expr::number(1), ArithmeticOp::Divide, Expr::number(0)).at(2, 1);
    let err = evaluate(&expr, &env).unwrap_err();
    assert_eq!(err.code(), ErrorCode::ArithmeticFailure);
    assert_eq!(err.location, Some(SourceLocation::new(2, 1)));
}

#[rstest]
fn plus_concatenates_strings_sequences_and_hashes(env: Environment) {
    let s = Expr::arithmetic(Expr::string("a"), ArithmeticOp::Add, Expr::number(1000));
    assert_eq!(text(&s, &env), "a1,000");

    let seq = Expr::arithmetic(
        Expr::sequence(vec![Expr::number(1)]),
        ArithmeticOp::Add,
        Expr::dot(var("user"), "tags"),
    );
    let joined = evaluate_to_value(&seq, &env).unwrap();
    assert_eq!(joined.as_sequence().unwrap().len(), 3);

    let merged = Expr::arithmetic(
        Expr::hash(vec![(Expr::string("a"), Expr::number(1))]),
        ArithmeticOp::Add,
        Expr::hash(vec![
            (Expr::string("a"), Expr::number(2)),
            (Expr::string("b"), Expr::number(3)),
        ]),
    );
    let map = evaluate_to_value(&merged, &env).unwrap().as_hash().unwrap();
    let keys: Vec<&str> = map.keys().map(String::as_str).collect();
    assert_eq!(keys, ["a", "b"]);
    assert_eq!(map["a"].as_number().unwrap().to_i64_exact(), Some(2));

    let bad = Expr::arithmetic(Expr::boolean(true), ArithmeticOp::Add, Expr::number(1));
    assert_eq!(evaluate(&bad, &env).unwrap_err().code(), ErrorCode::CoercionFailure);
}

#[rstest]
fn logical_operators_short_circuit(env: Environment) {
    let broken = || Expr::dot(var("missing"), "x");
    let and = Expr::and(Expr::boolean(false), broken());
    assert!(!evaluate_to_bool(&and, &env).unwrap());
    let or = Expr::or(Expr::boolean(true), broken());
    assert!(evaluate_to_bool(&or, &env).unwrap());
    let and = Expr::and(Expr::boolean(true), broken());
    assert!(evaluate_to_bool(&and, &env).is_err());
}

#[rstest]
fn comparisons(env: Environment) {
    let gt = Expr::compare(var("x"), CompareOp::Gt, Expr::number(1));
    assert!(evaluate_to_bool(&gt, &env).unwrap());
    let eq = Expr::compare(Expr::dot(var("user"), "name"), CompareOp::Eq, Expr::string("Ann"));
    assert!(evaluate_to_bool(&eq, &env).unwrap());
    let mixed = Expr::compare(var("x"), CompareOp::Eq, Expr::string("2"));
    assert_eq!(evaluate(&mixed, &env).unwrap_err().code(), ErrorCode::ComparisonFailure);
}

#[rstest]
fn conditions_must_be_booleans(env: Environment) {
    let err = evaluate_to_bool(&Expr::number(1), &env).unwrap_err();
    assert_eq!(err.code(), ErrorCode::CoercionFailure);
}

#[rstest]
fn booleans_do_not_interpolate_without_a_format(env: Environment) {
    let err = evaluate_to_string(&Expr::boolean(true), &env).unwrap_err();
    assert_eq!(err.code(), ErrorCode::CoercionFailure);
    assert!(err.message.contains("`true`"), "{}", err.message);
}

#[rstest]
fn classic_compatible_mode() {
    let env = Environment::builder().with_classic_compatible(true).build();
    assert_eq!(text(&var("missing"), &env), "");
    let concat = Expr::arithmetic(var("missing"), ArithmeticOp::Add, Expr::string("x"));
    assert_eq!(text(&concat, &env), "x");
    assert!(!evaluate_to_bool(&Expr::string(""), &env).unwrap());
    assert!(evaluate_to_bool(&Expr::sequence(vec![Expr::number(1)]), &env).unwrap());
    assert_eq!(text(&Expr::boolean(true), &env), "true");
}

#[rstest]
fn builtin_calls_go_through_the_registry(env: Environment) {
    let upper = Expr::builtin(Expr::dot(var("user"), "name"), "upper_case", vec![]);
    assert_eq!(text(&upper, &env), "ANN");
    let joined = Expr::builtin(Expr::dot(var("user"), "tags"), "join", vec![Expr::string("+")]);
    assert_eq!(text(&joined, &env), "a+b");
}

#[rstest]
fn builtin_errors_carry_the_call_site(env: Environment) {
    let wrong = Expr::builtin(Expr::string("a"), "upper_case", vec![Expr::number(1)]).at(3, 7);
    let err = evaluate(&wrong, &env).unwrap_err();
    assert_eq!(err.code(), ErrorCode::ArgumentCount);
    assert_eq!(
        err.to_string(),
        "error: ?upper_case expects 0 argument(s) (argument-count) at line 3, column 7"
    );

    let unknown = Expr::builtin(Expr::string("a"), "no_such_builtin", vec![]).at(1, 1);
    assert_eq!(evaluate(&unknown, &env).unwrap_err().code(), ErrorCode::InvalidReference);
}

#[rstest]
fn index_errors(env: Environment) {
    let negative = Expr::index(Expr::dot(var("user"), "tags"), Expr::number(-1));
    assert_eq!(evaluate(&negative, &env).unwrap_err().code(), ErrorCode::InvalidArgument);
    let key_on_sequence = Expr::index(Expr::dot(var("user"), "tags"), Expr::string("a"));
    assert_eq!(evaluate(&key_on_sequence, &env).unwrap_err().code(), ErrorCode::CoercionFailure);
    let bad_key = Expr::hash(vec![(Expr::number(1), Expr::number(2))]);
    assert_eq!(evaluate(&bad_key, &env).unwrap_err().code(), ErrorCode::CoercionFailure);
}
