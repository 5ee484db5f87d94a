use pretty_assertions::assert_eq;
use rstest::rstest;
use stencil_eval::{BuiltinCall, DateKind, DateValue, Environment, Error, ErrorCode, Evaluated, Value};

fn call(env: &Environment, target: Value, name: &str, args: &[Value]) -> Result<Evaluated, Error> {
    env.builtins.call(&BuiltinCall::new(env, name), &target, args)
}

fn as_string(v: Evaluated) -> String {
    v.and_then(|v| v.as_string()).expect("string expected").to_string()
}

#[rstest]
#[case("html", "<b>\"x\" & 'y'</b>", "&lt;b&gt;&quot;x&quot; &amp; 'y'&lt;/b&gt;")]
#[case("xhtml", "it's", "it&#39;s")]
#[case("xml", "it's <ok>", "it&apos;s &lt;ok&gt;")]
#[case("rtf", "{\\b bold}", "\\{\\\\b bold\\}")]
#[case("js_string", "Say \"hi\"\n", "Say \\\"hi\\\"\\n")]
#[case("json_string", "it's </script>", "it's <\\/script>")]
fn escaping_builtins(#[case] name: &str, #[case] input: &str, #[case] expected: &str) {
    let env = Environment::default();
    assert_eq!(as_string(call(&env, Value::from(input), name, &[]).unwrap()), expected);
}

#[rstest]
fn case_and_trim() {
    let env = Environment::default();
    assert_eq!(as_string(call(&env, Value::from("straße"), "upper_case", &[]).unwrap()), "STRASSE");
    assert_eq!(as_string(call(&env, Value::from("ÁBC"), "lower_case", &[]).unwrap()), "ábc");
    assert_eq!(as_string(call(&env, Value::from("\t x y \n"), "trim", &[]).unwrap()), "x y");
}

#[rstest]
fn length_counts_characters() {
    let env = Environment::default();
    let n = call(&env, Value::from("héllo"), "length", &[]).unwrap().unwrap();
    assert_eq!(n.as_number().unwrap().to_i64_exact(), Some(5));
}

#[rstest]
#[case("contains", "ell", true)]
#[case("contains", "xyz", false)]
#[case("starts_with", "he", true)]
#[case("ends_with", "lo", true)]
#[case("ends_with", "he", false)]
fn substring_tests(#[case] name: &str, #[case] needle: &str, #[case] expected: bool) {
    let env = Environment::default();
    let out = call(&env, Value::from("hello"), name, &[Value::from(needle)]).unwrap();
    assert_eq!(out.and_then(|v| v.as_bool()), Some(expected));
}

#[rstest]
fn number_parses_with_the_arithmetic_engine() {
    let env = Environment::default();
    let n = call(&env, Value::from(" 3.25 "), "number", &[]).unwrap().unwrap();
    assert_eq!(n.as_number().unwrap().to_f64(), 3.25);
    let err = call(&env, Value::from("1,5"), "number", &[]).unwrap_err();
    assert_eq!(err.code(), ErrorCode::ArithmeticFailure);
}

#[rstest]
fn string_of_numbers() {
    let env = Environment::default();
    let n = Value::from(1234.5);
    assert_eq!(as_string(call(&env, n.clone(), "string", &[]).unwrap()), "1,234.5");
    assert_eq!(as_string(call(&env, n.clone(), "string", &[Value::from("c")]).unwrap()), "1234.5");
    let err = call(&env, n, "string", &[Value::from("#.##")]).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidArgument);
}

#[rstest]
#[case(Value::from(1234.5))]
#[case(Value::from(DateValue::from_millis(0, DateKind::Date).unwrap()))]
fn string_of_numbers_and_dates_takes_one_format(#[case] target: Value) {
    let env = Environment::default();
    let args = [Value::from("c"), Value::from("extra")];
    let err = call(&env, target, "string", &args).unwrap_err();
    assert_eq!(err.code(), ErrorCode::ArgumentCount);
}

#[rstest]
fn string_of_booleans() {
    let env = Environment::default();
    let yes_no = [Value::from("yes"), Value::from("no")];
    assert_eq!(as_string(call(&env, Value::from(true), "string", &yes_no).unwrap()), "yes");
    assert_eq!(as_string(call(&env, Value::from(false), "string", &[Value::from("y,n")]).unwrap()), "n");
    let err = call(&env, Value::from(true), "string", &[]).unwrap_err();
    assert_eq!(err.code(), ErrorCode::CoercionFailure);

    let env = Environment::builder().with_boolean_format("on", "off").build();
    assert_eq!(as_string(call(&env, Value::from(false), "string", &[]).unwrap()), "off");
}

#[rstest]
fn sequences_are_not_strings() {
    let env = Environment::default();
    let err = call(&env, Value::sequence(vec![]), "upper_case", &[]).unwrap_err();
    assert_eq!(err.code(), ErrorCode::CoercionFailure);
    assert!(err.message.contains("sequence"), "{}", err.message);
}
