use indexmap::IndexMap;
use pretty_assertions::assert_eq;
use rstest::rstest;
use stencil_eval::{BuiltinCall, DateKind, DateValue, Environment, Error, ErrorCode, Evaluated, Value};

fn call(env: &Environment, target: &Value, name: &str, args: &[Value]) -> Result<Evaluated, Error> {
    env.builtins.call(&BuiltinCall::new(env, name), target, args)
}

fn seq<T: Into<Value> + Clone>(items: &[T]) -> Value {
    Value::sequence(items.iter().cloned().map(Into::into).collect())
}

fn hash(entries: &[(&str, Value)]) -> Value {
    let map: IndexMap<String, Value> = entries
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.clone()))
        .collect();
    Value::hash(map)
}

/// Renders a sequence (recursively) for compact assertions.
fn render(v: &Value) -> String {
    if let Some(items) = v.as_sequence() {
        let parts: Vec<String> = items.iter().map(render).collect();
        return format!("[{}]", parts.join(","));
    }
    if let Some(n) = v.as_number() {
        return n.to_f64().to_string();
    }
    if let Some(s) = v.as_string() {
        return s.to_string();
    }
    if let Some(h) = v.as_hash() {
        return h.get("name").map_or_else(|| "{}".to_string(), render);
    }
    format!("{v:?}")
}

#[rstest]
fn size_first_last_reverse() {
    let env = Environment::default();
    let s = seq(&[1, 2, 3]);
    let size = call(&env, &s, "size", &[]).unwrap().unwrap();
    assert_eq!(size.as_number().unwrap().to_i64_exact(), Some(3));
    assert_eq!(render(&call(&env, &s, "first", &[]).unwrap().unwrap()), "1");
    assert_eq!(render(&call(&env, &s, "last", &[]).unwrap().unwrap()), "3");
    assert_eq!(render(&call(&env, &s, "reverse", &[]).unwrap().unwrap()), "[3,2,1]");

    let h = hash(&[("a", Value::from(1)), ("b", Value::from(2))]);
    let size = call(&env, &h, "size", &[]).unwrap().unwrap();
    assert_eq!(size.as_number().unwrap().to_i64_exact(), Some(2));
}

#[rstest]
fn first_and_last_of_empty_sequence_are_undefined() {
    let env = Environment::default();
    let empty = Value::sequence(vec![]);
    assert!(call(&env, &empty, "first", &[]).unwrap().is_none());
    assert!(call(&env, &empty, "last", &[]).unwrap().is_none());
}

#[rstest]
fn first_works_on_collections_but_last_does_not() {
    let env = Environment::default();
    let c = Value::collection(vec![Value::from("a"), Value::from("b")]);
    assert_eq!(render(&call(&env, &c, "first", &[]).unwrap().unwrap()), "a");
    let err = call(&env, &c, "last", &[]).unwrap_err();
    assert_eq!(err.code(), ErrorCode::CoercionFailure);
}

#[rstest]
#[case(&[Value::from(", ")], "a, b, c")]
#[case(&[Value::from(", "), Value::from("none")], "a, b, c")]
#[case(&[Value::from(", "), Value::from("none"), Value::from(".")], "a, b, c.")]
fn join(#[case] args: &[Value], #[case] expected: &str) {
    let env = Environment::default();
    let s = seq(&["a", "b", "c"]);
    let out = call(&env, &s, "join", args).unwrap().unwrap();
    assert_eq!(out.as_string().unwrap().as_ref(), expected);
}

#[rstest]
fn join_of_empty_sequence_uses_the_empty_text() {
    let env = Environment::default();
    let empty = Value::sequence(vec![]);
    let out = call(&env, &empty, "join", &[Value::from(", "), Value::from("-")]).unwrap().unwrap();
    assert_eq!(out.as_string().unwrap().as_ref(), "-");
    let out = call(&env, &empty, "join", &[Value::from(", ")]).unwrap().unwrap();
    assert_eq!(out.as_string().unwrap().as_ref(), "");
}

#[rstest]
fn join_formats_numbers_and_rejects_booleans() {
    let env = Environment::default();
    let s = Value::sequence(vec![Value::from(1000), Value::from("x")]);
    let out = call(&env, &s, "join", &[Value::from("|")]).unwrap().unwrap();
    assert_eq!(out.as_string().unwrap().as_ref(), "1,000|x");

    let s = Value::sequence(vec![Value::from("x"), Value::from(true)]);
    let err = call(&env, &s, "join", &[Value::from("|")]).unwrap_err();
    assert_eq!(err.code(), ErrorCode::CoercionFailure);
    assert!(err.message.contains("index 1"), "{}", err.message);
}

#[rstest]
fn chunk() {
    let env = Environment::default();
    let s = seq(&[1, 2, 3, 4, 5, 6, 7]);
    let out = call(&env, &s, "chunk", &[Value::from(3)]).unwrap().unwrap();
    assert_eq!(render(&out), "[[1,2,3],[4,5,6],[7]]");
    let out = call(&env, &s, "chunk", &[Value::from(3), Value::from(0)]).unwrap().unwrap();
    assert_eq!(render(&out), "[[1,2,3],[4,5,6],[7,0,0]]");
    let err = call(&env, &s, "chunk", &[Value::from(0)]).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidArgument);
}

#[rstest]
fn sort_strings_with_the_locale_collation() {
    let env = Environment::default();
    let s = seq(&["b", "A", "a", "C"]);
    let out = call(&env, &s, "sort", &[]).unwrap().unwrap();
    assert_eq!(render(&out), "[a,A,b,C]");
}

#[rstest]
fn sort_mixed_number_representations() {
    let env = Environment::default();
    let s = Value::sequence(vec![Value::from(2.5), Value::from(1), Value::from(10_i64), Value::from(-3)]);
    let out = call(&env, &s, "sort", &[]).unwrap().unwrap();
    assert_eq!(render(&out), "[-3,1,2.5,10]");
}

#[rstest]
fn sort_rejects_mixed_key_types() {
    let env = Environment::default();
    let s = Value::sequence(vec![Value::from(3), Value::from("x"), Value::from(1)]);
    let err = call(&env, &s, "sort", &[]).unwrap_err();
    assert_eq!(err.code(), ErrorCode::CoercionFailure);
    assert!(err.message.starts_with("?sort failed at sequence index 1"), "{}", err.message);
    assert!(err.message.contains("numbers"), "{}", err.message);
}

#[rstest]
fn sort_rejects_nan_keys_in_long_sequences() {
    let env = Environment::default();
    let mut items: Vec<Value> = (0..40).rev().map(|i| Value::from(f64::from(i))).collect();
    items[25] = Value::from(f64::NAN);
    let err = call(&env, &Value::sequence(items), "sort", &[]).unwrap_err();
    assert_eq!(err.code(), ErrorCode::CoercionFailure);
    assert!(err.message.starts_with("?sort failed at sequence index 25"), "{}", err.message);
}

#[rstest]
fn sort_by_rejects_nan_keys() {
    let env = Environment::default();
    let items: Vec<Value> = (0..30)
        .map(|i| {
            let score = if i == 7 { f64::NAN } else { f64::from(30 - i) };
            hash(&[("score", Value::from(score))])
        })
        .collect();
    let err = call(&env, &Value::sequence(items), "sort_by", &[Value::from("score")]).unwrap_err();
    assert!(err.message.starts_with("?sort_by failed at sequence index 7"), "{}", err.message);
}

#[rstest]
fn sort_rejects_dates_of_unknown_kind() {
    let env = Environment::default();
    let d = DateValue::from_millis(0, DateKind::Unknown).unwrap();
    let s = Value::sequence(vec![Value::from(d)]);
    let err = call(&env, &s, "sort", &[]).unwrap_err();
    assert!(err.message.contains("unknown"), "{}", err.message);
}

#[rstest]
fn sort_by_single_key_and_key_path() {
    let env = Environment::default();
    let people = Value::sequence(vec![
        hash(&[("name", Value::from("Zoe")), ("age", Value::from(30)), ("home", hash(&[("city", Value::from("Bern"))]))]),
        hash(&[("name", Value::from("Adam")), ("age", Value::from(40)), ("home", hash(&[("city", Value::from("Aarau"))]))]),
        hash(&[("name", Value::from("Max")), ("age", Value::from(20)), ("home", hash(&[("city", Value::from("Chur"))]))]),
    ]);
    let by_name = call(&env, &people, "sort_by", &[Value::from("name")]).unwrap().unwrap();
    assert_eq!(render(&by_name), "[Adam,Max,Zoe]");
    let by_age = call(&env, &people, "sort_by", &[Value::from("age")]).unwrap().unwrap();
    assert_eq!(render(&by_age), "[Max,Zoe,Adam]");
    let by_city = call(&env, &people, "sort_by", &[seq(&["home", "city"])]).unwrap().unwrap();
    assert_eq!(render(&by_city), "[Adam,Zoe,Max]");
}

#[rstest]
fn sort_by_errors_name_the_offending_item() {
    let env = Environment::default();
    let items = Value::sequence(vec![hash(&[("name", Value::from("a"))]), Value::from("b")]);
    let err = call(&env, &items, "sort_by", &[Value::from("name")]).unwrap_err();
    assert!(err.message.contains("index 1"), "{}", err.message);
    assert!(err.message.contains("must be hashes"), "{}", err.message);

    let items = Value::sequence(vec![hash(&[("other", Value::from("a"))])]);
    let err = call(&env, &items, "sort_by", &[Value::from("name")]).unwrap_err();
    assert!(err.message.contains("The \"name\" subvariable was not found."), "{}", err.message);

    let items = Value::sequence(vec![hash(&[("home", Value::from("flat"))])]);
    let err = call(&env, &items, "sort_by", &[seq(&["home", "city"])]).unwrap_err();
    assert!(err.message.contains("The \"home\" subvariable is not a hash"), "{}", err.message);
}

#[rstest]
#[case(Value::from(2), true, 1, 3)]
#[case(Value::from("2"), false, -1, -1)]
#[case(Value::from(9), false, -1, -1)]
fn sequence_search(#[case] needle: Value, #[case] contains: bool, #[case] first: i64, #[case] last: i64) {
    let env = Environment::default();
    let s = seq(&[1, 2, 3, 2]);
    let c = call(&env, &s, "seq_contains", &[needle.clone()]).unwrap().unwrap();
    assert_eq!(c.as_bool(), Some(contains));
    let i = call(&env, &s, "seq_index_of", &[needle.clone()]).unwrap().unwrap();
    assert_eq!(i.as_number().unwrap().to_i64_exact(), Some(first));
    let j = call(&env, &s, "seq_last_index_of", &[needle]).unwrap().unwrap();
    assert_eq!(j.as_number().unwrap().to_i64_exact(), Some(last));
}

#[rstest]
fn sequence_search_with_start_index() {
    let env = Environment::default();
    let s = seq(&["a", "b", "a"]);
    let i = call(&env, &s, "seq_index_of", &[Value::from("a"), Value::from(1)]).unwrap().unwrap();
    assert_eq!(i.as_number().unwrap().to_i64_exact(), Some(2));
    let j = call(&env, &s, "seq_last_index_of", &[Value::from("a"), Value::from(1)]).unwrap().unwrap();
    assert_eq!(j.as_number().unwrap().to_i64_exact(), Some(0));
}
