use pretty_assertions::assert_eq;
use rstest::{fixture, rstest};
use stencil_eval::engine::temporal::parse_xs_datetime;
use stencil_eval::{
    BuiltinCall, CalendarPolicy, DateKind, DateValue, Environment, Error, ErrorCode, Evaluated,
    TimeZoneSpec, Value,
};

fn call(env: &Environment, target: &Value, name: &str, args: &[&str]) -> Result<Evaluated, Error> {
    let args: Vec<Value> = args.iter().map(|a| Value::from(*a)).collect();
    env.builtins.call(&BuiltinCall::new(env, name), target, &args)
}

fn text(v: Result<Evaluated, Error>) -> String {
    v.unwrap().and_then(|v| v.as_string()).expect("string expected").to_string()
}

fn date(v: Result<Evaluated, Error>) -> DateValue {
    v.unwrap().and_then(|v| v.as_date()).expect("date expected")
}

#[fixture]
fn summer() -> Value {
    let d = parse_xs_datetime("2020-07-01T10:00:00.123Z", &TimeZoneSpec::Utc, CalendarPolicy::default())
        .unwrap();
    Value::from(d)
}

#[rstest]
#[case("iso_utc", "2020-07-01T10:00:00Z")]
#[case("iso_utc_nz", "2020-07-01T10:00:00")]
#[case("iso_utc_ms", "2020-07-01T10:00:00.123Z")]
#[case("iso_utc_ms_nz", "2020-07-01T10:00:00.123")]
#[case("iso_utc_m", "2020-07-01T10:00Z")]
#[case("iso_utc_m_nz", "2020-07-01T10:00")]
#[case("iso_utc_h", "2020-07-01T10Z")]
#[case("iso_utc_h_nz", "2020-07-01T10")]
fn iso_utc_family(summer: Value, #[case] name: &str, #[case] expected: &str) {
    let env = Environment::default();
    assert_eq!(text(call(&env, &summer, name, &[])), expected);
}

#[rstest]
fn iso_with_zone_argument(summer: Value) {
    let env = Environment::default();
    assert_eq!(
        text(call(&env, &summer, "iso", &["Europe/Budapest"])),
        "2020-07-01T12:00:00+02:00"
    );
    assert_eq!(text(call(&env, &summer, "iso_m_nz", &["GMT-03:30"])), "2020-07-01T06:30");
    let err = call(&env, &summer, "iso", &["Mars/Olympus_Mons"]).unwrap_err();
    assert_eq!(err.code(), ErrorCode::UnrecognizedTimeZone);
}

#[rstest]
fn iso_local_uses_the_environment_zone(summer: Value) {
    let env = Environment::builder().with_offset_minutes(60).build();
    assert_eq!(text(call(&env, &summer, "iso_local", &[])), "2020-07-01T11:00:00+01:00");
}

#[rstest]
fn kind_decides_the_printed_parts(summer: Value) {
    let env = Environment::default();
    let d = Value::from(date(call(&env, &summer, "date", &[])));
    assert_eq!(text(call(&env, &d, "iso_utc", &[])), "2020-07-01");
    let t = Value::from(date(call(&env, &summer, "time", &[])));
    assert_eq!(text(call(&env, &t, "iso_utc_ms", &[])), "10:00:00.123Z");
}

#[rstest]
fn unknown_kind_must_be_resolved_first() {
    let env = Environment::default();
    let unknown = Value::from(DateValue::from_millis(0, DateKind::Unknown).unwrap());
    let err = call(&env, &unknown, "iso_utc", &[]).unwrap_err();
    assert_eq!(err.code(), ErrorCode::CoercionFailure);

    let fixed = Value::from(date(call(&env, &unknown, "date_if_unknown", &[])));
    assert_eq!(text(call(&env, &fixed, "iso_utc", &[])), "1970-01-01");

    // Known kinds are left alone.
    let kept = date(call(&env, &fixed, "datetime_if_unknown", &[]));
    assert_eq!(kept.kind, DateKind::Date);
}

#[rstest]
fn converting_a_date_takes_no_format(summer: Value) {
    let env = Environment::default();
    let err = call(&env, &summer, "date", &["iso"]).unwrap_err();
    assert_eq!(err.code(), ErrorCode::ArgumentCount);
}

#[rstest]
fn xs_midnight_end_is_the_next_day() {
    let env = Environment::default();
    let a = date(call(&env, &Value::from("2014-01-31T24:00:00"), "datetime", &["xs"]));
    let b = date(call(&env, &Value::from("2014-02-01T00:00:00"), "datetime", &["xs"]));
    assert_eq!(a.timestamp_millis(), b.timestamp_millis());
    assert_eq!(a.kind, DateKind::DateTime);
}

#[rstest]
fn strings_parse_with_the_environment_setting() {
    let env = Environment::default();
    let d = date(call(&env, &Value::from("2020-07-01T10:00:00Z"), "datetime", &[]));
    assert_eq!(d.timestamp_millis(), 1_593_597_600_000);
    let err = call(&env, &Value::from("01.07.2020"), "date", &[]).unwrap_err();
    assert_eq!(err.code(), ErrorCode::ParseFailure);
}

#[rstest]
fn strftime_patterns_parse_in_the_environment_zone() {
    let env = Environment::default();
    let d = Value::from(date(call(&env, &Value::from("31/12/2020"), "date", &["%d/%m/%Y"])));
    assert_eq!(text(call(&env, &d, "iso_utc", &[])), "2020-12-31");

    let mut env = Environment::default();
    env.set_time_zone("Europe/Budapest").unwrap();
    let d = Value::from(date(call(&env, &Value::from("2020-07-01 12:00"), "datetime", &["%Y-%m-%d %H:%M"])));
    assert_eq!(text(call(&env, &d, "iso_utc", &[])), "2020-07-01T10:00:00Z");

    let err = call(&env, &Value::from("2020/07/01"), "date", &["%d/%m/%Y"]).unwrap_err();
    assert_eq!(err.code(), ErrorCode::ParseFailure);
}

#[rstest]
fn string_builtin_formats_dates(summer: Value) {
    let env = Environment::default();
    assert_eq!(text(call(&env, &summer, "string", &["xs"])), "2020-07-01T10:00:00.123Z");
    assert_eq!(text(call(&env, &summer, "string", &["iso m"])), "2020-07-01T10:00Z");
    assert_eq!(text(call(&env, &summer, "string", &["%H.%M"])), "10.00");
    let err = call(&env, &summer, "string", &["xs h"]).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidArgument);
}

#[rstest]
fn non_dates_are_rejected(#[values("iso_utc", "date_if_unknown")] name: &str) {
    let env = Environment::default();
    let err = call(&env, &Value::from(5), name, &[]).unwrap_err();
    assert_eq!(err.code(), ErrorCode::CoercionFailure);
}
