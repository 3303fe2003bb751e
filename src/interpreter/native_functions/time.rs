// File: src/interpreter/native_functions/time.rs
//
// Time-related native functions. Timestamps are Unix milliseconds.

use super::{expect_arity, number_arg, string_arg, Handled};
use crate::errors::{ErrorKind, Panic};
use crate::interpreter::{AsyncRuntime, Interpreter, Object};
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use std::time::Duration;

pub const FUNCTIONS: &[&str] = &["now", "format", "parse", "sleep"];

pub fn handle(interp: &Interpreter, name: &str, args: &[Object]) -> Handled {
    let result = match name {
        "now" => expect_arity("time.now", args, 0).map(|_| Object::Number(Utc::now().timestamp_millis() as f64)),
        "format" => format(args),
        "parse" => parse(args),
        "sleep" => sleep(interp, args),
        _ => return None,
    };
    Some(result)
}

/// RFC 3339 in UTC, whole seconds
fn format(args: &[Object]) -> Result<Object, Panic> {
    expect_arity("time.format", args, 1)?;
    let millis = number_arg("time.format", args, 0)?;
    let Some(time) = DateTime::<Utc>::from_timestamp_millis(millis as i64) else {
        return Err(Panic::argument("time.format() argument is out of range"));
    };
    Ok(Object::from(time.to_rfc3339_opts(SecondsFormat::Secs, true)))
}

fn parse(args: &[Object]) -> Result<Object, Panic> {
    expect_arity("time.parse", args, 1)?;
    let text = string_arg("time.parse", args, 0)?;
    match parse_timestamp(text) {
        Some(time) => Ok(Object::Number(unix_millis(&time))),
        None => Err(Panic::argument(format!("time.parse() could not parse string: {}", text))),
    }
}

/// Accepted layouts, tried in order: RFC 3339 (with or without fraction),
/// a bare local date-time, a bare date. Bare forms are taken as UTC.
fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(time) = DateTime::parse_from_rfc3339(text) {
        return Some(time.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Milliseconds keeping the sub-millisecond fraction
fn unix_millis(time: &DateTime<Utc>) -> f64 {
    time.timestamp() as f64 * 1000.0 + time.timestamp_subsec_nanos() as f64 / 1e6
}

/// Block for the given milliseconds, or until the run is cancelled.
///
/// Fails when the host drives the interpreter from inside a tokio runtime,
/// since the wait cannot block there.
fn sleep(interp: &Interpreter, args: &[Object]) -> Result<Object, Panic> {
    expect_arity("time.sleep", args, 1)?;
    let millis = number_arg("time.sleep", args, 0)?;
    if millis < 0.0 || millis.is_nan() {
        return Err(Panic::argument("time.sleep() argument must be non-negative"));
    }
    if AsyncRuntime::in_runtime_context() {
        return Err(Panic::new(ErrorKind::RuntimeError, "time.sleep() cannot block inside an async runtime"));
    }
    let duration = Duration::try_from_secs_f64(millis / 1000.0).unwrap_or(Duration::MAX);
    if AsyncRuntime::sleep_or_cancel(duration, interp.cancellation_token()) {
        Ok(Object::Nil)
    } else {
        Err(Panic::cancelled())
    }
}
