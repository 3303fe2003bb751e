// File: src/interpreter/native_functions/events.rs
//
// The `events` namespace: timers, named events, promises and loop locks on
// top of the interpreter's event loop. Only registered when the
// interpreter has one.
//
// Handles handed back to scripts (cancel, unregister, release) are plain
// native functions; calling them more than once is harmless.

use super::{function_arg, number_arg, string_arg, Handled};
use crate::errors::{ErrorKind, Panic};
use crate::event_loop::{EventCallback, EventLoop};
use crate::interpreter::{Interpreter, Object, Promise};
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::trace;

pub const FUNCTIONS: &[&str] = &["schedule", "after", "register", "fire", "promise", "lock"];

/// Delays are capped so `Instant` arithmetic cannot overflow
const MAX_DELAY: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

pub fn handle(interp: &Interpreter, name: &str, args: &[Object]) -> Handled {
    let result = match name {
        "schedule" => schedule(interp, args),
        "after" => after(interp, args),
        "register" => register(interp, args),
        "fire" => fire(interp, args),
        "promise" => promise(interp, args),
        "lock" => lock(interp),
        _ => return None,
    };
    Some(result)
}

fn event_loop(interp: &Interpreter) -> Result<&EventLoop, Panic> {
    interp.event_loop().ok_or_else(|| Panic::new(ErrorKind::EventLoop, "events are disabled"))
}

fn at_least(name: &str, args: &[Object], count: usize) -> Result<(), Panic> {
    if args.len() < count {
        return Err(Panic::argument(format!("{}() expects at least {} arguments", name, count)));
    }
    Ok(())
}

fn millis_to_duration(millis: f64) -> Duration {
    if millis.is_nan() || millis <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(millis / 1000.0).unwrap_or(MAX_DELAY).min(MAX_DELAY)
}

/// Queue `callback(args...)` to run at `at`; returns a cancel function
fn schedule_call(interp: &Interpreter, callback: Object, args: Vec<Object>, at: Instant) -> Result<Object, Panic> {
    let runner = interp.clone();
    let handle = event_loop(interp)?.schedule(
        Box::new(move || -> Result<(), Panic> {
            match runner.call_function(&callback, args) {
                Ok(_) => Ok(()),
                Err(err) => Err(Panic { message: format!("schedule call failed: {}", err.message), ..err }),
            }
        }),
        at,
    );
    Ok(Object::native("events.cancel", move |_, _| {
        handle.cancel();
        Ok(Object::Nil)
    }))
}

/// `schedule(fn, atMillis, ...args)`: absolute Unix-millisecond fire time
fn schedule(interp: &Interpreter, args: &[Object]) -> Result<Object, Panic> {
    at_least("events.schedule", args, 2)?;
    let callback = function_arg("events.schedule", args, 0)?;
    let at_millis = number_arg("events.schedule", args, 1)?;
    let delay = millis_to_duration(at_millis - Utc::now().timestamp_millis() as f64);
    schedule_call(interp, callback, args[2..].to_vec(), Instant::now() + delay)
}

/// `after(fn, delayMillis, ...args)`
fn after(interp: &Interpreter, args: &[Object]) -> Result<Object, Panic> {
    at_least("events.after", args, 2)?;
    let callback = function_arg("events.after", args, 0)?;
    let delay = millis_to_duration(number_arg("events.after", args, 1)?);
    schedule_call(interp, callback, args[2..].to_vec(), Instant::now() + delay)
}

/// `register(event, fn)`: the handler receives `(event, ...payload)`
fn register(interp: &Interpreter, args: &[Object]) -> Result<Object, Panic> {
    at_least("events.register", args, 2)?;
    let event = string_arg("events.register", args, 0)?;
    let callback = function_arg("events.register", args, 1)?;

    let runner = interp.clone();
    let handler: EventCallback = Arc::new(move |event: &str, payload: &[Object]| -> Result<(), Panic> {
        let mut call_args = Vec::with_capacity(payload.len() + 1);
        call_args.push(Object::from(event));
        call_args.extend_from_slice(payload);
        match runner.call_function(&callback, call_args) {
            Ok(_) => Ok(()),
            Err(err) => Err(Panic { message: format!("callback failed: {}", err.message), ..err }),
        }
    });
    let registration = event_loop(interp)?.register_callback(event, handler);
    trace!(event = %event, "registered event handler");

    Ok(Object::native("events.unregister", move |_, _| {
        registration.unregister();
        Ok(Object::Nil)
    }))
}

/// `fire(event, ...payload)`: delivery happens later, from the loop
fn fire(interp: &Interpreter, args: &[Object]) -> Result<Object, Panic> {
    at_least("events.fire", args, 1)?;
    let event = string_arg("events.fire", args, 0)?;
    event_loop(interp)?.fire(event, args[1..].to_vec());
    Ok(Object::Nil)
}

/// `promise(executor)`: runs `executor(resolve, reject)` right away.
///
/// A panic inside the executor rejects the promise with its message.
fn promise(interp: &Interpreter, args: &[Object]) -> Result<Object, Panic> {
    if args.len() != 1 {
        return Err(Panic::argument("events.promise() expects exactly 1 argument"));
    }
    let executor = function_arg("events.promise", args, 0)?;
    let promise = Promise::new();

    let target = promise.clone();
    let resolve = Object::native("resolve", move |interp, args| {
        let value = args.into_iter().next().unwrap_or(Object::Nil);
        target.resolve(interp, value)?;
        Ok(Object::Nil)
    });
    let target = promise.clone();
    let reject = Object::native("reject", move |interp, args| {
        let reason = args.into_iter().next().unwrap_or(Object::Nil);
        target.reject(interp, reason)?;
        Ok(Object::Nil)
    });

    if let Err(err) = interp.call_function(&executor, vec![resolve, reject]) {
        if err.kind == ErrorKind::Cancelled {
            return Err(err);
        }
        promise.reject(interp, Object::error(err.message))?;
    }
    Ok(Object::Promise(promise))
}

/// `lock()`: keep the loop alive until the returned release function runs
fn lock(interp: &Interpreter) -> Result<Object, Panic> {
    let registration = event_loop(interp)?.register_lock();
    Ok(Object::native("events.release", move |_, _| {
        registration.unregister();
        Ok(Object::Nil)
    }))
}
