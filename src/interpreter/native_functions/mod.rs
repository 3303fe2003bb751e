// File: src/interpreter/native_functions/mod.rs
//
// Module organization for native (built-in) function implementations.
// Each category module exposes the names it serves and a `handle` function
// that dispatches on the bare name; this module registers them into the
// root environment and routes calls by qualified name (`math.abs`, `len`).

pub mod errors;
pub mod events;
pub mod io;
pub mod math;
pub mod strings;
pub mod time;
pub mod type_ops;

use super::{Environment, Interpreter, Object, Table};
use crate::errors::Panic;

/// Result of a category dispatcher: `None` when the name is not served there
pub(crate) type Handled = Option<Result<Object, Panic>>;

/// Main dispatcher that routes native function calls to appropriate category modules
pub fn call_native_function(interp: &Interpreter, name: &str, args: &[Object]) -> Result<Object, Panic> {
    let (namespace, function) = name.split_once('.').unwrap_or(("", name));
    let handled = match namespace {
        "" => type_ops::handle(interp, function, args),
        "errors" => errors::handle(function, args),
        "math" => math::handle(function, args),
        "strings" => strings::handle(function, args),
        "io" => io::handle(interp, function, args),
        "time" => time::handle(interp, function, args),
        "events" => events::handle(interp, function, args),
        _ => None,
    };
    handled.unwrap_or_else(|| Err(Panic::runtime(format!("Unknown native function: {}", name))))
}

/// Define the prelude in `env`: global functions, `$` and the namespaces.
///
/// `eval` and `refl` are left out when disabled, as is `events` when the
/// interpreter has no event loop.
pub fn register_builtins(interp: &Interpreter, env: &Environment) {
    let options = interp.options();
    for name in type_ops::FUNCTIONS {
        let enabled = match *name {
            "eval" => options.eval_enabled(),
            "refl" => options.refl_enabled(),
            _ => true,
        };
        if enabled {
            env.define(*name, bound(name.to_string()));
        }
    }
    env.define("$", Object::Globals(env.global().downgrade()));

    env.define("errors", namespace("errors", errors::FUNCTIONS));
    env.define("strings", namespace("strings", strings::FUNCTIONS));
    env.define("io", namespace("io", io::FUNCTIONS));
    env.define("time", namespace("time", time::FUNCTIONS));

    let math = namespace("math", math::FUNCTIONS);
    if let Object::Table(table) = &math {
        for (name, value) in math::CONSTANTS {
            table.set_str(name, Object::Number(*value));
        }
    }
    env.define("math", math);

    if interp.event_loop().is_some() {
        env.define("events", namespace("events", events::FUNCTIONS));
    }
}

/// A native that routes back through `call_native_function`
fn bound(qualified: String) -> Object {
    Object::native(qualified.clone(), move |interp, args| call_native_function(interp, &qualified, &args))
}

fn namespace(prefix: &str, functions: &[&str]) -> Object {
    let table = Table::new();
    for name in functions {
        table.set_str(name, bound(format!("{}.{}", prefix, name)));
    }
    Object::Table(table)
}

/// "expects exactly N argument(s)" / "expects no arguments"
pub(crate) fn arity_message(name: &str, count: usize) -> String {
    match count {
        0 => format!("{}() expects no arguments", name),
        1 => format!("{}() expects exactly 1 argument", name),
        n => format!("{}() expects exactly {} arguments", name, n),
    }
}

pub(crate) fn expect_arity(name: &str, args: &[Object], count: usize) -> Result<(), Panic> {
    if args.len() != count {
        return Err(Panic::argument(arity_message(name, count)));
    }
    Ok(())
}

/// How an argument is referred to in messages: "argument" when it is the
/// only one, otherwise by ordinal
fn argument_label(index: usize, total: usize) -> &'static str {
    if total <= 1 {
        return "argument";
    }
    match index {
        0 => "first argument",
        1 => "second argument",
        2 => "third argument",
        3 => "fourth argument",
        _ => "argument",
    }
}

pub(crate) fn number_arg(name: &str, args: &[Object], index: usize) -> Result<f64, Panic> {
    match args.get(index) {
        Some(Object::Number(n)) => Ok(*n),
        _ => Err(Panic::argument(format!(
            "{}() {} must be a number",
            name,
            argument_label(index, args.len())
        ))),
    }
}

pub(crate) fn string_arg<'a>(name: &str, args: &'a [Object], index: usize) -> Result<&'a str, Panic> {
    match args.get(index) {
        Some(Object::Str(s)) => Ok(&**s),
        _ => Err(Panic::argument(format!(
            "{}() {} must be a string",
            name,
            argument_label(index, args.len())
        ))),
    }
}

pub(crate) fn function_arg(name: &str, args: &[Object], index: usize) -> Result<Object, Panic> {
    match args.get(index) {
        Some(f) if f.is_callable() => Ok(f.clone()),
        _ => Err(Panic::argument(format!(
            "{}() {} must be a function",
            name,
            argument_label(index, args.len())
        ))),
    }
}
