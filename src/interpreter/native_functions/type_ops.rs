// File: src/interpreter/native_functions/type_ops.rs
//
// Global builtins: type inspection, conversion, length, ranges, cloning and
// nested evaluation (`eval`, `refl`).
//
// Misuse here is soft: bad arguments produce error values rather than
// panics, so scripts can probe with `errors.is`.

use super::{register_builtins, Handled};
use crate::interpreter::{Environment, Interpreter, Object, Options};

pub const FUNCTIONS: &[&str] = &["type", "str", "number", "len", "range", "clone", "eval", "refl"];

pub fn handle(interp: &Interpreter, name: &str, args: &[Object]) -> Handled {
    let result = match name {
        "type" => match args {
            [value] => Object::from(value.type_name()),
            _ => Object::error("type() expects exactly 1 argument"),
        },

        "str" => match args {
            [value] => Object::from(value.to_string()),
            _ => Object::error("str() expects exactly 1 argument"),
        },

        "number" => match args {
            [Object::Number(n)] => Object::Number(*n),
            // Unparseable strings and other types convert to nil
            [Object::Str(s)] => s.parse::<f64>().map(Object::Number).unwrap_or(Object::Nil),
            [_] => Object::Nil,
            _ => Object::error("number() expects exactly 1 argument"),
        },

        "len" => match args {
            [value] => match value.length() {
                Some(n) => Object::Number(n as f64),
                None => Object::error("len() can only be called on indexable objects"),
            },
            _ => Object::error("len() expects exactly 1 argument"),
        },

        "range" => range(args),

        "clone" => match args {
            [value] => value.clone_value(),
            _ => Object::error("clone() expects exactly 1 argument"),
        },

        "eval" => eval_isolated(interp, args),

        "refl" => eval_shared(interp, args),

        _ => return None,
    };
    Some(Ok(result))
}

/// `range(start, end[, step])`: a lazy iterator of `(index, value)` pairs
fn range(args: &[Object]) -> Object {
    if args.len() < 2 || args.len() > 3 {
        return Object::error("range() expects 2 or 3 arguments");
    }
    let (Some(start), Some(end)) = (args[0].as_number(), args[1].as_number()) else {
        return Object::error("range() can only be called on numbers");
    };
    let step = match args.get(2) {
        None => 1.0,
        Some(Object::Number(step)) if *step == 0.0 => return Object::error("step is zero"),
        Some(Object::Number(step)) => *step,
        Some(_) => return Object::error("range() can only be called on numbers"),
    };

    Object::iterator(move |sink| {
        let mut index = 0.0;
        let mut current = start;
        while (step > 0.0 && current < end) || (step < 0.0 && current > end) {
            if !sink(Object::Number(index), Object::Number(current))? {
                break;
            }
            index += 1.0;
            current += step;
        }
        Ok(())
    })
}

fn parse_code(interp: &Interpreter, name: &str, args: &[Object]) -> Result<crate::ast::Program, Object> {
    let Some(code) = args.first() else {
        return Err(Object::error(format!("{}() expects at least 1 argument", name)));
    };
    let Some(parser) = interp.options().parser() else {
        return Err(Object::error(format!("{}() requires a source parser", name)));
    };
    parser.parse(&code.to_string()).map_err(Object::error)
}

/// `eval(code)`: run in a fresh interpreter with its own prelude and no event loop
fn eval_isolated(interp: &Interpreter, args: &[Object]) -> Object {
    let program = match parse_code(interp, "eval", args) {
        Ok(program) => program,
        Err(err) => return err,
    };

    let parent = interp.options();
    let mut options = Options::new().disable_events().with_cancellation(interp.cancellation_token().clone());
    if let Some(parser) = parent.parser() {
        options = options.with_parser(parser.clone());
    }
    if let Some(output) = parent.output() {
        options = options.with_output(output.clone());
    }
    if !parent.eval_enabled() {
        options = options.disable_eval();
    }

    match Interpreter::new(options).run(&program, &Environment::new()) {
        Ok(value) => value,
        Err(panic) => Object::error(panic.to_string()),
    }
}

/// `refl(code)`: run in a fresh root scope on this interpreter and its event loop
fn eval_shared(interp: &Interpreter, args: &[Object]) -> Object {
    let program = match parse_code(interp, "refl", args) {
        Ok(program) => program,
        Err(err) => return err,
    };

    let env = Environment::new();
    register_builtins(interp, &env);
    match interp.eval_program(&program, &env) {
        Ok(value) => value,
        Err(panic) => Object::error(panic.to_string()),
    }
}
