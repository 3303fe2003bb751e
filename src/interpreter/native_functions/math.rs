// File: src/interpreter/native_functions/math.rs
//
// Math-related native functions

use super::{expect_arity, number_arg, Handled};
use crate::errors::Panic;
use crate::interpreter::Object;
use rand::Rng;

pub const FUNCTIONS: &[&str] = &["abs", "floor", "ceil", "round", "sqrt", "pow", "max", "min", "random"];

pub const CONSTANTS: &[(&str, f64)] = &[
    ("PI", std::f64::consts::PI),
    ("E", std::f64::consts::E),
    ("INF", f64::INFINITY),
    ("NEG_INF", f64::NEG_INFINITY),
    ("NAN", f64::NAN),
];

/// Handle math-related function calls
/// Returns Some(result) if the function was handled, None if not recognized
pub fn handle(name: &str, args: &[Object]) -> Handled {
    let result = match name {
        // Single argument
        "abs" | "floor" | "ceil" | "round" | "sqrt" => unary(name, args),

        "pow" => expect_arity("math.pow", args, 2).and_then(|_| {
            let (Some(base), Some(exp)) = (args[0].as_number(), args[1].as_number()) else {
                return Err(Panic::argument("math.pow() arguments must be numbers"));
            };
            Ok(Object::Number(base.powf(exp)))
        }),

        "max" | "min" => fold(name, args),

        "random" => expect_arity("math.random", args, 0).map(|_| Object::Number(rand::thread_rng().gen::<f64>())),

        _ => return None,
    };
    Some(result)
}

fn unary(name: &str, args: &[Object]) -> Result<Object, Panic> {
    let qualified = format!("math.{}", name);
    expect_arity(&qualified, args, 1)?;
    let x = number_arg(&qualified, args, 0)?;
    let value = match name {
        "abs" => x.abs(),
        "floor" => x.floor(),
        "ceil" => x.ceil(),
        // Halves round away from zero
        "round" => x.round(),
        "sqrt" => {
            if x < 0.0 {
                return Err(Panic::argument("math.sqrt() argument must be non-negative"));
            }
            x.sqrt()
        }
        _ => return Err(Panic::runtime(format!("Unknown native function: {}", qualified))),
    };
    Ok(Object::Number(value))
}

/// `max`/`min` over one or more numbers
fn fold(name: &str, args: &[Object]) -> Result<Object, Panic> {
    if args.is_empty() {
        return Err(Panic::argument(format!("math.{}() expects at least 1 argument", name)));
    }
    let (mut acc, pick): (f64, fn(f64, f64) -> f64) = match name {
        "max" => (f64::NEG_INFINITY, f64::max),
        _ => (f64::INFINITY, f64::min),
    };
    for arg in args {
        let Some(n) = arg.as_number() else {
            return Err(Panic::argument(format!("math.{}() arguments must be numbers", name)));
        };
        acc = pick(acc, n);
    }
    Ok(Object::Number(acc))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: &[f64]) -> Result<Object, Panic> {
        let args: Vec<Object> = args.iter().map(|n| Object::Number(*n)).collect();
        handle(name, &args).unwrap()
    }

    #[test]
    fn test_rounding_family() {
        assert_eq!(call("abs", &[-3.5]).unwrap(), Object::Number(3.5));
        assert_eq!(call("floor", &[2.7]).unwrap(), Object::Number(2.0));
        assert_eq!(call("ceil", &[2.1]).unwrap(), Object::Number(3.0));
        assert_eq!(call("round", &[2.5]).unwrap(), Object::Number(3.0));
        assert_eq!(call("round", &[-2.5]).unwrap(), Object::Number(-3.0));
    }

    #[test]
    fn test_sqrt_rejects_negative() {
        assert_eq!(call("sqrt", &[16.0]).unwrap(), Object::Number(4.0));
        assert_eq!(call("sqrt", &[-1.0]).unwrap_err().message, "math.sqrt() argument must be non-negative");
    }

    #[test]
    fn test_pow_max_min() {
        assert_eq!(call("pow", &[2.0, 10.0]).unwrap(), Object::Number(1024.0));
        assert_eq!(call("max", &[1.0, 7.0, 3.0]).unwrap(), Object::Number(7.0));
        assert_eq!(call("min", &[1.0, -7.0, 3.0]).unwrap(), Object::Number(-7.0));
        assert_eq!(call("max", &[]).unwrap_err().message, "math.max() expects at least 1 argument");
    }

    #[test]
    fn test_argument_checks() {
        let err = handle("abs", &[Object::from("x")]).unwrap().unwrap_err();
        assert_eq!(err.message, "math.abs() argument must be a number");
        let err = call("abs", &[]).unwrap_err();
        assert_eq!(err.message, "math.abs() expects exactly 1 argument");
    }

    #[test]
    fn test_random_is_in_unit_interval() {
        for _ in 0..100 {
            let n = call("random", &[]).unwrap().as_number().unwrap();
            assert!((0.0..1.0).contains(&n));
        }
        assert_eq!(call("random", &[1.0]).unwrap_err().message, "math.random() expects no arguments");
    }
}
