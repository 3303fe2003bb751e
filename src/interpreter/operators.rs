// File: src/interpreter/operators.rs
//
// Operator dispatch for binary and unary expressions.
//
// Dispatch is driven by the left operand: numbers and strings implement the
// arithmetic and comparison operators, everything else rejects them with a
// message naming its own type. `&&` and `||` never reach this module since
// they short-circuit in the evaluator.

use super::value::Object;
use crate::ast::BinaryOp;
use crate::errors::{ErrorKind, Panic};
use std::cmp::Ordering;

/// Plural noun used in "<noun> do not support ..." messages
fn noun(value: &Object) -> &'static str {
    match value {
        Object::Nil => "nil",
        Object::Number(_) => "numbers",
        Object::Str(_) => "strings",
        Object::Table(_) | Object::Promise(_) | Object::Globals(_) => "objects",
        Object::Function(_) | Object::Native(_) => "functions",
        Object::Iterator(_) => "iterators",
        Object::Error(_) => "errors",
    }
}

fn unsupported(value: &Object, operation: &str) -> Panic {
    let verb = if matches!(value, Object::Nil) { "does" } else { "do" };
    Panic::type_error(format!("{} {} not support {}", noun(value), verb, operation))
}

fn operation_name(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "addition",
        BinaryOp::Sub => "subtraction",
        BinaryOp::Mul => "multiplication",
        BinaryOp::Div => "division",
        BinaryOp::Mod => "modulo",
        BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge => "comparison",
        BinaryOp::Eq | BinaryOp::NotEq => "equality",
        BinaryOp::And | BinaryOp::Or => "logical operators",
    }
}

/// Apply a binary operator to two evaluated operands
pub fn binary(op: BinaryOp, left: &Object, right: &Object) -> Result<Object, Panic> {
    match op {
        BinaryOp::Eq => return Ok(Object::boolean(left.equals(right))),
        BinaryOp::NotEq => return Ok(Object::boolean(!left.equals(right))),
        BinaryOp::And | BinaryOp::Or => {
            return Err(Panic::runtime(format!("unknown operator: {}", op)));
        }
        _ => {}
    }

    match left {
        Object::Number(n) => number_op(op, *n, right),
        Object::Str(s) => string_op(op, s, right),
        other => Err(unsupported(other, operation_name(op))),
    }
}

fn number_op(op: BinaryOp, n: f64, right: &Object) -> Result<Object, Panic> {
    match op {
        BinaryOp::Add => match right {
            Object::Number(m) => Ok(Object::Number(n + m)),
            Object::Str(s) => Ok(Object::from(format!("{}{}", Object::Number(n), s))),
            other => Err(Panic::type_error(format!("cannot add number to {}", other.type_name()))),
        },
        BinaryOp::Sub => match right {
            Object::Number(m) => Ok(Object::Number(n - m)),
            _ => Err(Panic::type_error("cannot subtract non-number from number")),
        },
        BinaryOp::Mul => match right {
            Object::Number(m) => Ok(Object::Number(n * m)),
            Object::Str(s) => repeat(s, n).map(Object::from),
            other => Err(Panic::type_error(format!("cannot multiply number by {}", other.type_name()))),
        },
        BinaryOp::Div => match right {
            Object::Number(m) if *m == 0.0 => Err(Panic::new(ErrorKind::DivisionByZero, "division by zero")),
            Object::Number(m) => Ok(Object::Number(n / m)),
            _ => Err(Panic::type_error("cannot divide number by non-number")),
        },
        BinaryOp::Mod => match right {
            Object::Number(m) if *m == 0.0 => Err(Panic::new(ErrorKind::DivisionByZero, "modulo by zero")),
            // Rust's `%` on floats is fmod: the sign follows the dividend.
            Object::Number(m) => Ok(Object::Number(n % m)),
            _ => Err(Panic::type_error("cannot modulo number by non-number")),
        },
        BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge => match right {
            Object::Number(m) => Ok(Object::boolean(compare(op, n.partial_cmp(m)))),
            _ => Err(Panic::type_error("cannot compare number with non-number")),
        },
        _ => Err(Panic::runtime(format!("unknown operator: {}", op))),
    }
}

fn string_op(op: BinaryOp, s: &str, right: &Object) -> Result<Object, Panic> {
    match op {
        BinaryOp::Add => Ok(Object::from(format!("{}{}", s, right))),
        BinaryOp::Mul => match right {
            Object::Number(m) => repeat(s, *m).map(Object::from),
            _ => Err(Panic::type_error("cannot multiply string by non-number")),
        },
        BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge => match right {
            Object::Str(other) => Ok(Object::boolean(compare(op, Some(s.cmp(other))))),
            _ => Err(Panic::type_error("cannot compare string with non-string")),
        },
        BinaryOp::Sub | BinaryOp::Div | BinaryOp::Mod => Err(Panic::type_error(format!(
            "strings do not support {}",
            operation_name(op)
        ))),
        _ => Err(Panic::runtime(format!("unknown operator: {}", op))),
    }
}

/// NaN compares false under every ordering operator
fn compare(op: BinaryOp, ordering: Option<Ordering>) -> bool {
    let Some(ordering) = ordering else {
        return false;
    };
    match op {
        BinaryOp::Lt => ordering == Ordering::Less,
        BinaryOp::Gt => ordering == Ordering::Greater,
        BinaryOp::Le => ordering != Ordering::Greater,
        BinaryOp::Ge => ordering != Ordering::Less,
        _ => false,
    }
}

/// Longest string a repetition may produce, in bytes
const MAX_REPEAT_LEN: usize = 1 << 30;

/// Repeat `s` floor(count) times; zero, negative and NaN counts give ""
fn repeat(s: &str, count: f64) -> Result<String, Panic> {
    let times = count.floor();
    if times.is_nan() || times <= 0.0 {
        return Ok(String::new());
    }
    match s.len().checked_mul(times as usize) {
        Some(len) if len <= MAX_REPEAT_LEN => Ok(s.repeat(times as usize)),
        _ => Err(Panic::runtime("string repetition is too large")),
    }
}

/// Unary minus
pub fn negate(operand: &Object) -> Result<Object, Panic> {
    match operand {
        Object::Number(n) => Ok(Object::Number(-n)),
        _ => Err(Panic::type_error("cannot negate non-number")),
    }
}
