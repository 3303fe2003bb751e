// File: src/interpreter/native_functions/io.rs
//
// I/O native functions. Output goes to the interpreter's configured sink
// (stdout unless the host captured it).

use super::errors::format_pattern;
use super::Handled;
use crate::interpreter::{Interpreter, Object};

pub const FUNCTIONS: &[&str] = &["print", "println", "printf"];

pub fn handle(interp: &Interpreter, name: &str, args: &[Object]) -> Handled {
    match name {
        "print" | "println" => {
            let mut line = args.iter().map(Object::to_string).collect::<Vec<_>>().join(" ");
            if name == "println" {
                line.push('\n');
            }
            interp.write_output(&line);
            Some(Ok(Object::Nil))
        }
        "printf" => Some(format_pattern("io.printf", args).map(|text| {
            interp.write_output(&text);
            Object::Nil
        })),
        _ => None,
    }
}
