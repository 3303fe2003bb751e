// File: src/interpreter/native_functions/errors.rs
//
// The `errors` namespace: building and inspecting error values, and
// raising panics from script code.

use super::{expect_arity, Handled};
use crate::errors::Panic;
use crate::interpreter::Object;

pub const FUNCTIONS: &[&str] = &["new", "format", "is", "panic"];

pub fn handle(name: &str, args: &[Object]) -> Handled {
    let result = match name {
        "new" => expect_arity("errors.new", args, 1).map(|_| Object::error(args[0].to_string())),
        "format" => format_pattern("errors.format", args).map(Object::error),
        "is" => expect_arity("errors.is", args, 1).map(|_| Object::boolean(matches!(args[0], Object::Error(_)))),
        "panic" => {
            let message = args.first().map(Object::to_string).unwrap_or_else(|| "< no message >".to_string());
            Err(Panic::runtime(message))
        }
        _ => return None,
    };
    Some(result)
}

/// Substitute each `$` in the pattern with the next argument.
///
/// Placeholders left without an argument become `$MISSING`; arguments left
/// without a placeholder are appended as ` $ERROR{value}`.
pub(crate) fn format_pattern(name: &str, args: &[Object]) -> Result<String, Panic> {
    let Some(pattern) = args.first() else {
        return Err(Panic::argument(format!("{}() expects at least 1 argument", name)));
    };
    let Object::Str(pattern) = pattern else {
        return Err(Panic::argument(format!("{}() first argument must be a string pattern", name)));
    };

    let mut values = args[1..].iter();
    let mut out = String::with_capacity(pattern.len());
    for ch in pattern.chars() {
        if ch == '$' {
            match values.next() {
                Some(value) => out.push_str(&value.to_string()),
                None => out.push_str("$MISSING"),
            }
        } else {
            out.push(ch);
        }
    }
    for extra in values {
        out.push_str(&format!(" $ERROR{{{}}}", extra));
    }
    Ok(out)
}
