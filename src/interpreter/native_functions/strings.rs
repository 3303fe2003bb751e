// File: src/interpreter/native_functions/strings.rs
//
// String manipulation native functions.
// Offsets returned by `index`/`last_index` are byte offsets, matching what
// string indexing and string iteration use.

use super::{expect_arity, number_arg, string_arg, Handled};
use crate::errors::Panic;
use crate::interpreter::{Object, Table};

pub const FUNCTIONS: &[&str] = &[
    "upper",
    "lower",
    "trim",
    "split",
    "join",
    "contains",
    "has_prefix",
    "has_suffix",
    "replace",
    "index",
    "last_index",
];

pub fn handle(name: &str, args: &[Object]) -> Handled {
    let qualified = format!("strings.{}", name);
    let result = match name {
        "upper" | "lower" | "trim" => transform(&qualified, name, args),
        "split" => split(&qualified, args),
        "join" => join(&qualified, args),
        "contains" | "has_prefix" | "has_suffix" | "index" | "last_index" => search(&qualified, name, args),
        "replace" => replace(&qualified, args),
        _ => return None,
    };
    Some(result)
}

fn transform(qualified: &str, name: &str, args: &[Object]) -> Result<Object, Panic> {
    expect_arity(qualified, args, 1)?;
    let s = string_arg(qualified, args, 0)?;
    let out = match name {
        "upper" => s.to_uppercase(),
        "lower" => s.to_lowercase(),
        _ => s.trim().to_string(),
    };
    Ok(Object::from(out))
}

/// Two-string predicates and lookups. Lookups answer -1 when absent.
fn search(qualified: &str, name: &str, args: &[Object]) -> Result<Object, Panic> {
    expect_arity(qualified, args, 2)?;
    let haystack = string_arg(qualified, args, 0)?;
    let needle = string_arg(qualified, args, 1)?;
    let position = |found: Option<usize>| Object::Number(found.map(|i| i as f64).unwrap_or(-1.0));
    Ok(match name {
        "contains" => Object::boolean(haystack.contains(needle)),
        "has_prefix" => Object::boolean(haystack.starts_with(needle)),
        "has_suffix" => Object::boolean(haystack.ends_with(needle)),
        "index" => position(haystack.find(needle)),
        _ => position(haystack.rfind(needle)),
    })
}

/// Split into an array table; an empty separator splits into characters
fn split(qualified: &str, args: &[Object]) -> Result<Object, Panic> {
    expect_arity(qualified, args, 2)?;
    let s = string_arg(qualified, args, 0)?;
    let sep = string_arg(qualified, args, 1)?;
    let parts: Vec<Object> = if sep.is_empty() {
        s.chars().map(|c| Object::from(c.to_string())).collect()
    } else {
        s.split(sep).map(Object::from).collect()
    };
    Ok(Object::Table(Table::from_array(parts)))
}

/// `join(sep, table)`: values under numeric keys, in key order
fn join(qualified: &str, args: &[Object]) -> Result<Object, Panic> {
    expect_arity(qualified, args, 2)?;
    let sep = string_arg(qualified, args, 0)?;
    let Object::Table(table) = &args[1] else {
        return Err(Panic::argument(format!("{}() second argument must be an object", qualified)));
    };
    let parts: Vec<String> = table
        .entries()
        .into_iter()
        .filter(|(key, _)| matches!(key, Object::Number(_)))
        .map(|(_, value)| value.to_string())
        .collect();
    Ok(Object::from(parts.join(sep)))
}

/// `replace(s, old, new[, n])`: at most `n` replacements, all when `n` is negative or absent
fn replace(qualified: &str, args: &[Object]) -> Result<Object, Panic> {
    if args.len() != 3 && args.len() != 4 {
        return Err(Panic::argument(format!("{}() expects 3 or 4 arguments", qualified)));
    }
    let s = string_arg(qualified, args, 0)?;
    let old = string_arg(qualified, args, 1)?;
    let new = string_arg(qualified, args, 2)?;
    let limit = if args.len() == 4 { number_arg(qualified, args, 3)? } else { -1.0 };

    let out = if limit < 0.0 { s.replace(old, new) } else { s.replacen(old, new, limit as usize) };
    Ok(Object::from(out))
}
