//! Operations on context values.
//!
//! Values are plain [`serde_json::Value`]s. Display follows the conventions
//! templates expect from the reference engine: lists render as `[a, b]` and
//! maps as `{k=v}`.

use std::cmp::Ordering;

use serde_json::{Map, Number, Value};

use crate::ast::BinaryOp;

/// Human readable value category used in diagnostics.
pub(crate) const fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "map",
    }
}

/// Renders a non-null value as template output.
pub(crate) fn display(value: &Value) -> String {
    let mut out = String::new();
    write_display(value, &mut out);
    out
}

fn write_display(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(flag) => out.push_str(if *flag { "true" } else { "false" }),
        Value::Number(number) => out.push_str(&number.to_string()),
        Value::String(text) => out.push_str(text),
        Value::Array(items) => {
            out.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push_str(", ");
                }
                write_display(item, out);
            }
            out.push(']');
        }
        Value::Object(entries) => {
            out.push('{');
            for (index, (key, item)) in entries.iter().enumerate() {
                if index > 0 {
                    out.push_str(", ");
                }
                out.push_str(key);
                out.push('=');
                write_display(item, out);
            }
            out.push('}');
        }
    }
}

/// Truth value in `#if` conditions: null, `false`, zero, and empty strings,
/// lists and maps are false.
pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(entries) => !entries.is_empty(),
    }
}

#[derive(Debug, Clone, Copy)]
enum Numeric {
    Int(i64),
    Float(f64),
}

impl Numeric {
    fn of(value: &Value) -> Option<Self> {
        let Value::Number(number) = value else {
            return None;
        };
        number
            .as_i64()
            .map(Self::Int)
            .or_else(|| number.as_f64().map(Self::Float))
    }

    #[expect(clippy::cast_precision_loss, reason = "mixed arithmetic widens to f64")]
    const fn as_f64(self) -> f64 {
        match self {
            Self::Int(n) => n as f64,
            Self::Float(n) => n,
        }
    }
}

fn float_value(n: f64) -> Result<Value, String> {
    Number::from_f64(n)
        .map(Value::Number)
        .ok_or_else(|| format!("arithmetic produced a non-finite result ({n})"))
}

/// Loose equality: numbers compare numerically, values of different kinds
/// compare by their rendered text.
pub(crate) fn equals(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        _ => match (Numeric::of(lhs), Numeric::of(rhs)) {
            (Some(Numeric::Int(a)), Some(Numeric::Int(b))) => a == b,
            (Some(a), Some(b)) => a.as_f64() == b.as_f64(),
            _ if kind(lhs) == kind(rhs) => lhs == rhs,
            _ => display(lhs) == display(rhs),
        },
    }
}

/// Ordering for relational operators; only numbers and strings are ordered.
pub(crate) fn compare(lhs: &Value, rhs: &Value) -> Result<Ordering, String> {
    match (lhs, rhs) {
        (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
        _ => match (Numeric::of(lhs), Numeric::of(rhs)) {
            (Some(Numeric::Int(a)), Some(Numeric::Int(b))) => Ok(a.cmp(&b)),
            (Some(a), Some(b)) => a
                .as_f64()
                .partial_cmp(&b.as_f64())
                .ok_or_else(|| "cannot order NaN".to_owned()),
            _ => Err(format!("cannot compare {} with {}", kind(lhs), kind(rhs))),
        },
    }
}

/// Applies an arithmetic operator. Integer operands stay integral.
pub(crate) fn arithmetic(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value, String> {
    match (Numeric::of(lhs), Numeric::of(rhs)) {
        (Some(Numeric::Int(a)), Some(Numeric::Int(b))) => integer_arithmetic(op, a, b),
        (Some(a), Some(b)) => float_arithmetic(op, a.as_f64(), b.as_f64()),
        _ => Err(format!(
            "cannot apply '{}' to {} and {}",
            op.symbol(),
            kind(lhs),
            kind(rhs)
        )),
    }
}

fn integer_arithmetic(op: BinaryOp, a: i64, b: i64) -> Result<Value, String> {
    let result = match op {
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Sub => a.checked_sub(b),
        BinaryOp::Mul => a.checked_mul(b),
        BinaryOp::Div | BinaryOp::Rem if b == 0 => return Err("division by zero".to_owned()),
        BinaryOp::Div => a.checked_div(b),
        BinaryOp::Rem => a.checked_rem(b),
        _ => return Err(format!("'{}' is not an arithmetic operator", op.symbol())),
    };
    result
        .map(|n| Value::Number(n.into()))
        .ok_or_else(|| format!("integer overflow in '{}'", op.symbol()))
}

#[expect(clippy::float_arithmetic, reason = "templates mix integer and decimal operands")]
fn float_arithmetic(op: BinaryOp, a: f64, b: f64) -> Result<Value, String> {
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div | BinaryOp::Rem if b == 0.0 => return Err("division by zero".to_owned()),
        BinaryOp::Div => a / b,
        BinaryOp::Rem => a % b,
        _ => return Err(format!("'{}' is not an arithmetic operator", op.symbol())),
    };
    float_value(result)
}

/// Unary minus.
#[expect(clippy::float_arithmetic, reason = "decimal values negate as floats")]
pub(crate) fn negate(value: &Value) -> Result<Value, String> {
    match Numeric::of(value) {
        Some(Numeric::Int(n)) => n
            .checked_neg()
            .map(|negated| Value::Number(negated.into()))
            .ok_or_else(|| "integer overflow in negation".to_owned()),
        Some(Numeric::Float(n)) => float_value(-n),
        None => Err(format!("cannot negate {}", kind(value))),
    }
}

/// Integer bounds for `[a..b]`, ascending or descending, inclusive.
pub(crate) fn range(start: &Value, end: &Value) -> Result<Value, String> {
    let bound = |value: &Value| match Numeric::of(value) {
        Some(Numeric::Int(n)) => Ok(n),
        _ => Err(format!("range bounds must be integers, found {}", kind(value))),
    };
    let (first, last) = (bound(start)?, bound(end)?);
    let items: Vec<Value> = if first <= last {
        (first..=last).map(|n| Value::Number(n.into())).collect()
    } else {
        (last..=first).rev().map(|n| Value::Number(n.into())).collect()
    };
    Ok(Value::Array(items))
}

/// Reads `$target.property`. Maps are looked up by key; other values fall
/// back to bean-style accessors such as `$list.empty` for `isEmpty()`.
pub(crate) fn property(target: &Value, name: &str) -> Option<Value> {
    if let Value::Object(entries) = target {
        return entries.get(name).cloned();
    }
    let capitalised = capitalise(name);
    [
        name.to_owned(),
        format!("get{capitalised}"),
        format!("is{capitalised}"),
    ]
    .iter()
    .find_map(|method| invoke(target, method, &[]).ok())
}

fn capitalise(name: &str) -> String {
    let mut chars = name.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}

/// Reads `$target[index]`. Negative list indexes count from the end.
pub(crate) fn index(target: &Value, key: &Value) -> Result<Option<Value>, String> {
    match (target, key) {
        (Value::Array(items), Value::Number(number)) => {
            let Some(position) = number.as_i64() else {
                return Err(format!("list index must be an integer, found {number}"));
            };
            let resolved = if position < 0 {
                i64::try_from(items.len()).ok().map(|len| len + position)
            } else {
                Some(position)
            };
            Ok(resolved
                .and_then(|n| usize::try_from(n).ok())
                .and_then(|n| items.get(n))
                .cloned())
        }
        (Value::Object(entries), Value::String(name)) => Ok(entries.get(name).cloned()),
        (Value::Object(entries), other) => Ok(entries.get(&display(other)).cloned()),
        _ => Err(format!("cannot index {} with {}", kind(target), kind(key))),
    }
}

/// Calls a built-in method on a value.
pub(crate) fn invoke(target: &Value, method: &str, args: &[Value]) -> Result<Value, String> {
    if method == "toString" && args.is_empty() {
        return Ok(Value::String(display(target)));
    }
    match target {
        Value::String(text) => string_method(text, method, args),
        Value::Array(items) => list_method(items, method, args),
        Value::Object(entries) => map_method(entries, method, args),
        Value::Number(_) => number_method(target, method, args),
        Value::Bool(_) | Value::Null => Err(no_such_method(target, method, args)),
    }
}

fn no_such_method(target: &Value, method: &str, args: &[Value]) -> String {
    format!(
        "{} has no method {method} taking {} argument(s)",
        kind(target),
        args.len()
    )
}

fn string_arg<'v>(args: &'v [Value], position: usize) -> Result<&'v str, String> {
    match args.get(position) {
        Some(Value::String(text)) => Ok(text),
        Some(other) => Err(format!(
            "argument {} must be a string, found {}",
            position + 1,
            kind(other)
        )),
        None => Err(format!("missing argument {}", position + 1)),
    }
}

fn index_arg(args: &[Value], position: usize) -> Result<usize, String> {
    args.get(position)
        .and_then(Value::as_u64)
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| format!("argument {} must be a non-negative integer", position + 1))
}

fn count(n: usize) -> Value {
    Value::Number(Number::from(u64::try_from(n).unwrap_or(u64::MAX)))
}

fn string_method(text: &str, method: &str, args: &[Value]) -> Result<Value, String> {
    let value = match (method, args.len()) {
        ("length" | "size", 0) => count(text.chars().count()),
        ("isEmpty", 0) => Value::Bool(text.is_empty()),
        ("toUpperCase", 0) => Value::String(text.to_uppercase()),
        ("toLowerCase", 0) => Value::String(text.to_lowercase()),
        ("trim", 0) => Value::String(text.trim().to_owned()),
        ("contains", 1) => Value::Bool(text.contains(string_arg(args, 0)?)),
        ("startsWith", 1) => Value::Bool(text.starts_with(string_arg(args, 0)?)),
        ("endsWith", 1) => Value::Bool(text.ends_with(string_arg(args, 0)?)),
        ("equals", 1) => {
            Value::Bool(args.first().is_some_and(|other| other.as_str() == Some(text)))
        }
        ("equalsIgnoreCase", 1) => {
            Value::Bool(string_arg(args, 0)?.to_lowercase() == text.to_lowercase())
        }
        ("replace", 2) => Value::String(text.replace(string_arg(args, 0)?, string_arg(args, 1)?)),
        ("indexOf", 1) => {
            let needle = string_arg(args, 0)?;
            text.find(needle).map_or_else(
                || Value::Number((-1).into()),
                |byte| count(text.get(..byte).map_or(0, |prefix| prefix.chars().count())),
            )
        }
        ("substring", 1 | 2) => {
            let chars: Vec<char> = text.chars().collect();
            let begin = index_arg(args, 0)?;
            let end = if args.len() == 2 {
                index_arg(args, 1)?
            } else {
                chars.len()
            };
            let selected = chars.get(begin..end).ok_or_else(|| {
                format!(
                    "substring({begin}, {end}) is out of bounds for length {}",
                    chars.len()
                )
            })?;
            Value::String(selected.iter().collect())
        }
        _ => return Err(no_such_method(&Value::String(text.to_owned()), method, args)),
    };
    Ok(value)
}

fn list_method(items: &[Value], method: &str, args: &[Value]) -> Result<Value, String> {
    let value = match (method, args) {
        ("size", []) => count(items.len()),
        ("isEmpty", []) => Value::Bool(items.is_empty()),
        ("get", [_]) => {
            let position = index_arg(args, 0)?;
            items.get(position).cloned().ok_or_else(|| {
                format!("index {position} is out of bounds for length {}", items.len())
            })?
        }
        ("contains", [needle]) => Value::Bool(items.iter().any(|item| equals(item, needle))),
        ("indexOf", [needle]) => items
            .iter()
            .position(|item| equals(item, needle))
            .map_or_else(|| Value::Number((-1).into()), count),
        _ => return Err(no_such_method(&Value::Array(items.to_vec()), method, args)),
    };
    Ok(value)
}

fn map_method(entries: &Map<String, Value>, method: &str, args: &[Value]) -> Result<Value, String> {
    let value = match (method, args) {
        ("size", []) => count(entries.len()),
        ("isEmpty", []) => Value::Bool(entries.is_empty()),
        ("get", [key]) => entries.get(&key_text(key)).cloned().unwrap_or(Value::Null),
        ("containsKey", [key]) => Value::Bool(entries.contains_key(&key_text(key))),
        ("containsValue", [needle]) => {
            Value::Bool(entries.values().any(|item| equals(item, needle)))
        }
        ("keySet", []) => Value::Array(entries.keys().cloned().map(Value::String).collect()),
        ("values", []) => Value::Array(entries.values().cloned().collect()),
        _ => return Err(no_such_method(&Value::Object(entries.clone()), method, args)),
    };
    Ok(value)
}

fn number_method(target: &Value, method: &str, args: &[Value]) -> Result<Value, String> {
    let Some(number) = Numeric::of(target) else {
        return Err(no_such_method(target, method, args));
    };
    match (method, args) {
        ("intValue" | "longValue", []) => Ok(match number {
            Numeric::Int(n) => Value::Number(n.into()),
            #[expect(clippy::cast_possible_truncation, reason = "truncation is the intent")]
            Numeric::Float(n) => Value::Number((n.trunc() as i64).into()),
        }),
        ("doubleValue" | "floatValue", []) => float_value(number.as_f64()),
        _ => Err(no_such_method(target, method, args)),
    }
}

fn key_text(key: &Value) -> String {
    match key {
        Value::String(text) => text.clone(),
        other => display(other),
    }
}
