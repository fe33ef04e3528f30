//! Operators, comparisons, indexing and iteration on plain values.
//!
//! Everything here is pure: no scopes, no calls back into snippet code.

use crate::error::{EvalResult, RuntimeError};
use crate::value::{Dict, Key, Value};
use scriptbox_types::ast::{BinOp, CmpOp, UnaryOp};
use std::cmp::Ordering;

/// Longest sequence a single operation may build (`range`, `*` repetition).
pub const MAX_SEQUENCE_LEN: usize = 10_000_000;

fn overflow() -> RuntimeError {
    RuntimeError::Overflow("integer overflow".into())
}

fn unsupported(op: &str, left: &Value, right: &Value) -> RuntimeError {
    RuntimeError::Type(format!(
        "unsupported operand type(s) for {op}: '{}' and '{}'",
        left.type_name(),
        right.type_name()
    ))
}

// ══════════════════════════════════════════════════════════════════════════════
// Arithmetic
// ══════════════════════════════════════════════════════════════════════════════

pub fn binary(op: BinOp, left: &Value, right: &Value) -> EvalResult<Value> {
    if let (Some(a), Some(b)) = (left.as_int(), right.as_int()) {
        return int_binary(op, a, b);
    }
    let is_number = |v: &Value| matches!(v, Value::Int(_) | Value::Float(_) | Value::Bool(_));
    if is_number(left) && is_number(right) {
        let a = left.as_float().unwrap_or_default();
        let b = right.as_float().unwrap_or_default();
        return float_binary(op, a, b);
    }
    match (op, left, right) {
        (BinOp::Add, Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{a}{b}"))),
        (BinOp::Add, Value::List(a), Value::List(b)) => {
            Ok(Value::List(a.iter().chain(b).cloned().collect()))
        }
        (BinOp::Add, Value::Tuple(a), Value::Tuple(b)) => {
            Ok(Value::Tuple(a.iter().chain(b).cloned().collect()))
        }
        (BinOp::Mul, seq, n) | (BinOp::Mul, n, seq)
            if n.as_int().is_some()
                && matches!(seq, Value::Str(_) | Value::List(_) | Value::Tuple(_)) =>
        {
            repeat(seq, n.as_int().unwrap_or_default())
        }
        _ => Err(unsupported(op.as_str(), left, right)),
    }
}

/// A padding width from a snippet, bounded like sequence repetition.
pub fn padded_width(width: usize) -> EvalResult<usize> {
    if width > MAX_SEQUENCE_LEN {
        return Err(RuntimeError::Overflow("padded string is too long".into()));
    }
    Ok(width)
}

fn repeat(seq: &Value, times: i64) -> EvalResult<Value> {
    let times = times.max(0) as usize;
    let len = match seq {
        Value::Str(s) => s.len(),
        Value::List(items) | Value::Tuple(items) => items.len(),
        _ => 0,
    };
    if len.saturating_mul(times) > MAX_SEQUENCE_LEN {
        return Err(RuntimeError::Overflow("repeated sequence is too long".into()));
    }
    Ok(match seq {
        Value::Str(s) => Value::Str(s.repeat(times)),
        Value::List(items) => Value::List(repeat_items(items, times)),
        Value::Tuple(items) => Value::Tuple(repeat_items(items, times)),
        other => other.clone(),
    })
}

fn repeat_items(items: &[Value], times: usize) -> Vec<Value> {
    std::iter::repeat(items).take(times).flatten().cloned().collect()
}

fn int_binary(op: BinOp, a: i64, b: i64) -> EvalResult<Value> {
    let value = match op {
        BinOp::Add => a.checked_add(b).ok_or_else(overflow)?,
        BinOp::Sub => a.checked_sub(b).ok_or_else(overflow)?,
        BinOp::Mul => a.checked_mul(b).ok_or_else(overflow)?,
        BinOp::Div => {
            if b == 0 {
                return Err(RuntimeError::ZeroDivision("division by zero".into()));
            }
            return Ok(Value::Float(a as f64 / b as f64));
        }
        BinOp::FloorDiv => {
            if b == 0 {
                return Err(RuntimeError::ZeroDivision(
                    "integer division or modulo by zero".into(),
                ));
            }
            let q = a.checked_div(b).ok_or_else(overflow)?;
            if a % b != 0 && ((a < 0) != (b < 0)) {
                q - 1
            } else {
                q
            }
        }
        BinOp::Mod => {
            if b == 0 {
                return Err(RuntimeError::ZeroDivision("integer modulo by zero".into()));
            }
            let r = a.checked_rem(b).ok_or_else(overflow)?;
            if r != 0 && ((r < 0) != (b < 0)) {
                r + b
            } else {
                r
            }
        }
        BinOp::Pow => {
            if b < 0 {
                if a == 0 {
                    return Err(RuntimeError::ZeroDivision(
                        "0.0 cannot be raised to a negative power".into(),
                    ));
                }
                return Ok(Value::Float((a as f64).powf(b as f64)));
            }
            let exp = u32::try_from(b).map_err(|_| overflow())?;
            a.checked_pow(exp).ok_or_else(overflow)?
        }
    };
    Ok(Value::Int(value))
}

fn float_binary(op: BinOp, a: f64, b: f64) -> EvalResult<Value> {
    let value = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => {
            if b == 0.0 {
                return Err(RuntimeError::ZeroDivision("float division by zero".into()));
            }
            a / b
        }
        BinOp::FloorDiv => {
            if b == 0.0 {
                return Err(RuntimeError::ZeroDivision(
                    "float floor division by zero".into(),
                ));
            }
            (a / b).floor()
        }
        BinOp::Mod => {
            if b == 0.0 {
                return Err(RuntimeError::ZeroDivision("float modulo".into()));
            }
            let r = a % b;
            if r != 0.0 && ((r < 0.0) != (b < 0.0)) {
                r + b
            } else {
                r
            }
        }
        BinOp::Pow => {
            if a == 0.0 && b < 0.0 {
                return Err(RuntimeError::ZeroDivision(
                    "0.0 cannot be raised to a negative power".into(),
                ));
            }
            let result = a.powf(b);
            if result.is_infinite() && a.is_finite() && b.is_finite() {
                return Err(RuntimeError::Overflow("result too large".into()));
            }
            result
        }
    };
    Ok(Value::Float(value))
}

pub fn unary(op: UnaryOp, operand: &Value) -> EvalResult<Value> {
    match (op, operand) {
        (UnaryOp::Not, v) => Ok(Value::Bool(!v.is_truthy())),
        (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnaryOp::Pos, Value::Float(f)) => Ok(Value::Float(*f)),
        (UnaryOp::Neg, v) if v.as_int().is_some() => v
            .as_int()
            .and_then(i64::checked_neg)
            .map(Value::Int)
            .ok_or_else(overflow),
        (UnaryOp::Pos, v) if v.as_int().is_some() => Ok(Value::Int(v.as_int().unwrap_or_default())),
        (op, v) => Err(RuntimeError::Type(format!(
            "bad operand type for unary {}: '{}'",
            match op {
                UnaryOp::Neg => "-",
                UnaryOp::Pos => "+",
                UnaryOp::Not => "not",
            },
            v.type_name()
        ))),
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Comparison
// ══════════════════════════════════════════════════════════════════════════════

pub fn compare(op: CmpOp, left: &Value, right: &Value) -> EvalResult<bool> {
    Ok(match op {
        CmpOp::Eq => left == right,
        CmpOp::NotEq => left != right,
        CmpOp::Lt => ordering(op, left, right)? == Ordering::Less,
        CmpOp::Gt => ordering(op, left, right)? == Ordering::Greater,
        CmpOp::LtE => ordering(op, left, right)? != Ordering::Greater,
        CmpOp::GtE => ordering(op, left, right)? != Ordering::Less,
        CmpOp::In => contains(right, left)?,
        CmpOp::NotIn => !contains(right, left)?,
        CmpOp::Is => identical(left, right),
        CmpOp::IsNot => !identical(left, right),
    })
}

fn identical(left: &Value, right: &Value) -> bool {
    std::mem::discriminant(left) == std::mem::discriminant(right) && left == right
}

/// Total order used by `<` and friends and by sorting.
pub fn ordering(op: CmpOp, left: &Value, right: &Value) -> EvalResult<Ordering> {
    let unordered = || {
        RuntimeError::Type(format!(
            "'{}' not supported between instances of '{}' and '{}'",
            op.as_str(),
            left.type_name(),
            right.type_name()
        ))
    };
    if let (Some(a), Some(b)) = (left.as_int(), right.as_int()) {
        return Ok(a.cmp(&b));
    }
    match (left, right) {
        (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
        (Value::List(a), Value::List(b)) | (Value::Tuple(a), Value::Tuple(b)) => {
            for (x, y) in a.iter().zip(b) {
                if x != y {
                    return ordering(op, x, y);
                }
            }
            Ok(a.len().cmp(&b.len()))
        }
        _ => match (left.as_float(), right.as_float()) {
            (Some(a), Some(b)) => a.partial_cmp(&b).ok_or_else(unordered),
            _ => Err(unordered()),
        },
    }
}

/// `item in container`.
pub fn contains(container: &Value, item: &Value) -> EvalResult<bool> {
    match container {
        Value::Str(haystack) => match item {
            Value::Str(needle) => Ok(haystack.contains(needle.as_str())),
            other => Err(RuntimeError::Type(format!(
                "'in <string>' requires string as left operand, not {}",
                other.type_name()
            ))),
        },
        Value::List(items) | Value::Tuple(items) => Ok(items.contains(item)),
        Value::Dict(dict) => Ok(dict.contains_key(&Key::from_value(item)?)),
        other => Err(RuntimeError::Type(format!(
            "argument of type '{}' is not iterable",
            other.type_name()
        ))),
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Iteration
// ══════════════════════════════════════════════════════════════════════════════

/// Materialise an iterable into its items.
pub fn iterate(value: Value) -> EvalResult<Vec<Value>> {
    match value {
        Value::List(items) | Value::Tuple(items) => Ok(items),
        Value::Str(s) => Ok(s.chars().map(|c| Value::Str(c.to_string())).collect()),
        Value::Dict(dict) => Ok(dict.keys().map(Key::to_value).collect()),
        other => Err(RuntimeError::Type(format!(
            "'{}' object is not iterable",
            other.type_name()
        ))),
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Indexing
// ══════════════════════════════════════════════════════════════════════════════

fn index_of(container: &str, index: &Value, len: usize) -> EvalResult<usize> {
    let raw = index.as_int().ok_or_else(|| {
        RuntimeError::Type(format!(
            "{container} indices must be integers, not {}",
            index.type_name()
        ))
    })?;
    let adjusted = if raw < 0 { raw + len as i64 } else { raw };
    if adjusted < 0 || adjusted >= len as i64 {
        return Err(RuntimeError::Index(format!("{container} index out of range")));
    }
    Ok(adjusted as usize)
}

/// `container[index]`.
pub fn get_item(container: &Value, index: &Value) -> EvalResult<Value> {
    match container {
        Value::List(items) => Ok(items[index_of("list", index, items.len())?].clone()),
        Value::Tuple(items) => Ok(items[index_of("tuple", index, items.len())?].clone()),
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let i = index_of("string", index, chars.len())?;
            Ok(Value::Str(chars[i].to_string()))
        }
        Value::Dict(dict) => {
            let key = Key::from_value(index)?;
            dict.get(&key)
                .cloned()
                .ok_or_else(|| RuntimeError::Key(index.repr()))
        }
        other => Err(RuntimeError::Type(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

/// `container[index] = value` as written in a snippet.
pub fn set_item(container: Value, index: &Value, value: Value) -> EvalResult<Value> {
    match container {
        Value::Tuple(_) | Value::Str(_) => Err(RuntimeError::Type(format!(
            "'{}' object does not support item assignment",
            container.type_name()
        ))),
        other => replace_item(other, index, value),
    }
}

/// Rebuild `container` with `index` replaced. Also accepts tuples, for
/// writing a mutated element back into its parent.
pub fn replace_item(container: Value, index: &Value, value: Value) -> EvalResult<Value> {
    match container {
        Value::List(mut items) => {
            let i = index_of("list", index, items.len())?;
            items[i] = value;
            Ok(Value::List(items))
        }
        Value::Tuple(mut items) => {
            let i = index_of("tuple", index, items.len())?;
            items[i] = value;
            Ok(Value::Tuple(items))
        }
        Value::Dict(mut dict) => {
            dict.insert(Key::from_value(index)?, value);
            Ok(Value::Dict(dict))
        }
        other => Err(RuntimeError::Type(format!(
            "'{}' object does not support item assignment",
            other.type_name()
        ))),
    }
}

// ── Slices ────────────────────────────────────────────────────────────────────

/// Resolved `lower:upper:step` bounds.
#[derive(Debug, Clone, Copy)]
pub struct SliceBounds {
    pub lower: Option<i64>,
    pub upper: Option<i64>,
    pub step: Option<i64>,
}

impl SliceBounds {
    /// Positions selected in a sequence of `len` items.
    pub fn indices(&self, len: usize) -> EvalResult<Vec<usize>> {
        let len = len as i64;
        let step = self.step.unwrap_or(1);
        if step == 0 {
            return Err(RuntimeError::Value("slice step cannot be zero".into()));
        }
        let clamp = |bound: i64, low: i64, high: i64| {
            let bound = if bound < 0 { bound + len } else { bound };
            bound.clamp(low, high)
        };
        let mut out = Vec::new();
        if step > 0 {
            let start = self.lower.map_or(0, |b| clamp(b, 0, len));
            let stop = self.upper.map_or(len, |b| clamp(b, 0, len));
            let mut i = start;
            while i < stop {
                out.push(i as usize);
                i += step;
            }
        } else {
            let start = self.lower.map_or(len - 1, |b| clamp(b, -1, len - 1));
            let stop = self.upper.map_or(-1, |b| clamp(b, -1, len - 1));
            let mut i = start;
            while i > stop {
                out.push(i as usize);
                i += step;
            }
        }
        Ok(out)
    }
}

/// `container[lower:upper:step]`.
pub fn get_slice(container: &Value, bounds: SliceBounds) -> EvalResult<Value> {
    match container {
        Value::List(items) => Ok(Value::List(pick(items, bounds)?)),
        Value::Tuple(items) => Ok(Value::Tuple(pick(items, bounds)?)),
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let picked = bounds.indices(chars.len())?;
            Ok(Value::Str(picked.into_iter().map(|i| chars[i]).collect()))
        }
        other => Err(RuntimeError::Type(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

fn pick(items: &[Value], bounds: SliceBounds) -> EvalResult<Vec<Value>> {
    Ok(bounds
        .indices(items.len())?
        .into_iter()
        .map(|i| items[i].clone())
        .collect())
}

/// `items[lower:upper] = replacement` for lists (contiguous slices only).
pub fn set_slice(container: Value, bounds: SliceBounds, replacement: Value) -> EvalResult<Value> {
    let Value::List(mut items) = container else {
        return Err(RuntimeError::Type(format!(
            "'{}' object does not support slice assignment",
            container.type_name()
        )));
    };
    if bounds.step.is_some_and(|s| s != 1) {
        return Err(RuntimeError::Value(
            "extended slice assignment is not supported".into(),
        ));
    }
    let len = items.len() as i64;
    let clamp = |bound: i64| {
        let bound = if bound < 0 { bound + len } else { bound };
        bound.clamp(0, len) as usize
    };
    let start = bounds.lower.map_or(0, clamp);
    let stop = bounds.upper.map_or(items.len(), clamp).max(start);
    items.splice(start..stop, iterate(replacement)?);
    Ok(Value::List(items))
}

/// Build a dict from `(key, value)` pairs, validating hashability.
pub fn dict_from_pairs(pairs: Vec<Value>) -> EvalResult<Dict> {
    let mut dict = Dict::new();
    for pair in pairs {
        let items = iterate(pair)?;
        let [key, value]: [Value; 2] = items.try_into().map_err(|items: Vec<Value>| {
            RuntimeError::Value(format!(
                "dictionary update sequence element has length {}; 2 is required",
                items.len()
            ))
        })?;
        dict.insert(Key::from_value(&key)?, value);
    }
    Ok(dict)
}
