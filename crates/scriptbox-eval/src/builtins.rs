//! Builtin functions and exception types.
//!
//! Builtins are plain [`Value::Builtin`] names; the interpreter dispatches
//! them here. Module members (`math.sqrt`, `json.dumps`) share the same
//! representation and are forwarded to [`crate::modules`].

use crate::error::{is_subclass, EvalResult, RuntimeError, EXCEPTION_KINDS};
use crate::interpreter::Interpreter;
use crate::modules;
use crate::ops::{self, MAX_SEQUENCE_LEN};
use crate::value::{Dict, Key, Value};
use scriptbox_types::ast::{BinOp, CmpOp};
use std::cmp::Ordering;

/// Every builtin function name visible to snippets.
pub const BUILTIN_NAMES: &[&str] = &[
    "print", "len", "range", "str", "int", "float", "bool", "list", "dict", "tuple", "abs", "min",
    "max", "sum", "sorted", "reversed", "enumerate", "zip", "map", "filter", "any", "all", "round",
    "isinstance", "repr", "divmod", "pow", "chr", "ord", "callable",
];

/// Resolve a builtin function or exception type by name.
pub fn lookup(name: &str) -> Option<Value> {
    BUILTIN_NAMES
        .iter()
        .copied()
        .chain(EXCEPTION_KINDS.iter().map(|(kind, _)| *kind))
        .find(|builtin| *builtin == name)
        .map(Value::Builtin)
}

pub fn is_exception_type(name: &str) -> bool {
    EXCEPTION_KINDS.iter().any(|(kind, _)| *kind == name)
}

// ── Argument helpers ──────────────────────────────────────────────────────────

pub(crate) type Kwargs = Vec<(String, Value)>;

pub(crate) fn arity(name: &str, args: &[Value], min: usize, max: usize) -> EvalResult<()> {
    let given = args.len();
    if (min..=max).contains(&given) {
        return Ok(());
    }
    Err(RuntimeError::Type(if min == max {
        format!(
            "{name}() takes exactly {min} argument{} ({given} given)",
            if min == 1 { "" } else { "s" }
        )
    } else if given < min {
        format!("{name}() expected at least {min} arguments, got {given}")
    } else {
        format!("{name}() expected at most {max} arguments, got {given}")
    }))
}

/// Remove and return keyword argument `key`.
pub(crate) fn take_kwarg(kwargs: &mut Kwargs, key: &str) -> Option<Value> {
    let index = kwargs.iter().position(|(k, _)| k == key)?;
    Some(kwargs.remove(index).1)
}

/// Fail on any keyword argument left over.
pub(crate) fn no_kwargs(name: &str, kwargs: &Kwargs) -> EvalResult<()> {
    match kwargs.first() {
        None => Ok(()),
        Some((key, _)) => Err(RuntimeError::Type(format!(
            "'{key}' is an invalid keyword argument for {name}()"
        ))),
    }
}

pub(crate) fn int_arg(value: &Value) -> EvalResult<i64> {
    value.as_int().ok_or_else(|| {
        RuntimeError::Type(format!(
            "'{}' object cannot be interpreted as an integer",
            value.type_name()
        ))
    })
}

pub(crate) fn float_arg(name: &str, value: &Value) -> EvalResult<f64> {
    value.as_float().ok_or_else(|| {
        RuntimeError::Type(format!(
            "{name}() argument must be a real number, not '{}'",
            value.type_name()
        ))
    })
}

pub(crate) fn str_arg<'v>(name: &str, value: &'v Value) -> EvalResult<&'v str> {
    value.as_str().ok_or_else(|| {
        RuntimeError::Type(format!(
            "{name}() argument must be str, not {}",
            value.type_name()
        ))
    })
}

// ══════════════════════════════════════════════════════════════════════════════
// Dispatch
// ══════════════════════════════════════════════════════════════════════════════

impl Interpreter {
    pub(crate) fn call_builtin(
        &mut self,
        name: &str,
        mut args: Vec<Value>,
        mut kwargs: Kwargs,
    ) -> EvalResult<Value> {
        if is_exception_type(name) {
            no_kwargs(name, &kwargs)?;
            let message = match args.as_slice() {
                [] => String::new(),
                [one] => one.to_str(),
                many => Value::Tuple(many.to_vec()).repr(),
            };
            return Ok(Value::Exception {
                kind: name.to_string(),
                message,
            });
        }
        if name.contains('.') {
            return modules::call(name, args, kwargs);
        }
        match name {
            "print" => {
                let sep = take_kwarg(&mut kwargs, "sep");
                let end = take_kwarg(&mut kwargs, "end");
                no_kwargs(name, &kwargs)?;
                let text_or = |value: Option<Value>, default: &str| match value {
                    None | Some(Value::None) => Ok(default.to_string()),
                    Some(Value::Str(s)) => Ok(s),
                    Some(other) => Err(RuntimeError::Type(format!(
                        "sep and end must be None or a string, not {}",
                        other.type_name()
                    ))),
                };
                let sep = text_or(sep, " ")?;
                let end = text_or(end, "\n")?;
                let line: Vec<String> = args.iter().map(Value::to_str).collect();
                self.stdout.push_str(&line.join(&sep));
                self.stdout.push_str(&end);
                Ok(Value::None)
            }
            "sorted" => {
                let key = take_kwarg(&mut kwargs, "key");
                let reverse = take_kwarg(&mut kwargs, "reverse");
                no_kwargs(name, &kwargs)?;
                arity(name, &args, 1, 1)?;
                let items = ops::iterate(args.remove(0))?;
                let reverse = reverse.is_some_and(|r| r.is_truthy());
                Ok(Value::List(self.sort_values(items, key.as_ref(), reverse)?))
            }
            "min" | "max" => {
                let key = take_kwarg(&mut kwargs, "key");
                let default = take_kwarg(&mut kwargs, "default");
                no_kwargs(name, &kwargs)?;
                self.extremum(name, args, key, default)
            }
            "map" => {
                no_kwargs(name, &kwargs)?;
                arity(name, &args, 2, usize::MAX)?;
                let func = args.remove(0);
                let columns = zip_columns(args)?;
                let mut out = Vec::with_capacity(columns.len());
                for row in columns {
                    out.push(self.call_value(&func, row, Vec::new())?);
                }
                Ok(Value::List(out))
            }
            "filter" => {
                no_kwargs(name, &kwargs)?;
                arity(name, &args, 2, 2)?;
                let items = ops::iterate(args.remove(1))?;
                let func = args.remove(0);
                let mut out = Vec::new();
                for item in items {
                    let keep = match &func {
                        Value::None => item.is_truthy(),
                        f => self.call_value(f, vec![item.clone()], Vec::new())?.is_truthy(),
                    };
                    if keep {
                        out.push(item);
                    }
                }
                Ok(Value::List(out))
            }
            "enumerate" => {
                let start = take_kwarg(&mut kwargs, "start");
                no_kwargs(name, &kwargs)?;
                arity(name, &args, 1, 2)?;
                let start = match start.or_else(|| args.get(1).cloned()) {
                    Some(value) => int_arg(&value)?,
                    None => 0,
                };
                let items = ops::iterate(args.remove(0))?;
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.into_iter().enumerate() {
                    let index = start.checked_add(i as i64).ok_or_else(|| {
                        RuntimeError::Overflow("integer overflow".into())
                    })?;
                    out.push(Value::Tuple(vec![Value::Int(index), item]));
                }
                Ok(Value::List(out))
            }
            "dict" => {
                arity(name, &args, 0, 1)?;
                let mut dict = match args.pop() {
                    None => Dict::new(),
                    Some(Value::Dict(dict)) => dict,
                    Some(other) => ops::dict_from_pairs(ops::iterate(other)?)?,
                };
                for (key, value) in kwargs {
                    dict.insert(Key::Str(key), value);
                }
                Ok(Value::Dict(dict))
            }
            _ => {
                no_kwargs(name, &kwargs)?;
                call_pure(name, args)
            }
        }
    }

    /// Stable sort by an optional key function.
    pub(crate) fn sort_values(
        &mut self,
        items: Vec<Value>,
        key: Option<&Value>,
        reverse: bool,
    ) -> EvalResult<Vec<Value>> {
        let mut keyed = Vec::with_capacity(items.len());
        for item in items {
            let sort_key = match key {
                Some(Value::None) | None => item.clone(),
                Some(func) => self.call_value(func, vec![item.clone()], Vec::new())?,
            };
            keyed.push((sort_key, item));
        }
        let mut failure = None;
        keyed.sort_by(|(a, _), (b, _)| {
            let (a, b) = if reverse { (b, a) } else { (a, b) };
            ops::ordering(CmpOp::Lt, a, b).unwrap_or_else(|err| {
                failure.get_or_insert(err);
                Ordering::Equal
            })
        });
        match failure {
            Some(err) => Err(err),
            None => Ok(keyed.into_iter().map(|(_, item)| item).collect()),
        }
    }

    fn extremum(
        &mut self,
        name: &str,
        mut args: Vec<Value>,
        key: Option<Value>,
        default: Option<Value>,
    ) -> EvalResult<Value> {
        arity(name, &args, 1, usize::MAX)?;
        let candidates = if args.len() == 1 {
            ops::iterate(args.remove(0))?
        } else {
            if default.is_some() {
                return Err(RuntimeError::Type(format!(
                    "Cannot specify a default for {name}() with multiple positional arguments"
                )));
            }
            args
        };
        let wanted = if name == "max" {
            Ordering::Greater
        } else {
            Ordering::Less
        };
        let mut best: Option<(Value, Value)> = None;
        for item in candidates {
            let score = match &key {
                Some(Value::None) | None => item.clone(),
                Some(func) => self.call_value(func, vec![item.clone()], Vec::new())?,
            };
            let replace = match &best {
                None => true,
                Some((best_score, _)) => ops::ordering(CmpOp::Lt, &score, best_score)? == wanted,
            };
            if replace {
                best = Some((score, item));
            }
        }
        match (best, default) {
            (Some((_, item)), _) => Ok(item),
            (None, Some(default)) => Ok(default),
            (None, None) => Err(RuntimeError::Value(format!(
                "{name}() arg is an empty sequence"
            ))),
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Pure builtins
// ══════════════════════════════════════════════════════════════════════════════

fn call_pure(name: &str, args: Vec<Value>) -> EvalResult<Value> {
    match name {
        "len" => {
            arity(name, &args, 1, 1)?;
            let len = match &args[0] {
                Value::Str(s) => s.chars().count(),
                Value::List(items) | Value::Tuple(items) => items.len(),
                Value::Dict(dict) => dict.len(),
                other => {
                    return Err(RuntimeError::Type(format!(
                        "object of type '{}' has no len()",
                        other.type_name()
                    )))
                }
            };
            Ok(Value::Int(len as i64))
        }
        "range" => range(&args),
        "str" => {
            arity(name, &args, 0, 1)?;
            Ok(Value::Str(args.first().map(Value::to_str).unwrap_or_default()))
        }
        "repr" => {
            arity(name, &args, 1, 1)?;
            Ok(Value::Str(args[0].repr()))
        }
        "int" => to_int(&args),
        "float" => {
            arity(name, &args, 0, 1)?;
            match args.first() {
                None => Ok(Value::Float(0.0)),
                Some(Value::Str(s)) => parse_float(s).map(Value::Float),
                Some(other) => float_arg(name, other).map(Value::Float),
            }
        }
        "bool" => {
            arity(name, &args, 0, 1)?;
            Ok(Value::Bool(args.first().is_some_and(Value::is_truthy)))
        }
        "list" | "tuple" => {
            arity(name, &args, 0, 1)?;
            let items = match args.into_iter().next() {
                Some(value) => ops::iterate(value)?,
                None => Vec::new(),
            };
            Ok(if name == "list" {
                Value::List(items)
            } else {
                Value::Tuple(items)
            })
        }
        "abs" => {
            arity(name, &args, 1, 1)?;
            match &args[0] {
                Value::Float(f) => Ok(Value::Float(f.abs())),
                other => int_arg(other)?
                    .checked_abs()
                    .map(Value::Int)
                    .ok_or_else(|| RuntimeError::Overflow("integer overflow".into())),
            }
        }
        "sum" => {
            arity(name, &args, 1, 2)?;
            let mut args = args.into_iter();
            let items = ops::iterate(args.next().unwrap_or_default())?;
            let mut total = args.next().unwrap_or(Value::Int(0));
            if matches!(total, Value::Str(_)) {
                return Err(RuntimeError::Type(
                    "sum() can't sum strings [use ''.join(seq) instead]".into(),
                ));
            }
            for item in items {
                total = ops::binary(BinOp::Add, &total, &item)?;
            }
            Ok(total)
        }
        "reversed" => {
            arity(name, &args, 1, 1)?;
            let mut items = ops::iterate(args.into_iter().next().unwrap_or_default())?;
            items.reverse();
            Ok(Value::List(items))
        }
        "zip" => Ok(Value::List(
            zip_columns(args)?.into_iter().map(Value::Tuple).collect(),
        )),
        "any" | "all" => {
            arity(name, &args, 1, 1)?;
            let items = ops::iterate(args.into_iter().next().unwrap_or_default())?;
            Ok(Value::Bool(if name == "any" {
                items.iter().any(Value::is_truthy)
            } else {
                items.iter().all(Value::is_truthy)
            }))
        }
        "round" => round(&args),
        "isinstance" => {
            arity(name, &args, 2, 2)?;
            let classes = match &args[1] {
                Value::Tuple(items) => items.clone(),
                single => vec![single.clone()],
            };
            let mut matched = false;
            for class in &classes {
                let Value::Builtin(class) = class else {
                    return Err(RuntimeError::Type(
                        "isinstance() arg 2 must be a type or tuple of types".into(),
                    ));
                };
                matched |= is_instance(&args[0], class);
            }
            Ok(Value::Bool(matched))
        }
        "divmod" => {
            arity(name, &args, 2, 2)?;
            Ok(Value::Tuple(vec![
                ops::binary(BinOp::FloorDiv, &args[0], &args[1])?,
                ops::binary(BinOp::Mod, &args[0], &args[1])?,
            ]))
        }
        "pow" => {
            arity(name, &args, 2, 3)?;
            match args.get(2) {
                None => ops::binary(BinOp::Pow, &args[0], &args[1]),
                Some(modulus) => modular_pow(
                    int_arg(&args[0])?,
                    int_arg(&args[1])?,
                    int_arg(modulus)?,
                ),
            }
        }
        "chr" => {
            arity(name, &args, 1, 1)?;
            let code = int_arg(&args[0])?;
            u32::try_from(code)
                .ok()
                .and_then(char::from_u32)
                .map(|c| Value::Str(c.to_string()))
                .ok_or_else(|| RuntimeError::Value("chr() arg not in range(0x110000)".into()))
        }
        "ord" => {
            arity(name, &args, 1, 1)?;
            let text = str_arg(name, &args[0])?;
            let mut chars = text.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(Value::Int(c as i64)),
                _ => Err(RuntimeError::Type(format!(
                    "ord() expected a character, but string of length {} found",
                    text.chars().count()
                ))),
            }
        }
        "callable" => {
            arity(name, &args, 1, 1)?;
            Ok(Value::Bool(args[0].is_callable()))
        }
        _ => Err(RuntimeError::Name(format!("name '{name}' is not defined"))),
    }
}

fn range(args: &[Value]) -> EvalResult<Value> {
    arity("range", args, 1, 3)?;
    let ints = args.iter().map(int_arg).collect::<EvalResult<Vec<_>>>()?;
    let (start, stop, step) = match ints.as_slice() {
        [stop] => (0, *stop, 1),
        [start, stop] => (*start, *stop, 1),
        [start, stop, step, ..] => (*start, *stop, *step),
        [] => (0, 0, 1),
    };
    if step == 0 {
        return Err(RuntimeError::Value("range() arg 3 must not be zero".into()));
    }
    let span = if step > 0 {
        (stop as i128 - start as i128).max(0)
    } else {
        (start as i128 - stop as i128).max(0)
    };
    let count = (span + step.unsigned_abs() as i128 - 1) / step.unsigned_abs() as i128;
    if count > MAX_SEQUENCE_LEN as i128 {
        return Err(RuntimeError::Overflow(format!(
            "range of {count} items exceeds the limit of {MAX_SEQUENCE_LEN}"
        )));
    }
    Ok(Value::List(
        (0..count as i64).map(|i| Value::Int(start + i * step)).collect(),
    ))
}

fn to_int(args: &[Value]) -> EvalResult<Value> {
    arity("int", args, 0, 2)?;
    match args {
        [] => Ok(Value::Int(0)),
        [Value::Str(s), base] => {
            let base = int_arg(base)?;
            let radix = u32::try_from(base)
                .ok()
                .filter(|b| (2..=36).contains(b))
                .ok_or_else(|| RuntimeError::Value("int() base must be >= 2 and <= 36".into()))?;
            let digits = s.trim().replace('_', "");
            let lowered = digits.to_ascii_lowercase();
            let unprefixed = match radix {
                16 => lowered.trim_start_matches("0x"),
                8 => lowered.trim_start_matches("0o"),
                2 => lowered.trim_start_matches("0b"),
                _ => lowered.as_str(),
            };
            i64::from_str_radix(unprefixed, radix)
                .map(Value::Int)
                .map_err(|_| {
                    RuntimeError::Value(format!(
                        "invalid literal for int() with base {base}: {}",
                        crate::value::quote(s)
                    ))
                })
        }
        [_, _] => Err(RuntimeError::Type(
            "int() can't convert non-string with explicit base".into(),
        )),
        [Value::Str(s)] => s
            .trim()
            .replace('_', "")
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| {
                RuntimeError::Value(format!(
                    "invalid literal for int() with base 10: {}",
                    crate::value::quote(s)
                ))
            }),
        [Value::Float(f)] => float_to_int(*f).map(Value::Int),
        [other, ..] => int_arg(other).map(Value::Int).map_err(|_| {
            RuntimeError::Type(format!(
                "int() argument must be a string or a real number, not '{}'",
                other.type_name()
            ))
        }),
    }
}

/// Truncate toward zero, rejecting values an `i64` cannot hold.
pub(crate) fn float_to_int(f: f64) -> EvalResult<i64> {
    if f.is_nan() {
        return Err(RuntimeError::Value(
            "cannot convert float NaN to integer".into(),
        ));
    }
    if f.is_infinite() {
        return Err(RuntimeError::Overflow(
            "cannot convert float infinity to integer".into(),
        ));
    }
    let truncated = f.trunc();
    if truncated < i64::MIN as f64 || truncated >= i64::MAX as f64 {
        return Err(RuntimeError::Overflow("integer overflow".into()));
    }
    Ok(truncated as i64)
}

fn parse_float(s: &str) -> EvalResult<f64> {
    s.trim().replace('_', "").parse::<f64>().map_err(|_| {
        RuntimeError::Value(format!(
            "could not convert string to float: {}",
            crate::value::quote(s)
        ))
    })
}

fn round(args: &[Value]) -> EvalResult<Value> {
    arity("round", args, 1, 2)?;
    let digits = match args.get(1) {
        None | Some(Value::None) => None,
        Some(value) => Some(int_arg(value)?),
    };
    match (&args[0], digits) {
        (Value::Float(f), None) => float_to_int(f.round_ties_even()).map(Value::Int),
        (Value::Float(f), Some(n)) => {
            let scale = 10f64.powi(n.clamp(-308, 308) as i32);
            let rounded = (f * scale).round_ties_even() / scale;
            Ok(Value::Float(if rounded.is_finite() { rounded } else { *f }))
        }
        (other, digits) => {
            let n = int_arg(other).map_err(|_| {
                RuntimeError::Type(format!(
                    "type {} doesn't define __round__ method",
                    other.type_name()
                ))
            })?;
            match digits {
                Some(d) if d < 0 => {
                    let Some(scale) = u32::try_from(-d).ok().and_then(|d| 10i64.checked_pow(d))
                    else {
                        return Ok(Value::Int(0));
                    };
                    let (q, r) = (n.div_euclid(scale), n.rem_euclid(scale));
                    let up = match (2 * r as i128).cmp(&(scale as i128)) {
                        Ordering::Greater => true,
                        Ordering::Equal => q % 2 != 0,
                        Ordering::Less => false,
                    };
                    Ok(Value::Int((q + up as i64) * scale))
                }
                _ => Ok(Value::Int(n)),
            }
        }
    }
}

fn modular_pow(base: i64, exp: i64, modulus: i64) -> EvalResult<Value> {
    if modulus == 0 {
        return Err(RuntimeError::Value("pow() 3rd argument cannot be 0".into()));
    }
    if exp < 0 {
        return Err(RuntimeError::Value(
            "pow() 2nd argument cannot be negative when 3rd argument specified".into(),
        ));
    }
    let m = modulus as i128;
    let mut result: i128 = 1;
    let mut base = (base as i128).rem_euclid(m);
    let mut exp = exp;
    while exp > 0 {
        if exp & 1 == 1 {
            result = result * base % m;
        }
        base = base * base % m;
        exp >>= 1;
    }
    // Sign follows the modulus.
    let result = result.rem_euclid(m.abs());
    Ok(Value::Int(if m < 0 && result != 0 { result + m } else { result } as i64))
}

/// Rows of `zip(*iterables)`, stopping at the shortest.
fn zip_columns(iterables: Vec<Value>) -> EvalResult<Vec<Vec<Value>>> {
    let columns = iterables
        .into_iter()
        .map(ops::iterate)
        .collect::<EvalResult<Vec<_>>>()?;
    let Some(len) = columns.iter().map(Vec::len).min() else {
        return Ok(Vec::new());
    };
    let mut rows: Vec<Vec<Value>> = (0..len).map(|_| Vec::with_capacity(columns.len())).collect();
    for column in columns {
        for (row, item) in rows.iter_mut().zip(column) {
            row.push(item);
        }
    }
    Ok(rows)
}

fn is_instance(value: &Value, class: &str) -> bool {
    match (value, class) {
        (Value::Bool(_), "bool" | "int") => true,
        (Value::Int(_), "int") => true,
        (Value::Float(_), "float") => true,
        (Value::Str(_), "str") => true,
        (Value::List(_), "list") => true,
        (Value::Tuple(_), "tuple") => true,
        (Value::Dict(_), "dict") => true,
        (Value::Exception { kind, .. }, class) => {
            matches!(class, "Exception" | "BaseException") || is_subclass(kind, class)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(values: &[i64]) -> Value {
        Value::List(values.iter().copied().map(Value::Int).collect())
    }

    #[test]
    fn test_lookup_finds_functions_and_exception_types() {
        assert!(matches!(lookup("len"), Some(Value::Builtin("len"))));
        assert!(matches!(lookup("KeyError"), Some(Value::Builtin("KeyError"))));
        assert!(lookup("open").is_none());
        assert!(lookup("math.sqrt").is_none());
    }

    #[test]
    fn test_range_forms() {
        assert_eq!(range(&[Value::Int(3)]).unwrap(), ints(&[0, 1, 2]));
        assert_eq!(
            range(&[Value::Int(5), Value::Int(0), Value::Int(-2)]).unwrap(),
            ints(&[5, 3, 1])
        );
        assert_eq!(range(&[Value::Int(2), Value::Int(1)]).unwrap(), ints(&[]));
        assert!(matches!(
            range(&[Value::Int(0), Value::Int(1), Value::Int(0)]),
            Err(RuntimeError::Value(_))
        ));
        assert!(matches!(
            range(&[Value::Int(i64::MAX)]),
            Err(RuntimeError::Overflow(_))
        ));
    }

    #[test]
    fn test_int_conversions() {
        assert_eq!(to_int(&[Value::str(" 42 ")]).unwrap(), Value::Int(42));
        assert_eq!(to_int(&[Value::Float(-2.7)]).unwrap(), Value::Int(-2));
        assert_eq!(
            to_int(&[Value::str("ff"), Value::Int(16)]).unwrap(),
            Value::Int(255)
        );
        let err = to_int(&[Value::str("abc")]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "ValueError: invalid literal for int() with base 10: 'abc'"
        );
        assert!(matches!(
            to_int(&[Value::Float(f64::INFINITY)]),
            Err(RuntimeError::Overflow(_))
        ));
    }

    #[test]
    fn test_round_uses_ties_to_even() {
        assert_eq!(round(&[Value::Float(2.5)]).unwrap(), Value::Int(2));
        assert_eq!(round(&[Value::Float(3.5)]).unwrap(), Value::Int(4));
        assert_eq!(
            round(&[Value::Float(3.14159), Value::Int(2)]).unwrap(),
            Value::Float(3.14)
        );
        assert_eq!(
            round(&[Value::Int(1250), Value::Int(-2)]).unwrap(),
            Value::Int(1200)
        );
    }

    #[test]
    fn test_modular_pow() {
        assert_eq!(modular_pow(3, 4, 5).unwrap(), Value::Int(1));
        assert_eq!(modular_pow(-2, 3, 7).unwrap(), Value::Int(6));
    }

    #[test]
    fn test_isinstance_respects_hierarchy() {
        assert!(is_instance(&Value::Bool(true), "int"));
        assert!(!is_instance(&Value::Int(1), "bool"));
        let err = Value::Exception {
            kind: "KeyError".into(),
            message: "k".into(),
        };
        assert!(is_instance(&err, "LookupError"));
        assert!(is_instance(&err, "Exception"));
        assert!(!is_instance(&err, "ValueError"));
    }

    #[test]
    fn test_zip_stops_at_shortest() {
        let rows = zip_columns(vec![ints(&[1, 2, 3]), Value::str("ab")]).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1], vec![Value::Int(2), Value::str("b")]);
    }
}
