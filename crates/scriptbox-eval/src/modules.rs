//! Importable modules: `math` and `json`.
//!
//! Members are [`Value::Builtin`] entries named `module.member`; calls are
//! routed back here through [`call`].

use crate::builtins::{arity, float_arg, float_to_int, int_arg, no_kwargs, take_kwarg, Kwargs};
use crate::error::{EvalResult, RuntimeError};
use crate::format::float_repr;
use crate::value::{Dict, Key, Module, Value};
use indexmap::IndexMap;
use std::sync::Arc;

const MATH_FUNCTIONS: &[&str] = &[
    "math.sqrt",
    "math.floor",
    "math.ceil",
    "math.trunc",
    "math.fabs",
    "math.pow",
    "math.log",
    "math.log2",
    "math.log10",
    "math.exp",
    "math.sin",
    "math.cos",
    "math.tan",
    "math.atan2",
    "math.hypot",
    "math.isclose",
    "math.isnan",
    "math.isinf",
    "math.gcd",
    "math.factorial",
];

const JSON_FUNCTIONS: &[&str] = &["json.dumps", "json.loads"];

/// Load a module by name.
pub fn load(name: &str) -> EvalResult<Arc<Module>> {
    let (name, functions, constants): (&'static str, &[&'static str], Vec<(&'static str, Value)>) =
        match name {
            "math" => (
                "math",
                MATH_FUNCTIONS,
                vec![
                    ("pi", Value::Float(std::f64::consts::PI)),
                    ("e", Value::Float(std::f64::consts::E)),
                    ("tau", Value::Float(std::f64::consts::TAU)),
                    ("inf", Value::Float(f64::INFINITY)),
                    ("nan", Value::Float(f64::NAN)),
                ],
            ),
            "json" => ("json", JSON_FUNCTIONS, Vec::new()),
            other => {
                return Err(RuntimeError::Import(format!(
                    "No module named '{other}'"
                )))
            }
        };
    let mut members = IndexMap::new();
    for &qualified in functions {
        let member = qualified.rsplit('.').next().unwrap_or(qualified);
        members.insert(member, Value::Builtin(qualified));
    }
    members.extend(constants);
    Ok(Arc::new(Module { name, members }))
}

/// Call module member `qualified` (`"math.sqrt"`).
pub(crate) fn call(qualified: &str, args: Vec<Value>, mut kwargs: Kwargs) -> EvalResult<Value> {
    let name = qualified.rsplit('.').next().unwrap_or(qualified);
    match qualified {
        "math.isclose" => {
            let rel_tol = take_kwarg(&mut kwargs, "rel_tol");
            let abs_tol = take_kwarg(&mut kwargs, "abs_tol");
            no_kwargs(name, &kwargs)?;
            arity(name, &args, 2, 2)?;
            let a = float_arg(name, &args[0])?;
            let b = float_arg(name, &args[1])?;
            let rel_tol = rel_tol.map_or(Ok(1e-9), |v| float_arg(name, &v))?;
            let abs_tol = abs_tol.map_or(Ok(0.0), |v| float_arg(name, &v))?;
            if rel_tol < 0.0 || abs_tol < 0.0 {
                return Err(RuntimeError::Value("tolerances must be non-negative".into()));
            }
            let close = a == b
                || (a.is_finite()
                    && b.is_finite()
                    && (a - b).abs() <= (rel_tol * b.abs()).max(rel_tol * a.abs()).max(abs_tol));
            Ok(Value::Bool(close))
        }
        "json.dumps" => {
            let indent = take_kwarg(&mut kwargs, "indent");
            let sort_keys = take_kwarg(&mut kwargs, "sort_keys");
            no_kwargs(name, &kwargs)?;
            arity(name, &args, 1, 1)?;
            let indent = match indent {
                None | Some(Value::None) => None,
                Some(Value::Str(s)) => Some(s),
                Some(n) => Some(" ".repeat(int_arg(&n)?.max(0) as usize)),
            };
            let options = DumpOptions {
                indent,
                sort_keys: sort_keys.is_some_and(|v| v.is_truthy()),
            };
            let mut out = String::new();
            dump(&args[0], &options, 0, &mut out)?;
            Ok(Value::Str(out))
        }
        "json.loads" => {
            no_kwargs(name, &kwargs)?;
            arity(name, &args, 1, 1)?;
            let text = args[0].as_str().ok_or_else(|| {
                RuntimeError::Type(format!(
                    "the JSON object must be str, not {}",
                    args[0].type_name()
                ))
            })?;
            let parsed: serde_json::Value = serde_json::from_str(text)
                .map_err(|err| RuntimeError::Value(format!("invalid JSON: {err}")))?;
            Ok(from_json(parsed))
        }
        _ => {
            no_kwargs(name, &kwargs)?;
            math(name, &args)
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// math
// ══════════════════════════════════════════════════════════════════════════════

fn domain_error() -> RuntimeError {
    RuntimeError::Value("math domain error".into())
}

/// Reject results that overflowed to infinity from finite input.
fn checked(input: f64, result: f64) -> EvalResult<Value> {
    if result.is_infinite() && input.is_finite() {
        return Err(RuntimeError::Overflow("math range error".into()));
    }
    Ok(Value::Float(result))
}

fn math(name: &str, args: &[Value]) -> EvalResult<Value> {
    let unary = |args: &[Value]| -> EvalResult<f64> {
        arity(name, args, 1, 1)?;
        float_arg(name, &args[0])
    };
    match name {
        "sqrt" => {
            let x = unary(args)?;
            if x < 0.0 {
                return Err(domain_error());
            }
            Ok(Value::Float(x.sqrt()))
        }
        "floor" | "ceil" | "trunc" => {
            arity(name, args, 1, 1)?;
            if let Some(n) = args[0].as_int() {
                return Ok(Value::Int(n));
            }
            let x = unary(args)?;
            let rounded = match name {
                "floor" => x.floor(),
                "ceil" => x.ceil(),
                _ => x.trunc(),
            };
            float_to_int(rounded).map(Value::Int)
        }
        "fabs" => Ok(Value::Float(unary(args)?.abs())),
        "pow" => {
            arity(name, args, 2, 2)?;
            let base = float_arg(name, &args[0])?;
            let exp = float_arg(name, &args[1])?;
            if base == 0.0 && exp < 0.0 {
                return Err(domain_error());
            }
            let result = base.powf(exp);
            if result.is_nan() && !base.is_nan() && !exp.is_nan() {
                return Err(domain_error());
            }
            checked(base, result)
        }
        "log" => {
            arity(name, args, 1, 2)?;
            let x = float_arg(name, &args[0])?;
            if x <= 0.0 {
                return Err(domain_error());
            }
            match args.get(1) {
                None => Ok(Value::Float(x.ln())),
                Some(base) => {
                    let base = float_arg(name, base)?;
                    if base <= 0.0 || base == 1.0 {
                        return Err(domain_error());
                    }
                    Ok(Value::Float(x.ln() / base.ln()))
                }
            }
        }
        "log2" | "log10" => {
            let x = unary(args)?;
            if x <= 0.0 {
                return Err(domain_error());
            }
            Ok(Value::Float(if name == "log2" { x.log2() } else { x.log10() }))
        }
        "exp" => {
            let x = unary(args)?;
            checked(x, x.exp())
        }
        "sin" | "cos" | "tan" => {
            let x = unary(args)?;
            if x.is_infinite() {
                return Err(domain_error());
            }
            Ok(Value::Float(match name {
                "sin" => x.sin(),
                "cos" => x.cos(),
                _ => x.tan(),
            }))
        }
        "atan2" | "hypot" => {
            arity(name, args, 2, 2)?;
            let a = float_arg(name, &args[0])?;
            let b = float_arg(name, &args[1])?;
            Ok(Value::Float(if name == "atan2" { a.atan2(b) } else { a.hypot(b) }))
        }
        "isnan" => Ok(Value::Bool(unary(args)?.is_nan())),
        "isinf" => Ok(Value::Bool(unary(args)?.is_infinite())),
        "gcd" => {
            let mut acc: i64 = 0;
            for arg in args {
                let mut b = int_arg(arg)?.checked_abs().ok_or_else(overflow)?;
                let mut a = acc;
                while b != 0 {
                    (a, b) = (b, a % b);
                }
                acc = a;
            }
            Ok(Value::Int(acc))
        }
        "factorial" => {
            arity(name, args, 1, 1)?;
            let n = int_arg(&args[0]).map_err(|_| {
                RuntimeError::Type("factorial() only accepts integral values".into())
            })?;
            if n < 0 {
                return Err(RuntimeError::Value(
                    "factorial() not defined for negative values".into(),
                ));
            }
            (1..=n)
                .try_fold(1i64, |acc, k| acc.checked_mul(k))
                .map(Value::Int)
                .ok_or_else(overflow)
        }
        _ => Err(RuntimeError::Attribute(format!(
            "module 'math' has no attribute '{name}'"
        ))),
    }
}

fn overflow() -> RuntimeError {
    RuntimeError::Overflow("integer overflow".into())
}

// ══════════════════════════════════════════════════════════════════════════════
// json
// ══════════════════════════════════════════════════════════════════════════════

struct DumpOptions {
    indent: Option<String>,
    sort_keys: bool,
}

/// Serialise with the conventional `", "` / `": "` separators, or one item
/// per line when indenting.
fn dump(value: &Value, options: &DumpOptions, level: usize, out: &mut String) -> EvalResult<()> {
    match value {
        Value::None => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Int(n) => out.push_str(&n.to_string()),
        Value::Float(f) => out.push_str(&json_float(*f)),
        Value::Str(s) => out.push_str(&json_string(s)),
        Value::List(items) | Value::Tuple(items) => {
            let mut rendered = Vec::with_capacity(items.len());
            for item in items {
                let mut piece = String::new();
                dump(item, options, level + 1, &mut piece)?;
                rendered.push(piece);
            }
            write_container(out, '[', ']', rendered, options, level);
        }
        Value::Dict(dict) => {
            let mut entries = Vec::with_capacity(dict.len());
            for (key, item) in dict.iter() {
                let mut piece = String::new();
                dump(item, options, level + 1, &mut piece)?;
                entries.push((json_key(key)?, piece));
            }
            if options.sort_keys {
                entries.sort_by(|a, b| a.0.cmp(&b.0));
            }
            let rendered = entries
                .into_iter()
                .map(|(key, piece)| format!("{}: {piece}", json_string(&key)))
                .collect();
            write_container(out, '{', '}', rendered, options, level);
        }
        other => {
            return Err(RuntimeError::Type(format!(
                "Object of type {} is not JSON serializable",
                other.type_name()
            )))
        }
    }
    Ok(())
}

fn write_container(
    out: &mut String,
    open: char,
    close: char,
    items: Vec<String>,
    options: &DumpOptions,
    level: usize,
) {
    out.push(open);
    if !items.is_empty() {
        match &options.indent {
            None => out.push_str(&items.join(", ")),
            Some(indent) => {
                let inner = format!("\n{}", indent.repeat(level + 1));
                out.push_str(&inner);
                out.push_str(&items.join(&format!(",{inner}")));
                out.push('\n');
                out.push_str(&indent.repeat(level));
            }
        }
    }
    out.push(close);
}

fn json_float(f: f64) -> String {
    if f.is_nan() {
        "NaN".to_string()
    } else if f.is_infinite() {
        if f > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else {
        float_repr(f)
    }
}

fn json_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 || (c as u32) > 0x7e => {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    out.push_str(&format!("\\u{unit:04x}"));
                }
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn json_key(key: &Key) -> EvalResult<String> {
    Ok(match key {
        Key::Str(s) => s.clone(),
        Key::Int(n) => n.to_string(),
        Key::Float(bits) => json_float(f64::from_bits(*bits)),
        Key::Bool(b) => b.to_string(),
        Key::None => "null".to_string(),
        Key::Tuple(_) => {
            return Err(RuntimeError::Type(
                "keys must be str, int, float, bool or None, not tuple".into(),
            ))
        }
    })
}

fn from_json(value: serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::None,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        serde_json::Value::String(s) => Value::Str(s),
        serde_json::Value::Array(items) => Value::List(items.into_iter().map(from_json).collect()),
        serde_json::Value::Object(map) => Value::Dict(
            map.into_iter()
                .map(|(k, v)| (Key::Str(k), from_json(v)))
                .collect::<Dict>(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dumps(value: Value, kwargs: Kwargs) -> String {
        match call("json.dumps", vec![value], kwargs).unwrap() {
            Value::Str(s) => s,
            other => panic!("expected str, got {other:?}"),
        }
    }

    fn sample() -> Value {
        let mut dict = Dict::new();
        dict.insert(Key::Str("b".into()), Value::List(vec![Value::Int(1), Value::Float(2.5)]));
        dict.insert(Key::Str("a".into()), Value::None);
        Value::Dict(dict)
    }

    #[test]
    fn test_load_exposes_members() {
        let math = load("math").unwrap();
        assert!(matches!(math.members.get("sqrt"), Some(Value::Builtin("math.sqrt"))));
        assert!(matches!(math.members.get("pi"), Some(Value::Float(_))));
        let err = load("os").unwrap_err();
        assert_eq!(err.to_string(), "ImportError: No module named 'os'");
    }

    #[test]
    fn test_math_domain_and_rounding() {
        assert_eq!(call("math.sqrt", vec![Value::Int(9)], vec![]).unwrap(), Value::Float(3.0));
        assert!(matches!(
            call("math.sqrt", vec![Value::Int(-1)], vec![]),
            Err(RuntimeError::Value(_))
        ));
        assert_eq!(call("math.floor", vec![Value::Float(-1.5)], vec![]).unwrap(), Value::Int(-2));
        assert_eq!(call("math.ceil", vec![Value::Float(1.2)], vec![]).unwrap(), Value::Int(2));
        assert!(matches!(
            call("math.exp", vec![Value::Int(1000)], vec![]),
            Err(RuntimeError::Overflow(_))
        ));
        assert_eq!(
            call("math.gcd", vec![Value::Int(12), Value::Int(-18)], vec![]).unwrap(),
            Value::Int(6)
        );
    }

    #[test]
    fn test_isclose_tolerances() {
        let close = |a: f64, b: f64, kwargs: Kwargs| {
            call("math.isclose", vec![Value::Float(a), Value::Float(b)], kwargs).unwrap()
        };
        assert_eq!(close(0.1 + 0.2, 0.3, vec![]), Value::Bool(true));
        assert_eq!(close(1.0, 1.1, vec![]), Value::Bool(false));
        assert_eq!(
            close(1.0, 1.1, vec![("abs_tol".into(), Value::Float(0.2))]),
            Value::Bool(true)
        );
    }

    #[test]
    fn test_dumps_layout() {
        assert_eq!(dumps(sample(), vec![]), r#"{"b": [1, 2.5], "a": null}"#);
        assert_eq!(
            dumps(sample(), vec![("sort_keys".into(), Value::Bool(true))]),
            r#"{"a": null, "b": [1, 2.5]}"#
        );
        assert_eq!(
            dumps(sample(), vec![("indent".into(), Value::Int(2))]),
            "{\n  \"b\": [\n    1,\n    2.5\n  ],\n  \"a\": null\n}"
        );
        assert_eq!(dumps(Value::str("é\n"), vec![]), r#""\u00e9\n""#);
    }

    #[test]
    fn test_dumps_rejects_callables() {
        let err = call("json.dumps", vec![Value::Builtin("len")], vec![]).unwrap_err();
        assert!(matches!(err, RuntimeError::Type(_)));
    }

    #[test]
    fn test_loads_keeps_order_and_number_kinds() {
        let parsed = call(
            "json.loads",
            vec![Value::str(r#"{"z": 1, "a": [1.5, true, null]}"#)],
            vec![],
        )
        .unwrap();
        let Value::Dict(dict) = parsed else {
            panic!("expected dict");
        };
        let keys: Vec<Value> = dict.keys().map(Key::to_value).collect();
        assert_eq!(keys, vec![Value::str("z"), Value::str("a")]);
        assert_eq!(
            dict.get(&Key::Str("a".into())),
            Some(&Value::List(vec![Value::Float(1.5), Value::Bool(true), Value::None]))
        );
        assert!(matches!(
            call("json.loads", vec![Value::str("{")], vec![]),
            Err(RuntimeError::Value(_))
        ));
    }
}
