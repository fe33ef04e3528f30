//! Methods on `str`, `list`, `dict` and `tuple` values.
//!
//! The receiver is passed by `&mut`; mutating methods change it in place
//! and the interpreter stores it back where it came from.

use crate::builtins::{arity, int_arg, no_kwargs, take_kwarg, Kwargs};
use crate::error::{EvalResult, RuntimeError};
use crate::format::format_value;
use crate::interpreter::Interpreter;
use crate::ops;
use crate::value::{Dict, Key, Value};

const STR_METHODS: &[&str] = &[
    "upper", "lower", "strip", "lstrip", "rstrip", "split", "join", "replace", "startswith",
    "endswith", "find", "index", "count", "title", "capitalize", "isdigit", "isalpha", "isalnum",
    "isspace", "isupper", "islower", "splitlines", "format", "zfill", "ljust", "rjust", "center",
];

const LIST_METHODS: &[&str] = &[
    "append", "extend", "insert", "pop", "remove", "index", "count", "sort", "reverse", "copy",
    "clear",
];

const DICT_METHODS: &[&str] = &[
    "get", "keys", "values", "items", "pop", "popitem", "update", "setdefault", "copy", "clear",
];

const TUPLE_METHODS: &[&str] = &["index", "count"];

/// Whether `value.name(...)` is a known method.
pub fn has_method(value: &Value, name: &str) -> bool {
    let table = match value {
        Value::Str(_) => STR_METHODS,
        Value::List(_) => LIST_METHODS,
        Value::Dict(_) => DICT_METHODS,
        Value::Tuple(_) => TUPLE_METHODS,
        _ => return false,
    };
    table.contains(&name)
}

impl Interpreter {
    pub(crate) fn call_method(
        &mut self,
        receiver: &mut Value,
        method: &str,
        args: Vec<Value>,
        mut kwargs: Kwargs,
    ) -> EvalResult<Value> {
        if !has_method(receiver, method) {
            return Err(RuntimeError::Attribute(format!(
                "'{}' object has no attribute '{method}'",
                receiver.type_name()
            )));
        }
        match receiver {
            Value::List(items) if method == "sort" => {
                let key = take_kwarg(&mut kwargs, "key");
                let reverse = take_kwarg(&mut kwargs, "reverse");
                no_kwargs("sort", &kwargs)?;
                arity("sort", &args, 0, 0)?;
                let reverse = reverse.is_some_and(|r| r.is_truthy());
                *items = self.sort_values(std::mem::take(items), key.as_ref(), reverse)?;
                Ok(Value::None)
            }
            Value::Str(s) if method == "format" => {
                let named: Vec<(String, Value)> = kwargs;
                str_format(s, &args, &named).map(Value::Str)
            }
            Value::Dict(dict) if method == "update" => {
                arity("update", &args, 0, 1)?;
                if let Some(other) = args.into_iter().next() {
                    let pairs = match other {
                        Value::Dict(other) => other,
                        other => ops::dict_from_pairs(ops::iterate(other)?)?,
                    };
                    for (key, value) in pairs.iter() {
                        dict.insert(key.clone(), value.clone());
                    }
                }
                for (key, value) in kwargs {
                    dict.insert(Key::Str(key), value);
                }
                Ok(Value::None)
            }
            _ => {
                no_kwargs(method, &kwargs)?;
                match receiver {
                    Value::Str(s) => str_method(s, method, &args),
                    Value::List(items) => list_method(items, method, args),
                    Value::Dict(dict) => dict_method(dict, method, args),
                    Value::Tuple(items) => sequence_query(items, "tuple", method, &args),
                    _ => Ok(Value::None),
                }
            }
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// str
// ══════════════════════════════════════════════════════════════════════════════

fn text<'v>(method: &str, value: &'v Value) -> EvalResult<&'v str> {
    value.as_str().ok_or_else(|| {
        RuntimeError::Type(format!(
            "{method}() argument must be str, not {}",
            value.type_name()
        ))
    })
}

fn char_index(s: &str, byte: usize) -> i64 {
    s[..byte].chars().count() as i64
}

fn str_method(s: &str, method: &str, args: &[Value]) -> EvalResult<Value> {
    let strip_set = |args: &[Value]| -> EvalResult<Option<Vec<char>>> {
        arity(method, args, 0, 1)?;
        match args.first() {
            None | Some(Value::None) => Ok(None),
            Some(chars) => Ok(Some(text(method, chars)?.chars().collect())),
        }
    };
    let result = match method {
        "upper" => Value::str(s.to_uppercase()),
        "lower" => Value::str(s.to_lowercase()),
        "strip" | "lstrip" | "rstrip" => {
            let set = strip_set(args)?;
            let matches = |c: char| match &set {
                Some(set) => set.contains(&c),
                None => c.is_whitespace(),
            };
            Value::str(match method {
                "strip" => s.trim_matches(matches),
                "lstrip" => s.trim_start_matches(matches),
                _ => s.trim_end_matches(matches),
            })
        }
        "split" => {
            arity(method, args, 0, 2)?;
            let maxsplit = match args.get(1) {
                Some(value) => int_arg(value)?,
                None => -1,
            };
            let parts = match args.first() {
                None | Some(Value::None) => split_whitespace(s, maxsplit),
                Some(sep) => {
                    let sep = text(method, sep)?;
                    if sep.is_empty() {
                        return Err(RuntimeError::Value("empty separator".into()));
                    }
                    if maxsplit < 0 {
                        s.split(sep).map(str::to_string).collect()
                    } else {
                        s.splitn(maxsplit as usize + 1, sep)
                            .map(str::to_string)
                            .collect()
                    }
                }
            };
            Value::List(parts.into_iter().map(Value::Str).collect())
        }
        "splitlines" => {
            arity(method, args, 0, 0)?;
            Value::List(s.lines().map(Value::str).collect())
        }
        "join" => {
            arity(method, args, 1, 1)?;
            let items = ops::iterate(args[0].clone())?;
            let mut pieces = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                match item {
                    Value::Str(piece) => pieces.push(piece.as_str()),
                    other => {
                        return Err(RuntimeError::Type(format!(
                            "sequence item {i}: expected str instance, {} found",
                            other.type_name()
                        )))
                    }
                }
            }
            Value::str(pieces.join(s))
        }
        "replace" => {
            arity(method, args, 2, 3)?;
            let old = text(method, &args[0])?;
            let new = text(method, &args[1])?;
            match args.get(2).map(int_arg).transpose()? {
                Some(count) if count >= 0 => Value::str(s.replacen(old, new, count as usize)),
                _ => Value::str(s.replace(old, new)),
            }
        }
        "startswith" | "endswith" => {
            arity(method, args, 1, 1)?;
            let candidates = match &args[0] {
                Value::Tuple(items) => items.clone(),
                single => vec![single.clone()],
            };
            let mut found = false;
            for candidate in &candidates {
                let affix = text(method, candidate)?;
                found |= if method == "startswith" {
                    s.starts_with(affix)
                } else {
                    s.ends_with(affix)
                };
            }
            Value::Bool(found)
        }
        "find" | "index" => {
            arity(method, args, 1, 1)?;
            let needle = text(method, &args[0])?;
            match s.find(needle) {
                Some(byte) => Value::Int(char_index(s, byte)),
                None if method == "find" => Value::Int(-1),
                None => return Err(RuntimeError::Value("substring not found".into())),
            }
        }
        "count" => {
            arity(method, args, 1, 1)?;
            let needle = text(method, &args[0])?;
            let count = if needle.is_empty() {
                s.chars().count() + 1
            } else {
                s.matches(needle).count()
            };
            Value::Int(count as i64)
        }
        "title" => {
            arity(method, args, 0, 0)?;
            let mut out = String::with_capacity(s.len());
            let mut previous_alpha = false;
            for c in s.chars() {
                if previous_alpha {
                    out.extend(c.to_lowercase());
                } else {
                    out.extend(c.to_uppercase());
                }
                previous_alpha = c.is_alphabetic();
            }
            Value::Str(out)
        }
        "capitalize" => {
            arity(method, args, 0, 0)?;
            let mut chars = s.chars();
            let out = match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.as_str().to_lowercase().chars()).collect(),
                None => String::new(),
            };
            Value::Str(out)
        }
        "isdigit" | "isalpha" | "isalnum" | "isspace" => {
            arity(method, args, 0, 0)?;
            let test: fn(char) -> bool = match method {
                "isdigit" => |c: char| c.is_ascii_digit(),
                "isalpha" => char::is_alphabetic,
                "isalnum" => char::is_alphanumeric,
                _ => char::is_whitespace,
            };
            Value::Bool(!s.is_empty() && s.chars().all(test))
        }
        "isupper" | "islower" => {
            arity(method, args, 0, 0)?;
            let cased: Vec<char> = s.chars().filter(|c| c.is_alphabetic()).collect();
            let test = if method == "isupper" {
                char::is_uppercase
            } else {
                char::is_lowercase
            };
            Value::Bool(!cased.is_empty() && cased.into_iter().all(test))
        }
        "zfill" => {
            arity(method, args, 1, 1)?;
            let width = ops::padded_width(int_arg(&args[0])?.max(0) as usize)?;
            let len = s.chars().count();
            if len >= width {
                Value::str(s)
            } else {
                let (sign, digits) = match s.chars().next() {
                    Some(c @ ('+' | '-')) => (c.to_string(), &s[1..]),
                    _ => (String::new(), s),
                };
                Value::Str(format!("{sign}{}{digits}", "0".repeat(width - len)))
            }
        }
        "ljust" | "rjust" | "center" => {
            arity(method, args, 1, 2)?;
            let width = ops::padded_width(int_arg(&args[0])?.max(0) as usize)?;
            let fill = match args.get(1) {
                Some(fill) => {
                    let fill = text(method, fill)?;
                    let mut chars = fill.chars();
                    match (chars.next(), chars.next()) {
                        (Some(c), None) => c,
                        _ => {
                            return Err(RuntimeError::Type(
                                "The fill character must be exactly one character long".into(),
                            ))
                        }
                    }
                }
                None => ' ',
            };
            let len = s.chars().count();
            let padding = width.saturating_sub(len);
            let (left, right) = match method {
                "ljust" => (0, padding),
                "rjust" => (padding, 0),
                _ => {
                    let left = padding / 2 + (padding & width & 1);
                    (left, padding - left)
                }
            };
            let fill = fill.to_string();
            Value::Str(format!("{}{s}{}", fill.repeat(left), fill.repeat(right)))
        }
        _ => {
            return Err(RuntimeError::Attribute(format!(
                "'str' object has no attribute '{method}'"
            )))
        }
    };
    Ok(result)
}

fn split_whitespace(s: &str, maxsplit: i64) -> Vec<String> {
    let mut parts = Vec::new();
    let mut rest = s.trim_start();
    while !rest.is_empty() {
        if maxsplit >= 0 && parts.len() as i64 == maxsplit {
            parts.push(rest.to_string());
            break;
        }
        match rest.find(char::is_whitespace) {
            Some(end) => {
                parts.push(rest[..end].to_string());
                rest = rest[end..].trim_start();
            }
            None => {
                parts.push(rest.to_string());
                break;
            }
        }
    }
    parts
}

/// `"{} {name:>4}".format(...)`.
fn str_format(template: &str, args: &[Value], named: &[(String, Value)]) -> EvalResult<String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    let mut auto_index = 0usize;
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut field = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(c) => field.push(c),
                        None => {
                            return Err(RuntimeError::Value(
                                "expected '}' before end of string".into(),
                            ))
                        }
                    }
                }
                let (name, spec) = match field.split_once(':') {
                    Some((name, spec)) => (name, Some(spec)),
                    None => (field.as_str(), None),
                };
                let value = if name.is_empty() {
                    let value = args.get(auto_index);
                    auto_index += 1;
                    value.ok_or_else(|| {
                        RuntimeError::Index(format!(
                            "Replacement index {} out of range for positional args tuple",
                            auto_index - 1
                        ))
                    })?
                } else if let Ok(index) = name.parse::<usize>() {
                    args.get(index).ok_or_else(|| {
                        RuntimeError::Index(format!(
                            "Replacement index {index} out of range for positional args tuple"
                        ))
                    })?
                } else {
                    named
                        .iter()
                        .find(|(key, _)| key == name)
                        .map(|(_, value)| value)
                        .ok_or_else(|| RuntimeError::Key(crate::value::quote(name)))?
                };
                match spec {
                    Some(spec) => out.push_str(&format_value(value, spec)?),
                    None => out.push_str(&value.to_str()),
                }
            }
            '}' => {
                return Err(RuntimeError::Value(
                    "Single '}' encountered in format string".into(),
                ))
            }
            c => out.push(c),
        }
    }
    Ok(out)
}

// ══════════════════════════════════════════════════════════════════════════════
// list & tuple
// ══════════════════════════════════════════════════════════════════════════════

fn list_method(items: &mut Vec<Value>, method: &str, args: Vec<Value>) -> EvalResult<Value> {
    match method {
        "append" => {
            arity(method, &args, 1, 1)?;
            items.push(args.into_iter().next().unwrap_or_default());
        }
        "extend" => {
            arity(method, &args, 1, 1)?;
            let extra = ops::iterate(args.into_iter().next().unwrap_or_default())?;
            if items.len() + extra.len() > ops::MAX_SEQUENCE_LEN {
                return Err(RuntimeError::Overflow("list is too long".into()));
            }
            items.extend(extra);
        }
        "insert" => {
            arity(method, &args, 2, 2)?;
            let mut args = args.into_iter();
            let index = int_arg(&args.next().unwrap_or_default())?;
            let len = items.len() as i64;
            let at = if index < 0 { index + len } else { index }.clamp(0, len);
            items.insert(at as usize, args.next().unwrap_or_default());
        }
        "pop" => {
            arity(method, &args, 0, 1)?;
            if items.is_empty() {
                return Err(RuntimeError::Index("pop from empty list".into()));
            }
            let len = items.len() as i64;
            let index = match args.first() {
                Some(value) => int_arg(value)?,
                None => -1,
            };
            let at = if index < 0 { index + len } else { index };
            if !(0..len).contains(&at) {
                return Err(RuntimeError::Index("pop index out of range".into()));
            }
            return Ok(items.remove(at as usize));
        }
        "remove" => {
            arity(method, &args, 1, 1)?;
            let position = items.iter().position(|item| *item == args[0]).ok_or_else(|| {
                RuntimeError::Value("list.remove(x): x not in list".into())
            })?;
            items.remove(position);
        }
        "reverse" => {
            arity(method, &args, 0, 0)?;
            items.reverse();
        }
        "copy" => {
            arity(method, &args, 0, 0)?;
            return Ok(Value::List(items.clone()));
        }
        "clear" => {
            arity(method, &args, 0, 0)?;
            items.clear();
        }
        _ => return sequence_query(items, "list", method, &args),
    }
    Ok(Value::None)
}

/// `index` and `count`, shared by lists and tuples.
fn sequence_query(items: &[Value], kind: &str, method: &str, args: &[Value]) -> EvalResult<Value> {
    arity(method, args, 1, 1)?;
    match method {
        "index" => items
            .iter()
            .position(|item| *item == args[0])
            .map(|i| Value::Int(i as i64))
            .ok_or_else(|| {
                RuntimeError::Value(if kind == "tuple" {
                    "tuple.index(x): x not in tuple".to_string()
                } else {
                    format!("{} is not in list", args[0].repr())
                })
            }),
        "count" => Ok(Value::Int(
            items.iter().filter(|item| **item == args[0]).count() as i64,
        )),
        _ => Err(RuntimeError::Attribute(format!(
            "'{kind}' object has no attribute '{method}'"
        ))),
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// dict
// ══════════════════════════════════════════════════════════════════════════════

fn dict_method(dict: &mut Dict, method: &str, args: Vec<Value>) -> EvalResult<Value> {
    match method {
        "get" => {
            arity(method, &args, 1, 2)?;
            let key = Key::from_value(&args[0])?;
            Ok(dict
                .get(&key)
                .cloned()
                .unwrap_or_else(|| args.get(1).cloned().unwrap_or_default()))
        }
        "keys" => {
            arity(method, &args, 0, 0)?;
            Ok(Value::List(dict.keys().map(Key::to_value).collect()))
        }
        "values" => {
            arity(method, &args, 0, 0)?;
            Ok(Value::List(dict.values().cloned().collect()))
        }
        "items" => {
            arity(method, &args, 0, 0)?;
            Ok(Value::List(
                dict.iter()
                    .map(|(k, v)| Value::Tuple(vec![k.to_value(), v.clone()]))
                    .collect(),
            ))
        }
        "pop" => {
            arity(method, &args, 1, 2)?;
            let key = Key::from_value(&args[0])?;
            match (dict.remove(&key), args.get(1)) {
                (Some(value), _) => Ok(value),
                (None, Some(default)) => Ok(default.clone()),
                (None, None) => Err(RuntimeError::Key(args[0].repr())),
            }
        }
        "popitem" => {
            arity(method, &args, 0, 0)?;
            let last = dict.keys().last().cloned().ok_or_else(|| {
                RuntimeError::Key("'popitem(): dictionary is empty'".into())
            })?;
            let value = dict.remove(&last).unwrap_or_default();
            Ok(Value::Tuple(vec![last.to_value(), value]))
        }
        "setdefault" => {
            arity(method, &args, 1, 2)?;
            let key = Key::from_value(&args[0])?;
            if let Some(existing) = dict.get(&key) {
                return Ok(existing.clone());
            }
            let value = args.get(1).cloned().unwrap_or_default();
            dict.insert(key, value.clone());
            Ok(value)
        }
        "copy" => {
            arity(method, &args, 0, 0)?;
            Ok(Value::Dict(dict.clone()))
        }
        "clear" => {
            arity(method, &args, 0, 0)?;
            dict.clear();
            Ok(Value::None)
        }
        _ => Err(RuntimeError::Attribute(format!(
            "'dict' object has no attribute '{method}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call_str(s: &str, method: &str, args: &[Value]) -> Value {
        str_method(s, method, args).unwrap()
    }

    #[test]
    fn test_split_variants() {
        assert_eq!(
            call_str("  a b  c ", "split", &[]),
            Value::List(vec![Value::str("a"), Value::str("b"), Value::str("c")])
        );
        assert_eq!(
            call_str("a,b,,c", "split", &[Value::str(",")]),
            Value::List(vec![
                Value::str("a"),
                Value::str("b"),
                Value::str(""),
                Value::str("c")
            ])
        );
        assert_eq!(
            call_str("a b  c", "split", &[Value::None, Value::Int(1)]),
            Value::List(vec![Value::str("a"), Value::str("b  c")])
        );
        assert!(str_method("abc", "split", &[Value::str("")]).is_err());
    }

    #[test]
    fn test_padding_and_case() {
        assert_eq!(call_str("ab", "center", &[Value::Int(5), Value::str("*")]), Value::str("**ab*"));
        assert_eq!(call_str("-42", "zfill", &[Value::Int(6)]), Value::str("-00042"));
        assert_eq!(call_str("hello world", "title", &[]), Value::str("Hello World"));
        assert_eq!(call_str("hELLO", "capitalize", &[]), Value::str("Hello"));
        assert_eq!(call_str("xxhixx", "strip", &[Value::str("x")]), Value::str("hi"));
    }

    #[test]
    fn test_find_counts_characters() {
        assert_eq!(call_str("héllo", "find", &[Value::str("l")]), Value::Int(2));
        assert_eq!(call_str("abc", "find", &[Value::str("z")]), Value::Int(-1));
        assert!(matches!(
            str_method("abc", "index", &[Value::str("z")]),
            Err(RuntimeError::Value(_))
        ));
    }

    #[test]
    fn test_str_format_fields() {
        let named = vec![
            ("name".to_string(), Value::str("ada")),
            ("total".to_string(), Value::Float(3.0)),
        ];
        let positional = [Value::Int(1), Value::Int(2)];
        assert_eq!(
            str_format("{} + {} = {total:.1f}", &positional, &named).unwrap(),
            "1 + 2 = 3.0"
        );
        assert_eq!(str_format("{{{name}}}", &[], &named).unwrap(), "{ada}");
        assert_eq!(str_format("{1}{0}", &[Value::str("a"), Value::str("b")], &[]).unwrap(), "ba");
        assert!(matches!(
            str_format("{missing}", &[], &[]),
            Err(RuntimeError::Key(_))
        ));
    }

    #[test]
    fn test_list_mutations() {
        let mut items = vec![Value::Int(3), Value::Int(1)];
        list_method(&mut items, "append", vec![Value::Int(2)]).unwrap();
        list_method(&mut items, "insert", vec![Value::Int(-100), Value::Int(0)]).unwrap();
        assert_eq!(items, vec![Value::Int(0), Value::Int(3), Value::Int(1), Value::Int(2)]);
        assert_eq!(list_method(&mut items, "pop", vec![]).unwrap(), Value::Int(2));
        list_method(&mut items, "remove", vec![Value::Int(3)]).unwrap();
        assert_eq!(items, vec![Value::Int(0), Value::Int(1)]);
        let err = list_method(&mut items, "index", vec![Value::Int(9)]).unwrap_err();
        assert_eq!(err.to_string(), "ValueError: 9 is not in list");
        let mut empty = Vec::new();
        assert!(matches!(
            list_method(&mut empty, "pop", vec![]),
            Err(RuntimeError::Index(_))
        ));
    }

    #[test]
    fn test_dict_methods() {
        let mut dict = Dict::new();
        dict.insert(Key::Str("a".into()), Value::Int(1));
        assert_eq!(
            dict_method(&mut dict, "get", vec![Value::str("b"), Value::Int(0)]).unwrap(),
            Value::Int(0)
        );
        assert_eq!(
            dict_method(&mut dict, "setdefault", vec![Value::str("b"), Value::Int(2)]).unwrap(),
            Value::Int(2)
        );
        assert_eq!(
            dict_method(&mut dict, "keys", vec![]).unwrap(),
            Value::List(vec![Value::str("a"), Value::str("b")])
        );
        let err = dict_method(&mut dict, "pop", vec![Value::str("zz")]).unwrap_err();
        assert_eq!(err.to_string(), "KeyError: 'zz'");
        assert_eq!(
            dict_method(&mut dict, "popitem", vec![]).unwrap(),
            Value::Tuple(vec![Value::str("b"), Value::Int(2)])
        );
    }

    #[test]
    fn test_has_method() {
        assert!(has_method(&Value::str(""), "upper"));
        assert!(has_method(&Value::Tuple(vec![]), "count"));
        assert!(!has_method(&Value::Tuple(vec![]), "append"));
        assert!(!has_method(&Value::Int(1), "upper"));
    }
}
