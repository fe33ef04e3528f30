//! Runtime values.
//!
//! Data values (`None` through `Exception`) serialise with serde so they can
//! cross the worker channel. Callables live only inside the process that
//! created them and refuse to serialise. Non-finite floats travel as the
//! strings `"inf"`, `"-inf"` and `"nan"`.

use crate::error::{EvalResult, RuntimeError};
use crate::format::float_repr;
use indexmap::IndexMap;
use scriptbox_types::ast::FunctionDef;
use serde::de::{self, Deserializer};
use serde::ser::{self, Serializer};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Names bound by one evaluation, in insertion order.
pub type Bindings = IndexMap<String, Value>;

/// Key under which the engine stores the snippet's result.
pub const RESULT_KEY: &str = "__result__";

// ══════════════════════════════════════════════════════════════════════════════
// Value
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Tuple(Vec<Value>),
    Dict(Dict),
    /// An exception object, as bound by `except K as e` or built by `K(msg)`.
    Exception { kind: String, message: String },
    /// A function defined by the snippet.
    Function(Arc<Closure>),
    /// A builtin function, exception type or module member, by name.
    Builtin(&'static str),
    /// A function supplied by the host through the context.
    Native(NativeFn),
    Module(Arc<Module>),
}

impl Value {
    pub fn str(s: impl Into<String>) -> Self {
        Value::Str(s.into())
    }

    /// Wrap a host closure so snippets can call it.
    pub fn native<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&[Value]) -> EvalResult<Value> + Send + Sync + 'static,
    {
        Value::Native(NativeFn {
            name: name.into(),
            func: Arc::new(func),
        })
    }

    /// The script-facing type name used in error messages.
    pub fn type_name(&self) -> &str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Dict(_) => "dict",
            Value::Exception { kind, .. } => kind,
            Value::Function(_) => "function",
            Value::Builtin(_) | Value::Native(_) => "builtin_function_or_method",
            Value::Module(_) => "module",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) | Value::Tuple(items) => !items.is_empty(),
            Value::Dict(dict) => !dict.is_empty(),
            _ => true,
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(
            self,
            Value::Function(_) | Value::Builtin(_) | Value::Native(_)
        )
    }

    /// Numeric view for arithmetic; `bool` counts as an integer.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(n) => Some(*n as f64),
            Value::Bool(b) => Some(*b as i64 as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// `str(value)`.
    pub fn to_str(&self) -> String {
        match self {
            Value::Str(s) => s.clone(),
            Value::Exception { message, .. } => message.clone(),
            other => other.repr(),
        }
    }

    /// `repr(value)`.
    pub fn repr(&self) -> String {
        match self {
            Value::None => "None".to_string(),
            Value::Bool(true) => "True".to_string(),
            Value::Bool(false) => "False".to_string(),
            Value::Int(n) => n.to_string(),
            Value::Float(f) => float_repr(*f),
            Value::Str(s) => quote(s),
            Value::List(items) => format!("[{}]", join_reprs(items)),
            Value::Tuple(items) if items.len() == 1 => format!("({},)", items[0].repr()),
            Value::Tuple(items) => format!("({})", join_reprs(items)),
            Value::Dict(dict) => {
                let entries: Vec<String> = dict
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k.to_value().repr(), v.repr()))
                    .collect();
                format!("{{{}}}", entries.join(", "))
            }
            Value::Exception { kind, message } => format!("{kind}({})", quote(message)),
            Value::Function(closure) => format!("<function {}>", closure.def.name.name),
            Value::Builtin(name) => format!("<built-in function {name}>"),
            Value::Native(native) => format!("<built-in function {}>", native.name),
            Value::Module(module) => format!("<module '{}'>", module.name),
        }
    }
}

fn join_reprs(items: &[Value]) -> String {
    items.iter().map(Value::repr).collect::<Vec<_>>().join(", ")
}

/// Quote a string the way `repr` does.
pub fn quote(s: &str) -> String {
    let delimiter = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(delimiter);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == delimiter => {
                out.push('\\');
                out.push(c);
            }
            c if c.is_control() => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push(delimiter);
    out
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) | (Value::Tuple(a), Value::Tuple(b)) => a == b,
            (Value::Dict(a), Value::Dict(b)) => a == b,
            (
                Value::Exception { kind: ka, message: ma },
                Value::Exception { kind: kb, message: mb },
            ) => ka == kb && ma == mb,
            (Value::Function(a), Value::Function(b)) => Arc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => a == b,
            (Value::Native(a), Value::Native(b)) => Arc::ptr_eq(&a.func, &b.func),
            (Value::Module(a), Value::Module(b)) => a.name == b.name,
            (a, b) => match (a.as_int(), b.as_int()) {
                (Some(x), Some(y)) => x == y,
                _ => match (a, b) {
                    (Value::Float(_), _) | (_, Value::Float(_)) => {
                        match (a.as_float(), b.as_float()) {
                            (Some(x), Some(y)) => x == y,
                            _ => false,
                        }
                    }
                    _ => false,
                },
            },
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_str())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Wire form
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Serialize)]
#[serde(rename = "Value")]
enum WireRef<'a> {
    None,
    Bool(bool),
    Int(i64),
    Float(#[serde(serialize_with = "serialize_float")] f64),
    Str(&'a str),
    List(&'a [Value]),
    Tuple(&'a [Value]),
    Dict(&'a Dict),
    Exception { kind: &'a str, message: &'a str },
}

#[derive(Deserialize)]
#[serde(rename = "Value")]
enum Wire {
    None,
    Bool(bool),
    Int(i64),
    Float(#[serde(deserialize_with = "deserialize_float")] f64),
    Str(String),
    List(Vec<Value>),
    Tuple(Vec<Value>),
    Dict(Dict),
    Exception { kind: String, message: String },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FloatRepr {
    Number(f64),
    Named(String),
}

fn serialize_float<S: Serializer>(f: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if f.is_finite() {
        serializer.serialize_f64(*f)
    } else if f.is_nan() {
        serializer.serialize_str("nan")
    } else if *f > 0.0 {
        serializer.serialize_str("inf")
    } else {
        serializer.serialize_str("-inf")
    }
}

fn deserialize_float<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    match FloatRepr::deserialize(deserializer)? {
        FloatRepr::Number(f) => Ok(f),
        FloatRepr::Named(name) => match name.as_str() {
            "inf" => Ok(f64::INFINITY),
            "-inf" => Ok(f64::NEG_INFINITY),
            "nan" => Ok(f64::NAN),
            other => Err(de::Error::custom(format!("invalid float '{other}'"))),
        },
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let wire = match self {
            Value::None => WireRef::None,
            Value::Bool(b) => WireRef::Bool(*b),
            Value::Int(n) => WireRef::Int(*n),
            Value::Float(f) => WireRef::Float(*f),
            Value::Str(s) => WireRef::Str(s),
            Value::List(items) => WireRef::List(items),
            Value::Tuple(items) => WireRef::Tuple(items),
            Value::Dict(dict) => WireRef::Dict(dict),
            Value::Exception { kind, message } => WireRef::Exception { kind, message },
            Value::Function(_) | Value::Builtin(_) | Value::Native(_) | Value::Module(_) => {
                return Err(ser::Error::custom(format!(
                    "cannot serialise {}",
                    self.repr()
                )))
            }
        };
        wire.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Wire::deserialize(deserializer)? {
            Wire::None => Value::None,
            Wire::Bool(b) => Value::Bool(b),
            Wire::Int(n) => Value::Int(n),
            Wire::Float(f) => Value::Float(f),
            Wire::Str(s) => Value::Str(s),
            Wire::List(items) => Value::List(items),
            Wire::Tuple(items) => Value::Tuple(items),
            Wire::Dict(dict) => Value::Dict(dict),
            Wire::Exception { kind, message } => Value::Exception { kind, message },
        })
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Callables
// ══════════════════════════════════════════════════════════════════════════════

/// A snippet-defined function together with what it closed over.
#[derive(Debug)]
pub struct Closure {
    pub def: Arc<FunctionDef>,
    /// Default values, one slot per parameter, evaluated at definition time.
    pub defaults: Vec<Option<Value>>,
    /// Snapshot of the enclosing function's locals at definition time.
    pub captured: Bindings,
}

/// Host function signature.
pub type NativeCall = dyn Fn(&[Value]) -> EvalResult<Value> + Send + Sync;

#[derive(Clone)]
pub struct NativeFn {
    pub name: String,
    pub func: Arc<NativeCall>,
}

impl fmt::Debug for NativeFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeFn({})", self.name)
    }
}

/// An importable module: a name and its members.
#[derive(Debug)]
pub struct Module {
    pub name: &'static str,
    pub members: IndexMap<&'static str, Value>,
}

// ══════════════════════════════════════════════════════════════════════════════
// Dict
// ══════════════════════════════════════════════════════════════════════════════

/// A hashable dictionary key.
///
/// Integral floats collapse onto `Int` so `d[1]` and `d[1.0]` agree. `Bool`
/// keeps its spelling but compares and hashes as `0` or `1`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Key {
    None,
    Bool(bool),
    Int(i64),
    /// Bit pattern of a non-integral float.
    Float(u64),
    Str(String),
    Tuple(Vec<Key>),
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Key::None, Key::None) => true,
            (Key::Float(a), Key::Float(b)) => a == b,
            (Key::Str(a), Key::Str(b)) => a == b,
            (Key::Tuple(a), Key::Tuple(b)) => a == b,
            (a, b) => matches!((a.as_int(), b.as_int()), (Some(x), Some(y)) if x == y),
        }
    }
}

impl Eq for Key {}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Key::None => 0u8.hash(state),
            Key::Bool(_) | Key::Int(_) => {
                1u8.hash(state);
                self.as_int().hash(state);
            }
            Key::Float(bits) => {
                2u8.hash(state);
                bits.hash(state);
            }
            Key::Str(s) => {
                3u8.hash(state);
                s.hash(state);
            }
            Key::Tuple(items) => {
                4u8.hash(state);
                items.hash(state);
            }
        }
    }
}

impl Key {
    fn as_int(&self) -> Option<i64> {
        match self {
            Key::Bool(b) => Some(i64::from(*b)),
            Key::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn from_value(value: &Value) -> EvalResult<Key> {
        Ok(match value {
            Value::None => Key::None,
            Value::Bool(b) => Key::Bool(*b),
            Value::Int(n) => Key::Int(*n),
            Value::Float(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => Key::Int(*f as i64),
            Value::Float(f) => Key::Float(f.to_bits()),
            Value::Str(s) => Key::Str(s.clone()),
            Value::Tuple(items) => Key::Tuple(
                items
                    .iter()
                    .map(Key::from_value)
                    .collect::<EvalResult<Vec<_>>>()?,
            ),
            other => {
                return Err(RuntimeError::Type(format!(
                    "unhashable type: '{}'",
                    other.type_name()
                )))
            }
        })
    }

    pub fn to_value(&self) -> Value {
        match self {
            Key::None => Value::None,
            Key::Bool(b) => Value::Bool(*b),
            Key::Int(n) => Value::Int(*n),
            Key::Float(bits) => Value::Float(f64::from_bits(*bits)),
            Key::Str(s) => Value::Str(s.clone()),
            Key::Tuple(items) => Value::Tuple(items.iter().map(Key::to_value).collect()),
        }
    }
}

/// Insertion-ordered dictionary. Serialises as a list of `[key, value]`
/// pairs so non-string keys survive JSON.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dict(IndexMap<Key, Value>);

impl Dict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &Key) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &Key) -> bool {
        self.0.contains_key(key)
    }

    /// Insert or overwrite; an existing key keeps its position.
    pub fn insert(&mut self, key: Key, value: Value) -> Option<Value> {
        self.0.insert(key, value)
    }

    /// Remove preserving the order of the remaining entries.
    pub fn remove(&mut self, key: &Key) -> Option<Value> {
        self.0.shift_remove(key)
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Key, &Value)> {
        self.0.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.0.keys()
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.0.values()
    }
}

impl FromIterator<(Key, Value)> for Dict {
    fn from_iter<I: IntoIterator<Item = (Key, Value)>>(iter: I) -> Self {
        Dict(iter.into_iter().collect())
    }
}

impl Serialize for Dict {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.iter())
    }
}

impl<'de> Deserialize<'de> for Dict {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let pairs = Vec::<(Key, Value)>::deserialize(deserializer)?;
        Ok(pairs.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repr_matches_script_conventions() {
        assert_eq!(Value::None.repr(), "None");
        assert_eq!(Value::Bool(true).repr(), "True");
        assert_eq!(Value::Float(2.0).repr(), "2.0");
        assert_eq!(Value::str("it's").repr(), "\"it's\"");
        assert_eq!(Value::str("a\nb").repr(), "'a\\nb'");
        assert_eq!(Value::Tuple(vec![Value::Int(1)]).repr(), "(1,)");
        assert_eq!(
            Value::List(vec![Value::Int(1), Value::str("x")]).repr(),
            "[1, 'x']"
        );
        let dict: Dict = [(Key::Str("a".into()), Value::Int(1))].into_iter().collect();
        assert_eq!(Value::Dict(dict).repr(), "{'a': 1}");
    }

    #[test]
    fn test_numeric_equality_crosses_types() {
        assert_eq!(Value::Int(1), Value::Float(1.0));
        assert_eq!(Value::Bool(true), Value::Int(1));
        assert_ne!(Value::Int(1), Value::str("1"));
        assert_ne!(Value::None, Value::Bool(false));
    }

    #[test]
    fn test_integral_float_keys_collapse() {
        assert_eq!(
            Key::from_value(&Value::Float(3.0)).unwrap(),
            Key::from_value(&Value::Int(3)).unwrap()
        );
        assert!(Key::from_value(&Value::List(vec![])).is_err());
    }

    #[test]
    fn test_dict_serializes_as_pairs() {
        let dict: Dict = [
            (Key::Int(1), Value::str("one")),
            (Key::Tuple(vec![Key::Int(1), Key::Int(2)]), Value::None),
        ]
        .into_iter()
        .collect();
        let json = serde_json::to_string(&Value::Dict(dict.clone())).unwrap();
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Value::Dict(dict));
    }

    #[test]
    fn test_bool_keys_alias_integers() {
        assert_eq!(Key::Bool(true), Key::Int(1));
        assert_ne!(Key::Bool(false), Key::None);
        let mut dict = Dict::new();
        dict.insert(Key::Int(1), Value::str("a"));
        dict.insert(Key::Bool(true), Value::str("b"));
        assert_eq!(dict.len(), 1);
        assert_eq!(dict.get(&Key::Bool(true)), Some(&Value::str("b")));
        assert_eq!(dict.keys().next(), Some(&Key::Int(1)));
    }

    #[test]
    fn test_callables_refuse_to_serialize() {
        let native = Value::native("double", |args| Ok(args[0].clone()));
        assert!(serde_json::to_string(&native).is_err());
        let err = serde_json::to_string(&Value::Builtin("len")).unwrap_err();
        assert!(err.to_string().contains("cannot serialise"), "{err}");
    }

    #[test]
    fn test_non_finite_floats_survive_json() {
        let values = vec![
            Value::Float(f64::INFINITY),
            Value::Float(f64::NEG_INFINITY),
            Value::Float(1.5),
        ];
        let json = serde_json::to_string(&Value::List(values.clone())).unwrap();
        assert_eq!(json, r#"{"List":[{"Float":"inf"},{"Float":"-inf"},{"Float":1.5}]}"#);
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Value::List(values));

        let nan: Value = serde_json::from_str(r#"{"Float":"nan"}"#).unwrap();
        assert!(matches!(nan, Value::Float(f) if f.is_nan()));
        assert!(serde_json::from_str::<Value>(r#"{"Float":"huge"}"#).is_err());
    }

    #[test]
    fn test_bindings_deserialize_owned() {
        fn owned<T: serde::de::DeserializeOwned>(json: &str) -> T {
            serde_json::from_str(json).unwrap()
        }
        let mut bindings = Bindings::new();
        bindings.insert("s".into(), Value::str("x"));
        bindings.insert("t".into(), Value::Tuple(vec![Value::Bool(true), Value::None]));
        let json = serde_json::to_string(&bindings).unwrap();
        assert_eq!(owned::<Bindings>(&json), bindings);
    }
}
