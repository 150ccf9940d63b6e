//! Values extracted from an executed module
//!
//! Plain data (numbers, strings, containers) is copied out of the
//! interpreter once, after the module body finishes, so aliasing inside the
//! script is already resolved. Everything else stays a [`HostObject`]
//! handle to the live interpreter object.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use pyo3::prelude::*;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

/// A Python value
#[derive(Debug, Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Tuple(Vec<Value>),
    /// Insertion-ordered key/value pairs
    Dict(Vec<(Value, Value)>),
    /// Functions, classes, modules, instances and anything else
    Object(HostObject),
}

/// Handle to a live interpreter object
#[derive(Clone)]
pub struct HostObject {
    type_name: Arc<str>,
    callable: bool,
    object: Arc<Py<PyAny>>,
}

impl HostObject {
    pub(crate) fn new(object: &Bound<'_, PyAny>) -> Self {
        let type_name = object
            .get_type()
            .name()
            .map_or_else(|_| "object".to_string(), |n| n.to_string_lossy().into_owned());
        Self {
            type_name: type_name.into(),
            callable: object.is_callable(),
            object: Arc::new(object.clone().unbind()),
        }
    }

    /// Python `type(x).__name__`
    #[inline]
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Python `callable(x)`
    #[inline]
    #[must_use]
    pub fn is_callable(&self) -> bool {
        self.callable
    }

    pub(crate) fn bind<'py>(&self, py: Python<'py>) -> &Bound<'py, PyAny> {
        self.object.bind(py)
    }

    /// Python `str(x)`; falls back to `<type object>` when it raises
    #[must_use]
    pub fn str_text(&self) -> String {
        Python::with_gil(|py| match self.object.bind(py).str() {
            Ok(text) => text.to_string_lossy().into_owned(),
            Err(_) => self.placeholder(),
        })
    }

    /// Python `repr(x)`; falls back to `<type object>` when it raises
    #[must_use]
    pub fn repr_text(&self) -> String {
        Python::with_gil(|py| match self.object.bind(py).repr() {
            Ok(text) => text.to_string_lossy().into_owned(),
            Err(_) => self.placeholder(),
        })
    }

    fn placeholder(&self) -> String {
        format!("<{} object>", self.type_name)
    }

    /// Whether both handles refer to the same interpreter object
    #[must_use]
    pub fn is_same(&self, other: &HostObject) -> bool {
        Arc::ptr_eq(&self.object, &other.object) || self.object.is(&*other.object)
    }
}

impl fmt::Debug for HostObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostObject")
            .field("type", &self.type_name)
            .field("callable", &self.callable)
            .finish_non_exhaustive()
    }
}

impl Value {
    /// Python `type(x).__name__`
    #[must_use]
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
            Value::Object(obj) => obj.type_name(),
        }
    }

    /// Python `callable(x)`
    #[inline]
    #[must_use]
    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Object(obj) if obj.is_callable())
    }

    /// Items of a list or tuple
    #[must_use]
    pub fn as_sequence(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) | Value::Tuple(items) => Some(items),
            _ => None,
        }
    }

    /// String contents
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Python `str(x)`
    #[must_use]
    pub fn py_str(&self) -> String {
        match self {
            Value::Str(s) => s.clone(),
            Value::Object(obj) => obj.str_text(),
            other => other.py_repr(),
        }
    }

    /// Python `repr(x)`
    #[must_use]
    pub fn py_repr(&self) -> String {
        match self {
            Value::None => "None".to_string(),
            Value::Bool(true) => "True".to_string(),
            Value::Bool(false) => "False".to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => float_repr(*f),
            Value::Str(s) => str_repr(s),
            Value::List(items) => format!("[{}]", join_repr(items)),
            Value::Tuple(items) if items.len() == 1 => format!("({},)", items[0].py_repr()),
            Value::Tuple(items) => format!("({})", join_repr(items)),
            Value::Dict(pairs) => {
                let inner: Vec<String> = pairs
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k.py_repr(), v.py_repr()))
                    .collect();
                format!("{{{}}}", inner.join(", "))
            }
            Value::Object(obj) => obj.repr_text(),
        }
    }

    /// Python equality for plain data; identity for objects
    #[must_use]
    pub fn py_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) | (Value::Tuple(a), Value::Tuple(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.py_eq(y))
            }
            (Value::Dict(a), Value::Dict(b)) => {
                a.len() == b.len()
                    && a.iter().all(|(k, v)| {
                        b.iter()
                            .find(|(k2, _)| k.py_eq(k2))
                            .is_some_and(|(_, v2)| v.py_eq(v2))
                    })
            }
            (Value::Object(a), Value::Object(b)) => a.is_same(b),
            (a, b) => match (a.as_number(), b.as_number()) {
                (Some(Number::Int(i)), Some(Number::Int(j))) => i == j,
                #[allow(clippy::float_cmp)]
                (Some(x), Some(y)) => x.as_f64() == y.as_f64(),
                _ => false,
            },
        }
    }

    fn as_number(&self) -> Option<Number> {
        match self {
            Value::Bool(b) => Some(Number::Int(i64::from(*b))),
            Value::Int(i) => Some(Number::Int(*i)),
            Value::Float(f) => Some(Number::Float(*f)),
            _ => None,
        }
    }
}

#[derive(Clone, Copy)]
enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    #[allow(clippy::cast_precision_loss)]
    fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.py_eq(other)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.py_str())
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

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
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

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::None => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::Str(s) => serializer.serialize_str(s),
            Value::List(items) | Value::Tuple(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Dict(pairs) => {
                let mut map = serializer.serialize_map(Some(pairs.len()))?;
                for (k, v) in pairs {
                    map.serialize_entry(&k.py_str(), v)?;
                }
                map.end()
            }
            Value::Object(obj) => serializer.serialize_str(&obj.repr_text()),
        }
    }
}

fn join_repr(items: &[Value]) -> String {
    items
        .iter()
        .map(Value::py_repr)
        .collect::<Vec<_>>()
        .join(", ")
}

fn str_repr(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

/// Python float repr (`1.0`, `0.1`, `1e+20`, `inf`)
fn float_repr(f: f64) -> String {
    if f.is_nan() {
        return "nan".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let debug = format!("{f:?}");
    match debug.split_once('e') {
        Some((mantissa, exp)) => {
            let (sign, digits) = match exp.strip_prefix('-') {
                Some(d) => ('-', d),
                None => ('+', exp),
            };
            format!("{mantissa}e{sign}{digits:0>2}")
        }
        None => debug,
    }
}

/// The bindings produced by executing a module
#[derive(Debug, Clone, Default)]
pub struct Namespace {
    name: String,
    file: Option<PathBuf>,
    search_path: Vec<PathBuf>,
    bindings: IndexMap<String, Value>,
}

impl Namespace {
    /// Create an empty namespace for a unit
    #[must_use]
    pub fn new(name: impl Into<String>, file: Option<PathBuf>, search_path: Vec<PathBuf>) -> Self {
        Self {
            name: name.into(),
            file,
            search_path,
            bindings: IndexMap::new(),
        }
    }

    /// Unit name (`__name__`)
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// File the unit was executed from
    #[inline]
    #[must_use]
    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    /// Module search path the unit was executed with
    #[inline]
    #[must_use]
    pub fn search_path(&self) -> &[PathBuf] {
        &self.search_path
    }

    /// Look a binding up
    #[inline]
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    /// Whether `name` is bound
    #[inline]
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    /// All bindings in definition order
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.bindings.iter()
    }

    /// Number of bindings
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Whether nothing is bound
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub(crate) fn with_bindings(mut self, bindings: IndexMap<String, Value>) -> Self {
        self.bindings = bindings;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn str_and_repr_follow_python() {
        assert_eq!(Value::Int(42).py_str(), "42");
        assert_eq!(Value::Float(1.0).py_str(), "1.0");
        assert_eq!(Value::Float(0.1).py_str(), "0.1");
        assert_eq!(Value::Float(1e20).py_str(), "1e+20");
        assert_eq!(Value::Bool(true).py_str(), "True");
        assert_eq!(Value::from("x").py_repr(), "'x'");
        assert_eq!(Value::from("it's").py_repr(), "\"it's\"");
        assert_eq!(
            Value::List(vec![Value::from("a"), Value::Int(1)]).py_repr(),
            "['a', 1]"
        );
        assert_eq!(Value::Tuple(vec![Value::Int(1)]).py_repr(), "(1,)");
    }

    #[test]
    fn numeric_equality_crosses_types() {
        assert_eq!(Value::Int(1), Value::Float(1.0));
        assert_eq!(Value::Bool(true), Value::Int(1));
        assert_ne!(Value::from("1"), Value::Int(1));
        assert_ne!(
            Value::List(vec![Value::Int(1)]),
            Value::Tuple(vec![Value::Int(1)])
        );
    }

    #[test]
    fn dict_equality_ignores_order() {
        let a = Value::Dict(vec![
            (Value::from("a"), Value::Int(1)),
            (Value::from("b"), Value::Int(2)),
        ]);
        let b = Value::Dict(vec![
            (Value::from("b"), Value::Int(2)),
            (Value::from("a"), Value::Int(1)),
        ]);
        assert_eq!(a, b);
    }

    #[test]
    fn plain_data_is_never_callable() {
        assert!(!Value::from("optics").is_callable());
        assert!(!Value::List(Vec::new()).is_callable());
        assert_eq!(Value::None.type_name(), "NoneType");
    }
}
