/*
 * value.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! The template value model.
//!
//! [`Value`] is the tagged union used for passing data into and out of the
//! engine. Scalars are stored inline; strings and composite variants are
//! `Arc`-shared so that copying a value never deep-copies host data.
//! Host-backed lazy containers are reached through the capability traits
//! [`SequenceAccessor`] and [`MappingAccessor`].
//!
//! Resolving an absent map entry or an out-of-range index yields
//! [`Value::Empty`], which is the engine's sole representation of
//! "undefined".

use std::fmt;
use std::sync::Arc;

use hashlink::LinkedHashMap;

use crate::callable::Callable;

/// An ordered sequence of values.
pub type ValueList = Vec<Value>;

/// A string-keyed, insertion-ordered map of values.
pub type ValueMap = LinkedHashMap<String, Value>;

/// Whether a string value is subject to autoescaping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrKind {
    /// Escaped when autoescape is active.
    Normal,
    /// Marked safe; emitted verbatim.
    Safe,
}

/// Capability interface to a host-backed lazy list.
///
/// The accessor must stay callable for the lifetime of any [`Value`]
/// wrapping it.
pub trait SequenceAccessor: Send + Sync {
    /// Number of elements, or `None` when the size is not known without
    /// enumeration.
    fn len(&self) -> Option<usize>;

    /// Element at `index`, or `None` when out of range.
    fn item(&self, index: usize) -> Option<Value>;

    /// Lazy iteration over the elements.
    fn iterate(&self) -> Box<dyn Iterator<Item = Value> + '_> {
        Box::new((0..).map_while(move |i| self.item(i)))
    }
}

/// Capability interface to a host-backed lazy map.
pub trait MappingAccessor: Send + Sync {
    /// Number of entries, or `None` when the size is not known.
    fn len(&self) -> Option<usize>;

    /// Whether `key` is present.
    fn contains(&self, key: &str) -> bool;

    /// Value for `key`, or `None` when absent.
    fn get(&self, key: &str) -> Option<Value>;

    /// The keys of the map. Ordering is unspecified.
    fn keys(&self) -> Vec<String>;
}

/// A host-backed lazy list value.
#[derive(Clone)]
pub struct DynList(Arc<dyn SequenceAccessor>);

impl DynList {
    /// Wrap a host accessor.
    pub fn new(accessor: Arc<dyn SequenceAccessor>) -> Self {
        DynList(accessor)
    }

    pub fn len(&self) -> Option<usize> {
        self.0.len()
    }

    pub fn item(&self, index: usize) -> Option<Value> {
        self.0.item(index)
    }

    /// Enumerate all elements into an owned list.
    pub fn materialize(&self) -> ValueList {
        self.0.iterate().collect()
    }

    fn ptr_eq(&self, other: &DynList) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for DynList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<generic list>")
    }
}

/// A host-backed lazy map value.
#[derive(Clone)]
pub struct DynMap(Arc<dyn MappingAccessor>);

impl DynMap {
    /// Wrap a host accessor.
    pub fn new(accessor: Arc<dyn MappingAccessor>) -> Self {
        DynMap(accessor)
    }

    pub fn len(&self) -> Option<usize> {
        self.0.len()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains(key)
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.0.get(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.0.keys()
    }

    fn ptr_eq(&self, other: &DynMap) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for DynMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<generic map>")
    }
}

/// A template value.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// Absent/undefined. Coerces to false, the empty string, and zero.
    #[default]
    Empty,
    /// Two-state truth.
    Bool(bool),
    /// Signed 64-bit integer.
    Int(i64),
    /// IEEE-754 double.
    Double(f64),
    /// Shared text, with its autoescape marking.
    String(Arc<str>, StrKind),
    /// Ordered sequence.
    List(Arc<ValueList>),
    /// String-keyed map.
    Map(Arc<ValueMap>),
    /// Host-backed lazy list.
    DynList(DynList),
    /// Host-backed lazy map.
    DynMap(DynMap),
    /// Host- or template-defined callable.
    Callable(Callable),
}

impl Value {
    /// A string value marked safe for autoescaping.
    pub fn safe(text: impl Into<String>) -> Value {
        Value::String(Arc::from(text.into()), StrKind::Safe)
    }

    /// True when the value is [`Value::Empty`].
    pub fn is_empty_value(&self) -> bool {
        matches!(self, Value::Empty)
    }

    /// The text of a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s, _) => Some(s),
            _ => None,
        }
    }

    /// Check if this value is "truthy" for conditional evaluation.
    ///
    /// Truthiness rules: Empty is falsy; booleans are themselves; numbers
    /// are truthy when nonzero; strings when nonempty; containers when
    /// they hold at least one element; callables are always truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Empty => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Double(d) => *d != 0.0,
            Value::String(s, _) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Map(map) => !map.is_empty(),
            Value::DynList(list) => match list.len() {
                Some(n) => n > 0,
                None => list.0.iterate().next().is_some(),
            },
            Value::DynMap(map) => match map.len() {
                Some(n) => n > 0,
                None => !map.keys().is_empty(),
            },
            Value::Callable(_) => true,
        }
    }

    /// Number of elements for container and string values.
    pub fn len(&self) -> Option<usize> {
        match self {
            Value::String(s, _) => Some(s.chars().count()),
            Value::List(items) => Some(items.len()),
            Value::Map(map) => Some(map.len()),
            Value::DynList(list) => Some(match list.len() {
                Some(n) => n,
                None => list.0.iterate().count(),
            }),
            Value::DynMap(map) => Some(match map.len() {
                Some(n) => n,
                None => map.keys().len(),
            }),
            _ => None,
        }
    }

    /// Render this value as output text.
    ///
    /// Doubles use shortest round-trip formatting; lists and maps render
    /// in the Jinja-style repr form; Empty renders as the empty string.
    pub fn to_output_string(&self) -> String {
        match self {
            Value::Empty => String::new(),
            Value::Bool(b) => if *b { "true" } else { "false" }.to_string(),
            Value::Int(n) => n.to_string(),
            Value::Double(d) => d.to_string(),
            Value::String(s, _) => s.to_string(),
            Value::Callable(_) => "<callable>".to_string(),
            _ => {
                let mut out = String::new();
                self.write_repr(&mut out);
                out
            }
        }
    }

    /// The repr form used for elements inside rendered collections.
    fn write_repr(&self, out: &mut String) {
        match self {
            Value::Empty => out.push_str("none"),
            Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            Value::Int(n) => out.push_str(&n.to_string()),
            Value::Double(d) => out.push_str(&d.to_string()),
            Value::String(s, _) => {
                out.push('\'');
                for ch in s.chars() {
                    match ch {
                        '\'' => out.push_str("\\'"),
                        '\\' => out.push_str("\\\\"),
                        _ => out.push(ch),
                    }
                }
                out.push('\'');
            }
            Value::List(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    item.write_repr(out);
                }
                out.push(']');
            }
            Value::Map(map) => {
                out.push('{');
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    out.push('\'');
                    out.push_str(key);
                    out.push_str("': ");
                    value.write_repr(out);
                }
                out.push('}');
            }
            Value::DynList(list) => {
                Value::List(Arc::new(list.materialize())).write_repr(out);
            }
            Value::DynMap(map) => {
                let mut owned = ValueMap::new();
                for key in map.keys() {
                    owned.insert(key.clone(), map.get(&key).unwrap_or_default());
                }
                Value::Map(Arc::new(owned)).write_repr(out);
            }
            Value::Callable(_) => out.push_str("<callable>"),
        }
    }

    /// Subscript access: `value[key]`.
    ///
    /// Missing keys and out-of-range indices yield Empty. Negative list
    /// indices count from the end.
    pub fn get_item(&self, key: &Value) -> Value {
        match (self, key) {
            (Value::List(items), Value::Int(i)) => {
                index_sequence(items.len(), *i, |n| items.get(n).cloned())
            }
            (Value::DynList(list), Value::Int(i)) => match list.len() {
                Some(len) => index_sequence(len, *i, |n| list.item(n)),
                None if *i >= 0 => list.item(*i as usize).unwrap_or_default(),
                None => Value::Empty,
            },
            (Value::Map(map), Value::String(name, _)) => {
                map.get(name.as_ref()).cloned().unwrap_or_default()
            }
            (Value::DynMap(map), Value::String(name, _)) => {
                map.get(name).unwrap_or_default()
            }
            (Value::String(s, _), Value::Int(i)) => {
                let count = s.chars().count();
                index_sequence(count, *i, |n| {
                    s.chars().nth(n).map(|ch| Value::from(ch.to_string()))
                })
            }
            _ => Value::Empty,
        }
    }

    /// Attribute access: `value.name`.
    ///
    /// Resolves Map keys first, then generic maps, then numeric
    /// attributes of generic lists, and otherwise yields Empty.
    pub fn get_attr(&self, name: &str) -> Value {
        match self {
            Value::Map(map) => map.get(name).cloned().unwrap_or_default(),
            Value::DynMap(map) => map.get(name).unwrap_or_default(),
            Value::DynList(list) => match name.parse::<usize>() {
                Ok(index) => list.item(index).unwrap_or_default(),
                Err(_) => Value::Empty,
            },
            Value::Callable(callable) => callable.attr(name).unwrap_or_default(),
            _ => Value::Empty,
        }
    }

    /// The elements produced by iterating this value, or `None` when the
    /// value is not iterable. Maps iterate their keys; strings iterate
    /// their characters.
    pub fn iteration_items(&self) -> Option<ValueList> {
        match self {
            Value::List(items) => Some(items.as_ref().clone()),
            Value::Map(map) => Some(map.keys().map(|k| Value::from(k.as_str())).collect()),
            Value::DynList(list) => Some(list.materialize()),
            Value::DynMap(map) => Some(map.keys().into_iter().map(Value::from).collect()),
            Value::String(s, _) => Some(s.chars().map(|c| Value::from(c.to_string())).collect()),
            _ => None,
        }
    }

    /// Membership check for the `in` operator, or `None` when the
    /// right-hand side does not support containment.
    pub fn contains(&self, needle: &Value) -> Option<bool> {
        match self {
            Value::List(items) => Some(items.iter().any(|v| v == needle)),
            Value::DynList(list) => Some(list.0.iterate().any(|v| &v == needle)),
            Value::Map(map) => needle.as_str().map(|key| map.contains_key(key)),
            Value::DynMap(map) => needle.as_str().map(|key| map.contains(key)),
            Value::String(s, _) => needle.as_str().map(|sub| s.contains(sub)),
            _ => None,
        }
    }
}

/// Ordering between two values, or `None` for cross-type operands that do
/// not order (the evaluator reports those as invalid operations).
///
/// Numbers order numerically across Int/Double; strings lexicographically;
/// lists elementwise.
pub fn compare_values(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    use std::cmp::Ordering;

    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Some(x.cmp(y)),
        (Value::Int(x), Value::Double(y)) => (*x as f64).partial_cmp(y),
        (Value::Double(x), Value::Int(y)) => x.partial_cmp(&(*y as f64)),
        (Value::Double(x), Value::Double(y)) => x.partial_cmp(y),
        (Value::String(x, _), Value::String(y, _)) => Some(x.as_ref().cmp(y.as_ref())),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::List(x), Value::List(y)) => {
            for (xv, yv) in x.iter().zip(y.iter()) {
                match compare_values(xv, yv)? {
                    Ordering::Equal => continue,
                    other => return Some(other),
                }
            }
            Some(x.len().cmp(&y.len()))
        }
        _ => None,
    }
}

fn index_sequence(len: usize, index: i64, fetch: impl FnOnce(usize) -> Option<Value>) -> Value {
    let resolved = if index < 0 {
        match len.checked_sub(index.unsigned_abs() as usize) {
            Some(n) => n,
            None => return Value::Empty,
        }
    } else {
        index as usize
    };
    fetch(resolved).unwrap_or_default()
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Empty, Value::Empty) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::Int(a), Value::Double(b)) | (Value::Double(b), Value::Int(a)) => {
                *a as f64 == *b
            }
            (Value::String(a, _), Value::String(b, _)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => {
                a.len() == b.len() && a.iter().all(|(k, v)| b.get(k) == Some(v))
            }
            (Value::DynList(a), Value::DynList(b)) => {
                a.ptr_eq(b) || a.materialize() == b.materialize()
            }
            (Value::DynList(a), Value::List(b)) | (Value::List(b), Value::DynList(a)) => {
                &a.materialize() == b.as_ref()
            }
            (Value::DynMap(a), Value::DynMap(b)) => a.ptr_eq(b),
            (Value::Callable(a), Value::Callable(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Empty
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n as i64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Int(n as i64)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Double(d)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Arc::from(s), StrKind::Normal)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Arc::from(s), StrKind::Normal)
    }
}

impl From<Arc<str>> for Value {
    fn from(s: Arc<str>) -> Self {
        Value::String(s, StrKind::Normal)
    }
}

impl From<ValueList> for Value {
    fn from(items: ValueList) -> Self {
        Value::List(Arc::new(items))
    }
}

impl From<ValueMap> for Value {
    fn from(map: ValueMap) -> Self {
        Value::Map(Arc::new(map))
    }
}

impl From<Callable> for Value {
    fn from(callable: Callable) -> Self {
        Value::Callable(callable)
    }
}
