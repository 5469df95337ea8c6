//! Plain, language-neutral values exchanged with the embedded runtime.
//!
//! Event payloads and call arguments are marshalled into `Value` before they
//! cross the bridge so no live host references escape past a call.

use std::collections::BTreeMap;

/// A marshalled value passed to or returned from a script function.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Build a map value from key/value pairs.
    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Value {
        Value::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
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

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
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

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

/// Call arguments as a tagged union over argument count.
///
/// The 0..4 shapes cover every hot-path call site; anything longer goes
/// through the explicit `Variadic` shape. The target's arity is matched by
/// the engine at call time, never assumed here.
#[derive(Debug, Clone)]
pub enum CallArgs {
    Zero,
    One(Value),
    Two(Value, Value),
    Three(Value, Value, Value),
    Four(Value, Value, Value, Value),
    Variadic(Vec<Value>),
}

impl CallArgs {
    pub fn len(&self) -> usize {
        match self {
            CallArgs::Zero => 0,
            CallArgs::One(..) => 1,
            CallArgs::Two(..) => 2,
            CallArgs::Three(..) => 3,
            CallArgs::Four(..) => 4,
            CallArgs::Variadic(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_vec(self) -> Vec<Value> {
        match self {
            CallArgs::Zero => Vec::new(),
            CallArgs::One(a) => vec![a],
            CallArgs::Two(a, b) => vec![a, b],
            CallArgs::Three(a, b, c) => vec![a, b, c],
            CallArgs::Four(a, b, c, d) => vec![a, b, c, d],
            CallArgs::Variadic(v) => v,
        }
    }
}

impl From<()> for CallArgs {
    fn from(_: ()) -> Self {
        CallArgs::Zero
    }
}

impl From<Value> for CallArgs {
    fn from(a: Value) -> Self {
        CallArgs::One(a)
    }
}

impl From<(Value, Value)> for CallArgs {
    fn from((a, b): (Value, Value)) -> Self {
        CallArgs::Two(a, b)
    }
}

impl From<(Value, Value, Value)> for CallArgs {
    fn from((a, b, c): (Value, Value, Value)) -> Self {
        CallArgs::Three(a, b, c)
    }
}

impl From<(Value, Value, Value, Value)> for CallArgs {
    fn from((a, b, c, d): (Value, Value, Value, Value)) -> Self {
        CallArgs::Four(a, b, c, d)
    }
}

impl From<Vec<Value>> for CallArgs {
    fn from(v: Vec<Value>) -> Self {
        CallArgs::Variadic(v)
    }
}
