//! The script-level value type.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// An insertion-ordered mapping, the shape of script objects.
pub type Object = IndexMap<String, Value>;

/// A value as seen by scripts.
///
/// Scalars (null, bool, int, float, string) plus the two compound shapes,
/// arrays and objects. Host data enters the runtime through JSON form, so
/// anything serde can serialize becomes one of these variants.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<Value>),
    Object(Object),
}

impl Value {
    /// Apply scalar auto-typing.
    ///
    /// Strings that spell an integer, a float, a boolean or `null` become that
    /// scalar. Integers with leading zeros (`"007"`) stay strings. Arrays and
    /// objects are normalized element by element.
    pub fn normalize(self) -> Value {
        match self {
            Value::String(s) => match scalar_from_str(&s) {
                Some(scalar) => scalar,
                None => Value::String(s),
            },
            Value::Array(items) => Value::Array(items.into_iter().map(Value::normalize).collect()),
            Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(key, value)| (key, value.normalize()))
                    .collect(),
            ),
            other => other,
        }
    }

    /// True for `null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// True for null, the empty string, and empty arrays or objects. Numbers
    /// and booleans are never empty, so `0` and `false` are not.
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Null => true,
            Value::String(s) => s.is_empty(),
            Value::Array(items) => items.is_empty(),
            Value::Object(map) => map.is_empty(),
            _ => false,
        }
    }

    /// Truthiness used by conditionals and `while`-style loops.
    ///
    /// - `null`, `false`, `0`, `0.0` → false
    /// - `""`, `[]`, `{}` → false
    /// - Everything else → true
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::Array(items) => !items.is_empty(),
            Value::Object(map) => !map.is_empty(),
        }
    }

    /// Human-readable type name for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }

    /// Numeric view of the value, if it is a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Render the value as text for interpolation and string concatenation.
    ///
    /// `null` renders as the empty string; compound values render as JSON.
    pub fn as_text(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::String(s) => s.clone(),
            Value::Array(_) | Value::Object(_) => self.to_json().to_string(),
        }
    }

    /// Convert to `serde_json::Value`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::Number((*i).into()),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Array(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Object(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(key, value)| (key.clone(), value.to_json()))
                    .collect(),
            ),
        }
    }

    /// Look up one path segment: an object key or an array index.
    pub fn child(&self, segment: &str) -> Option<&Value> {
        match self {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        }
    }

    /// Mutable variant of [`Value::child`] that creates missing object keys.
    ///
    /// A `null` parent is promoted to an empty object first. Returns `None`
    /// when the parent is a scalar or the array index is out of range.
    pub fn child_mut_or_insert(&mut self, segment: &str) -> Option<&mut Value> {
        if self.is_null() {
            *self = Value::Object(Object::new());
        }
        match self {
            Value::Object(map) => Some(map.entry(segment.to_string()).or_insert(Value::Null)),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get_mut(i)),
            _ => None,
        }
    }
}

/// Parse a string into a scalar if it spells one.
fn scalar_from_str(s: &str) -> Option<Value> {
    match s {
        "true" => return Some(Value::Bool(true)),
        "false" => return Some(Value::Bool(false)),
        "null" => return Some(Value::Null),
        _ => {}
    }

    let digits = s.strip_prefix('-').unwrap_or(s);
    let (whole, fraction) = match digits.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (digits, None),
    };

    let plain_digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
    if !plain_digits(whole) || (whole.len() > 1 && whole.starts_with('0')) {
        return None;
    }

    match fraction {
        None => s.parse::<i64>().ok().map(Value::Int),
        Some(fraction) if plain_digits(fraction) => s.parse::<f64>().ok().map(Value::Float),
        Some(_) => None,
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_text())
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else if let Some(f) = n.as_f64() {
                    Value::Float(f)
                } else {
                    Value::String(n.to_string())
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => Value::Array(items.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(key, value)| (key, Value::from(value)))
                    .collect(),
            ),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
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

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<Object> for Value {
    fn from(map: Object) -> Self {
        Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("42", Value::Int(42))]
    #[case("-7", Value::Int(-7))]
    #[case("0", Value::Int(0))]
    #[case("3.5", Value::Float(3.5))]
    #[case("true", Value::Bool(true))]
    #[case("false", Value::Bool(false))]
    #[case("null", Value::Null)]
    #[case("007", Value::String("007".into()))]
    #[case("1.", Value::String("1.".into()))]
    #[case("1e5", Value::String("1e5".into()))]
    #[case("hello", Value::String("hello".into()))]
    #[case("", Value::String(String::new()))]
    fn normalize_scalars(#[case] input: &str, #[case] expected: Value) {
        assert_eq!(Value::String(input.into()).normalize(), expected);
    }

    #[test]
    fn normalize_recurses_into_compounds() {
        let value = Value::Array(vec![Value::from("1"), Value::from("x")]);
        assert_eq!(
            value.normalize(),
            Value::Array(vec![Value::Int(1), Value::from("x")])
        );
    }

    #[test]
    fn emptiness() {
        assert!(Value::Null.is_empty());
        assert!(Value::from("").is_empty());
        assert!(Value::Array(vec![]).is_empty());
        assert!(Value::Object(Object::new()).is_empty());
        assert!(!Value::Int(0).is_empty());
        assert!(!Value::Bool(false).is_empty());
        assert!(!Value::from(" ").is_empty());
    }

    #[test]
    fn truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(!Value::Array(vec![]).is_truthy());
        assert!(Value::Int(-1).is_truthy());
        assert!(Value::from("x").is_truthy());
    }

    #[test]
    fn json_conversion_keeps_order() {
        let json = serde_json::json!({"b": 1, "a": [true, null, 2.5]});
        let value = Value::from(json.clone());
        match &value {
            Value::Object(map) => {
                let keys: Vec<_> = map.keys().cloned().collect();
                assert_eq!(keys, vec!["b", "a"]);
            }
            other => panic!("expected object, got {other:?}"),
        }
        assert_eq!(value.to_json(), json);
    }

    #[test]
    fn text_rendering() {
        assert_eq!(Value::Null.as_text(), "");
        assert_eq!(Value::Float(7.0).as_text(), "7");
        assert_eq!(Value::Array(vec![Value::Int(1)]).as_text(), "[1]");
    }

    #[test]
    fn child_lookup() {
        let value = Value::from(serde_json::json!({"a": {"b": [10, 20]}}));
        let inner = value.child("a").and_then(|a| a.child("b")).and_then(|b| b.child("1"));
        assert_eq!(inner, Some(&Value::Int(20)));
        assert_eq!(value.child("missing"), None);
    }

    #[test]
    fn child_mut_promotes_null() {
        let mut value = Value::Null;
        if let Some(slot) = value.child_mut_or_insert("key") {
            *slot = Value::Int(1);
        }
        assert_eq!(value.child("key"), Some(&Value::Int(1)));
    }
}
