//! Template values.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// A fully resolved value a template can print or branch on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    String(String),
    List(Vec<Value>),
    /// A nested context: its fields shadow the enclosing scope inside a
    /// block that iterates over it.
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Whether a block over this value renders at all.
    ///
    /// `null`, `false`, `""`, `[]` and `{}` skip the block.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::String(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Map(fields) => !fields.is_empty(),
        }
    }

    /// Field of a map value.
    pub fn field(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(fields) => fields.get(key),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(fields) => Some(fields),
            _ => None,
        }
    }

    /// The elements a block iterates over: a list's items, or the value
    /// itself once.
    pub fn elements(&self) -> &[Value] {
        match self {
            Value::List(items) => items,
            other => std::slice::from_ref(other),
        }
    }
}

/// The printed form: strings as-is, `true` as `"true"`, lists concatenated,
/// everything else empty.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => f.write_str(s),
            Value::Bool(true) => f.write_str("true"),
            Value::List(items) => items.iter().try_for_each(|item| write!(f, "{item}")),
            Value::Bool(false) | Value::Null | Value::Map(_) => Ok(()),
        }
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

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Value::String(s.clone())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

macro_rules! from_number {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Value {
            fn from(n: $ty) -> Self {
                Value::String(n.to_string())
            }
        })*
    };
}

from_number!(i32, i64, u32, u64, usize, f64);

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

impl<T: Into<Value>> From<BTreeMap<String, T>> for Value {
    fn from(fields: BTreeMap<String, T>) -> Self {
        fields.into_iter().collect()
    }
}

impl<T: Into<Value>> From<HashMap<String, T>> for Value {
    fn from(fields: HashMap<String, T>) -> Self {
        fields.into_iter().collect()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Value {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Value::Map(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::String(n.to_string()),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => items.into(),
            serde_json::Value::Object(fields) => fields.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn printed_forms() {
        assert_eq!(Value::from("x").to_string(), "x");
        assert_eq!(Value::from(true).to_string(), "true");
        assert_eq!(Value::from(false).to_string(), "");
        assert_eq!(Value::Null.to_string(), "");
        assert_eq!(Value::from(vec!["a", "b"]).to_string(), "ab");
        assert_eq!(Value::from_iter([("k", "v")]).to_string(), "");
    }

    #[test]
    fn truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(!Value::from(Vec::<String>::new()).is_truthy());
        assert!(!Value::Map(BTreeMap::new()).is_truthy());
        assert!(Value::from("0").is_truthy());
        assert!(Value::from_iter([("k", false)]).is_truthy());
    }

    #[test]
    fn scalars_iterate_once() {
        assert_eq!(Value::from("x").elements(), &[Value::from("x")]);
        assert_eq!(Value::from(vec![1, 2]).elements().len(), 2);
    }

    #[test]
    fn converts_json() {
        let value = Value::from(json!({
            "title": "Post",
            "count": 3,
            "draft": false,
            "tags": ["a", "b"],
            "author": null,
        }));
        assert_eq!(value.field("title"), Some(&Value::from("Post")));
        assert_eq!(value.field("count"), Some(&Value::from("3")));
        assert_eq!(value.field("draft"), Some(&Value::Bool(false)));
        assert_eq!(value.field("tags"), Some(&Value::from(vec!["a", "b"])));
        assert_eq!(value.field("author"), Some(&Value::Null));
    }
}
