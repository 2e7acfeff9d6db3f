//! Store Values
//!
//! [`Value`] is the single type that store nodes hold. Leaves are plain data
//! compared by value. [`Value::Node`] links to a nested [`StoreNode`] and is
//! compared by identity, so replacing a subtree with an equal-looking one
//! still counts as a change. [`Value::Opaque`] wraps arbitrary host data the
//! store treats as an atomic leaf.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use serde::{Serialize, Serializer};

use super::node::StoreNode;

/// A value stored in a [`StoreNode`].
#[derive(Clone)]
pub enum Value {
    /// Absence of a value.
    Null,
    /// A boolean leaf.
    Bool(bool),
    /// An integer leaf.
    Int(i64),
    /// A floating-point leaf.
    Float(f64),
    /// A string leaf. Cheap to clone.
    Str(Arc<str>),
    /// A nested node. Compared by identity, never by content.
    Node(StoreNode),
    /// Host data the store does not look inside. Compared by identity.
    Opaque(Arc<dyn Any + Send + Sync>),
}

impl Value {
    /// Wrap arbitrary host data as an opaque leaf.
    ///
    /// The store never traverses into opaque values; writes replace them
    /// wholesale and equality is pointer identity.
    pub fn opaque<T: Any + Send + Sync>(value: T) -> Self {
        Value::Opaque(Arc::new(value))
    }

    /// Downcast an opaque leaf back to its concrete type.
    pub fn as_opaque<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        match self {
            Value::Opaque(any) => Arc::clone(any).downcast::<T>().ok(),
            _ => None,
        }
    }

    /// Get the boolean value, if this is a boolean leaf.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get the integer value, if this is an integer leaf.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Get the float value, if this is a float leaf.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Get the string value, if this is a string leaf.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Get the nested node, if this value is one.
    pub fn as_node(&self) -> Option<&StoreNode> {
        match self {
            Value::Node(node) => Some(node),
            _ => None,
        }
    }

    /// Check whether this value is a nested node.
    pub fn is_node(&self) -> bool {
        matches!(self, Value::Node(_))
    }

    /// Check whether this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// A short name for the value's kind, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Node(_) => "node",
            Value::Opaque(_) => "opaque",
        }
    }

    /// Build a value tree from JSON.
    ///
    /// Objects and arrays become nested [`StoreNode`]s. JSON numbers map to
    /// [`Value::Int`] when they fit in an `i64`, otherwise [`Value::Float`].
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::Str(s.into()),
            serde_json::Value::Array(items) => {
                let node = StoreNode::list();
                for item in items {
                    node.push_untracked(Value::from_json(item));
                }
                Value::Node(node)
            }
            serde_json::Value::Object(entries) => {
                let node = StoreNode::object();
                for (key, item) in entries {
                    node.set_untracked(&key, Value::from_json(item));
                }
                Value::Node(node)
            }
        }
    }

    /// Convert this value tree to JSON.
    ///
    /// Opaque leaves serialize as `null`; so do floats JSON cannot
    /// represent (NaN, infinities).
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::Number((*i).into()),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Str(s) => serde_json::Value::String(s.to_string()),
            Value::Node(node) => node.to_json(),
            Value::Opaque(_) => serde_json::Value::Null,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            // Nodes and opaques compare by identity, not content.
            (Value::Node(a), Value::Node(b)) => a.id() == b.id(),
            (Value::Opaque(a), Value::Opaque(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int(i) => write!(f, "Int({i})"),
            Value::Float(x) => write!(f, "Float({x})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::Node(node) => write!(f, "Node({:?})", node.id()),
            Value::Opaque(_) => write!(f, "Opaque(..)"),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
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
        Value::Str(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s.into())
    }
}

impl From<Arc<str>> for Value {
    fn from(s: Arc<str>) -> Self {
        Value::Str(s)
    }
}

impl From<StoreNode> for Value {
    fn from(node: StoreNode) -> Self {
        Value::Node(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaves_compare_by_value() {
        assert_eq!(Value::from(1), Value::from(1));
        assert_eq!(Value::from("a"), Value::from("a"));
        assert_ne!(Value::from(1), Value::from(2));
        assert_ne!(Value::from(1), Value::from(1.0));
    }

    #[test]
    fn nodes_compare_by_identity() {
        let a = StoreNode::object();
        let b = StoreNode::object();

        // Structurally identical but distinct nodes.
        assert_ne!(Value::Node(a.clone()), Value::Node(b));
        assert_eq!(Value::Node(a.clone()), Value::Node(a));
    }

    #[test]
    fn opaques_compare_by_identity() {
        let a = Value::opaque(vec![1, 2, 3]);
        let b = Value::opaque(vec![1, 2, 3]);

        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn opaque_downcast() {
        let value = Value::opaque(String::from("payload"));

        let payload = value.as_opaque::<String>().unwrap();
        assert_eq!(payload.as_str(), "payload");

        assert!(value.as_opaque::<i64>().is_none());
    }

    #[test]
    fn json_round_trip() {
        let json: serde_json::Value = serde_json::from_str(
            r#"{"name": "weft", "count": 3, "ratio": 0.5, "tags": ["a", "b"], "none": null}"#,
        )
        .unwrap();

        let value = Value::from_json(json.clone());
        assert_eq!(value.to_json(), json);
    }

    #[test]
    fn json_numbers_prefer_int() {
        let value = Value::from_json(serde_json::json!(42));
        assert_eq!(value, Value::Int(42));

        let value = Value::from_json(serde_json::json!(42.5));
        assert_eq!(value, Value::Float(42.5));
    }
}
