use serde::{Deserialize, Serialize};

/// An actor attribute as read by group predicates: a flag, a string, or a list of strings such
/// as roles or plans.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    String(String),
    Array(Vec<String>),
}

impl AttributeValue {
    /// Returns None unless self is a String. It will not convert.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns None unless self is a bool. It will not convert.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttributeValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// True if self is the string `needle`, or a list holding it.
    pub fn contains_str(&self, needle: &str) -> bool {
        match self {
            AttributeValue::String(s) => s == needle,
            AttributeValue::Array(values) => values.iter().any(|v| v == needle),
            AttributeValue::Bool(_) => false,
        }
    }
}
