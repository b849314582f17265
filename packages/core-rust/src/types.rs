use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Scalar value transportable in a completion result.
///
/// Completion events are restricted to flat maps of these; anything richer
/// must be flattened by whoever reports the completion (e.g. a list encoded
/// as a JSON string).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Primitive {
    /// JSON null.
    Null,
    /// JSON boolean.
    Bool(bool),
    /// Signed 64-bit integer.
    Int(i64),
    /// 64-bit IEEE 754 float.
    Float(f64),
    /// UTF-8 string.
    String(String),
}

impl Primitive {
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<bool> for Primitive {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Primitive {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Primitive {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for Primitive {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Primitive {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Primitive {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

/// Flat key/value result of a completed operation.
/// `BTreeMap` keeps serialization order deterministic.
pub type ResultMap = BTreeMap<String, Primitive>;

/// Builds a `ResultMap` from `(key, value)` pairs.
pub fn result_map<K, V, I>(pairs: I) -> ResultMap
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Primitive>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untagged_json_shape() {
        let map = result_map([("ok", Primitive::Bool(true)), ("n", Primitive::Int(3))]);
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"n":3,"ok":true}"#);

        let back: ResultMap = serde_json::from_str(r#"{"s":"x","z":null,"f":1.5}"#).unwrap();
        assert_eq!(back["s"], Primitive::String("x".into()));
        assert_eq!(back["z"], Primitive::Null);
        assert_eq!(back["f"], Primitive::Float(1.5));
    }

    #[test]
    fn accessors_match_variant() {
        assert_eq!(Primitive::from("a").as_str(), Some("a"));
        assert_eq!(Primitive::from(5_i64).as_i64(), Some(5));
        assert_eq!(Primitive::from(true).as_bool(), Some(true));
        assert_eq!(Primitive::Null.as_str(), None);
    }
}
