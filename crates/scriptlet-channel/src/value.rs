//! Channel values and numeric normalization.
//!
//! Values crossing the channel boundary are persisted as JSON, which has no
//! representation for non-finite floats. All normalization happens in one
//! place, [`normalize_number`], using this mapping:
//!
//! | value          | persisted token |
//! |----------------|-----------------|
//! | `+inf`         | `"+Infinity"`   |
//! | `-inf`         | `"-Infinity"`   |
//! | `NaN`          | `"NaN"`         |
//!
//! The mapping is applied recursively through lists and maps whenever a
//! [`Value`] is serialized. [`decode_special`] reverses it.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;

/// Persisted token for positive infinity.
pub const POSITIVE_INFINITY_TOKEN: &str = "+Infinity";

/// Persisted token for negative infinity.
pub const NEGATIVE_INFINITY_TOKEN: &str = "-Infinity";

/// Persisted token for not-a-number.
pub const NAN_TOKEN: &str = "NaN";

/// Reserved sentinel appended to an output that carries "not a value".
pub const NOT_A_VALUE_TOKEN: &str = "not_a_value_7fdc603e";

/// A dynamically typed value exchanged between the channel files and a script.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Absent value.
    #[default]
    Null,
    /// Boolean.
    Bool(bool),
    /// Integer.
    Int(i64),
    /// Float, possibly non-finite.
    Float(f64),
    /// Text.
    Str(String),
    /// Ordered sequence.
    List(Vec<Value>),
    /// String-keyed map.
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Returns the not-a-value sentinel.
    #[must_use]
    pub fn not_a_value() -> Self {
        Self::Str(NOT_A_VALUE_TOKEN.to_string())
    }

    /// Returns `true` if this is the not-a-value sentinel.
    #[must_use]
    pub fn is_not_a_value(&self) -> bool {
        matches!(self, Self::Str(s) if s == NOT_A_VALUE_TOKEN)
    }

    /// Short type name used in diagnostics.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "string",
            Self::List(_) => "list",
            Self::Map(_) => "map",
        }
    }

    /// Converts a JSON value as loaded from a channel file.
    ///
    /// Strings are kept verbatim; special-value tokens are not decoded.
    /// Use [`Value::from_persisted`] for channel value files.
    #[must_use]
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Self::Str(s.clone()),
            serde_json::Value::Array(items) => Self::List(items.iter().map(Self::from_json).collect()),
            serde_json::Value::Object(map) => Self::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), Self::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Converts a persisted JSON value, decoding special-value tokens back
    /// into non-finite floats at every depth.
    #[must_use]
    pub fn from_persisted(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::String(s) => match decode_special(s) {
                Some(f) => Self::Float(f),
                None => Self::Str(s.clone()),
            },
            serde_json::Value::Array(items) => {
                Self::List(items.iter().map(Self::from_persisted).collect())
            }
            serde_json::Value::Object(map) => Self::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), Self::from_persisted(v)))
                    .collect(),
            ),
            other => Self::from_json(other),
        }
    }

    /// Converts to JSON, normalizing non-finite floats at every depth.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Int(i) => serde_json::Value::Number((*i).into()),
            Self::Float(f) => normalize_number(*f),
            Self::Str(s) => serde_json::Value::String(s.clone()),
            Self::List(items) => serde_json::Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Map(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Self::List(value)
    }
}

/// Maps a float to its portable JSON form.
///
/// Finite floats stay numbers; infinities and NaN become the string tokens
/// listed in the module docs.
#[must_use]
pub fn normalize_number(value: f64) -> serde_json::Value {
    if value.is_nan() {
        serde_json::Value::String(NAN_TOKEN.to_string())
    } else if value == f64::INFINITY {
        serde_json::Value::String(POSITIVE_INFINITY_TOKEN.to_string())
    } else if value == f64::NEG_INFINITY {
        serde_json::Value::String(NEGATIVE_INFINITY_TOKEN.to_string())
    } else {
        serde_json::Number::from_f64(value)
            .map_or(serde_json::Value::Null, serde_json::Value::Number)
    }
}

/// Decodes a special-value token.
///
/// Accepts `+Infinity`, `Infinity`, `-Infinity` and `NaN`, ignoring case.
#[must_use]
pub fn decode_special(token: &str) -> Option<f64> {
    if token.eq_ignore_ascii_case(POSITIVE_INFINITY_TOKEN) || token.eq_ignore_ascii_case("Infinity")
    {
        Some(f64::INFINITY)
    } else if token.eq_ignore_ascii_case(NEGATIVE_INFINITY_TOKEN) {
        Some(f64::NEG_INFINITY)
    } else if token.eq_ignore_ascii_case(NAN_TOKEN) {
        Some(f64::NAN)
    } else {
        None
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let json = serde_json::Value::deserialize(deserializer)?;
        Ok(Self::from_json(&json))
    }
}
