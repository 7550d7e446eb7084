use glam::Vec2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Dynamically typed property value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Variant {
    #[default]
    Invalid,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Uuid(Uuid),
    Vec2(Vec2),
    Array(Vec<Variant>),
    Dictionary(BTreeMap<String, Variant>),
}

/// Type tag of a [`Variant`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VariantType {
    Invalid,
    Bool,
    Int,
    Float,
    String,
    Uuid,
    Vec2,
    Array,
    Dictionary,
}

impl Variant {
    pub fn variant_type(&self) -> VariantType {
        match self {
            Variant::Invalid => VariantType::Invalid,
            Variant::Bool(_) => VariantType::Bool,
            Variant::Int(_) => VariantType::Int,
            Variant::Float(_) => VariantType::Float,
            Variant::String(_) => VariantType::String,
            Variant::Uuid(_) => VariantType::Uuid,
            Variant::Vec2(_) => VariantType::Vec2,
            Variant::Array(_) => VariantType::Array,
            Variant::Dictionary(_) => VariantType::Dictionary,
        }
    }

    /// Default value for a type tag, e.g. `0` for `Int`, nil for `Uuid`.
    pub fn default_of(variant_type: VariantType) -> Variant {
        match variant_type {
            VariantType::Invalid => Variant::Invalid,
            VariantType::Bool => Variant::Bool(false),
            VariantType::Int => Variant::Int(0),
            VariantType::Float => Variant::Float(0.0),
            VariantType::String => Variant::String(String::new()),
            VariantType::Uuid => Variant::Uuid(Uuid::nil()),
            VariantType::Vec2 => Variant::Vec2(Vec2::ZERO),
            VariantType::Array => Variant::Array(Vec::new()),
            VariantType::Dictionary => Variant::Dictionary(BTreeMap::new()),
        }
    }

    pub fn is_valid(&self) -> bool {
        !matches!(self, Variant::Invalid)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Variant::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// Integer view; floats are truncated.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Variant::Int(value) => Some(*value),
            Variant::Float(value) => Some(*value as i64),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Variant::Float(value) => Some(*value),
            Variant::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Variant::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            Variant::Uuid(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_vec2(&self) -> Option<Vec2> {
        match self {
            Variant::Vec2(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Variant]> {
        match self {
            Variant::Array(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_dictionary(&self) -> Option<&BTreeMap<String, Variant>> {
        match self {
            Variant::Dictionary(values) => Some(values),
            _ => None,
        }
    }

    /// Visit every GUID stored in this value, including nested containers.
    pub fn for_each_uuid_mut(&mut self, f: &mut dyn FnMut(&mut Uuid)) {
        match self {
            Variant::Uuid(value) => f(value),
            Variant::Array(values) => values.iter_mut().for_each(|v| v.for_each_uuid_mut(f)),
            Variant::Dictionary(values) => values.values_mut().for_each(|v| v.for_each_uuid_mut(f)),
            _ => {}
        }
    }
}

impl From<bool> for Variant {
    fn from(value: bool) -> Self {
        Variant::Bool(value)
    }
}

impl From<i64> for Variant {
    fn from(value: i64) -> Self {
        Variant::Int(value)
    }
}

impl From<i32> for Variant {
    fn from(value: i32) -> Self {
        Variant::Int(value as i64)
    }
}

impl From<f64> for Variant {
    fn from(value: f64) -> Self {
        Variant::Float(value)
    }
}

impl From<&str> for Variant {
    fn from(value: &str) -> Self {
        Variant::String(value.to_string())
    }
}

impl From<String> for Variant {
    fn from(value: String) -> Self {
        Variant::String(value)
    }
}

impl From<Uuid> for Variant {
    fn from(value: Uuid) -> Self {
        Variant::Uuid(value)
    }
}

impl From<Vec2> for Variant {
    fn from(value: Vec2) -> Self {
        Variant::Vec2(value)
    }
}

/// Addresses a value inside a property.
///
/// Members take [`PropertyIndex::None`], arrays and sets take a position
/// (or [`PropertyIndex::End`] to append), maps take a string key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PropertyIndex {
    #[default]
    None,
    End,
    Position(usize),
    Key(String),
}

impl PropertyIndex {
    pub fn position(&self) -> Option<usize> {
        match self {
            PropertyIndex::Position(index) => Some(*index),
            _ => None,
        }
    }

    pub fn key(&self) -> Option<&str> {
        match self {
            PropertyIndex::Key(key) => Some(key),
            _ => None,
        }
    }

    /// Resolve [`PropertyIndex::End`] against a container length.
    pub fn resolve_end(&self, count: usize) -> PropertyIndex {
        match self {
            PropertyIndex::End => PropertyIndex::Position(count),
            other => other.clone(),
        }
    }
}

impl From<usize> for PropertyIndex {
    fn from(value: usize) -> Self {
        PropertyIndex::Position(value)
    }
}

impl From<&str> for PropertyIndex {
    fn from(value: &str) -> Self {
        PropertyIndex::Key(value.to_string())
    }
}

impl fmt::Display for PropertyIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyIndex::None => write!(f, "<none>"),
            PropertyIndex::End => write!(f, "<end>"),
            PropertyIndex::Position(index) => write!(f, "{index}"),
            PropertyIndex::Key(key) => write!(f, "'{key}'"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_of_matches_type() {
        for variant_type in [
            VariantType::Bool,
            VariantType::Int,
            VariantType::Float,
            VariantType::String,
            VariantType::Uuid,
            VariantType::Vec2,
            VariantType::Array,
            VariantType::Dictionary,
        ] {
            assert_eq!(Variant::default_of(variant_type).variant_type(), variant_type);
        }
    }

    #[test]
    fn test_serialized_form_is_tagged() {
        let json = serde_json::to_string(&Variant::Int(5)).unwrap();
        assert_eq!(json, r#"{"type":"Int","value":5}"#);
        let back: Variant = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Variant::Int(5));
    }

    #[test]
    fn test_for_each_uuid_reaches_nested_values() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut dict = BTreeMap::new();
        dict.insert("k".to_string(), Variant::Uuid(b));
        let mut value = Variant::Array(vec![Variant::Uuid(a), Variant::Dictionary(dict)]);

        let mut seen = Vec::new();
        value.for_each_uuid_mut(&mut |guid| seen.push(*guid));
        assert_eq!(seen, vec![a, b]);
    }

    #[test]
    fn test_resolve_end() {
        assert_eq!(PropertyIndex::End.resolve_end(3), PropertyIndex::Position(3));
        assert_eq!(PropertyIndex::Position(1).resolve_end(3), PropertyIndex::Position(1));
    }
}
