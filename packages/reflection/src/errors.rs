use crate::{PropertyIndex, VariantType};
use thiserror::Error;

/// Errors reported by a [`crate::TypeAccessor`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AccessorError {
    #[error("The property '{property}' does not exist on type '{type_name}'")]
    UnknownProperty { property: String, type_name: String },

    #[error("Index {index} is not valid for property '{property}'")]
    InvalidIndex { property: String, index: PropertyIndex },

    #[error("Property '{property}' expects a {expected:?} value but got {actual:?}")]
    TypeMismatch {
        property: String,
        expected: VariantType,
        actual: VariantType,
    },

    #[error("Key {key} already exists in map property '{property}'")]
    DuplicateKey { property: String, key: String },

    #[error("Value is already part of set property '{property}'")]
    DuplicateValue { property: String },

    #[error("Property '{0}' is not a container")]
    NotAContainer(String),
}

pub type AccessorResult<T> = Result<T, AccessorError>;
