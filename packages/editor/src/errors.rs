//! Error types for the editor

use plasma_reflection::AccessorError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DocumentError {
    #[error("Object not found: {0}")]
    ObjectNotFound(Uuid),

    #[error("Parent is not part of the object manager: {0}")]
    ParentNotFound(Uuid),

    #[error("Type not found: {0}")]
    TypeNotFound(String),

    #[error("Property '{property}' could not be found in type '{type_name}'")]
    PropertyNotFound { property: String, type_name: String },

    #[error("Property error: {0}")]
    Property(#[from] AccessorError),

    /// A legality check refused the operation.
    #[error("{0}")]
    NotAllowed(String),

    #[error("Recursion limit exceeded while setting property '{0}'")]
    RecursionLimit(String),

    #[error("Cannot swap storage while events are being broadcast")]
    StorageBusy,

    #[error("The document has no node manager")]
    NotANodeDocument,

    #[error("Object graph error: {0}")]
    Graph(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("{0}")]
    Command(String),
}

impl DocumentError {
    pub fn not_allowed(message: impl Into<String>) -> Self {
        DocumentError::NotAllowed(message.into())
    }
}

// serde_json::Error is neither Clone nor PartialEq, so only its message is kept.
impl From<serde_json::Error> for DocumentError {
    fn from(e: serde_json::Error) -> Self {
        DocumentError::Graph(e.to_string())
    }
}

/// Outcome of a legality check or an operation that returns nothing.
pub type Status = Result<(), DocumentError>;

pub type DocumentResult<T> = Result<T, DocumentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_error_becomes_graph_error() {
        let json_error = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let message = json_error.to_string();
        match DocumentError::from(json_error) {
            DocumentError::Graph(text) => assert_eq!(text, message),
            other => panic!("expected graph error, got {other:?}"),
        }
    }
}
