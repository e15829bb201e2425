//! Error types for collaborator calls.

use thiserror::Error;

/// Errors reported by a [`FieldService`](super::FieldService) implementation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ServiceError {
    /// Transport failure or unreachable backend
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Backend understood the request but refused it
    #[error("{operation} rejected: {message}")]
    Rejected {
        /// Name of the rejected operation
        operation: String,
        /// Reason given by the backend
        message: String,
    },

    /// Requested directory or image does not exist
    #[error("Not found: {0}")]
    NotFound(String),
}

impl ServiceError {
    /// Create a rejection error.
    pub fn rejected(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Rejected {
            operation: operation.into(),
            message: message.into(),
        }
    }
}
