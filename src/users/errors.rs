//! Failure taxonomy for user operations.
use thiserror::Error;

#[derive(Error, Debug)]
pub enum UserError {
    #[error("User not found")]
    NotFound,

    #[error("{field} {reason}")]
    Validation { field: String, reason: String },

    #[error("No valid fields to update")]
    EmptyUpdate,

    #[error("Password does not meet complexity requirements: {0}")]
    WeakCredential(String),

    #[error("Credential error: {0}")]
    Credential(String),

    #[error("Store error: {0:#}")]
    Store(anyhow::Error),
}

impl UserError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        UserError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Stable machine-readable reason code.
    pub fn code(&self) -> &'static str {
        match self {
            UserError::NotFound => "not_found",
            UserError::Validation { .. } => "validation",
            UserError::EmptyUpdate => "empty_update",
            UserError::WeakCredential(_) => "weak_credential",
            UserError::Credential(_) => "credential",
            UserError::Store(_) => "store",
        }
    }

    /// Message safe to hand to untrusted callers. Store and hashing
    /// internals only go to the log.
    pub fn public_message(&self) -> String {
        match self {
            UserError::Credential(_) => "Password could not be processed".into(),
            UserError::Store(_) => "Internal storage error".into(),
            other => other.to_string(),
        }
    }
}
