//! Error types for Outlay operations

use crate::ExpenseId;
use thiserror::Error;

/// Local, pre-flight validation errors. These never reach the network.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field} is required")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

impl ValidationError {
    pub fn required(field: impl Into<String>) -> Self {
        Self::RequiredFieldMissing {
            field: field.into(),
        }
    }

    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Uniform failure reported by every remote collaborator.
///
/// A transport error, a non-success status and an undecodable body are all
/// failures of the same request; callers treat them identically.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RequestFailed {
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Transport error: {reason}")]
    Transport { reason: String },

    #[error("Malformed response: {reason}")]
    MalformedResponse { reason: String },
}

impl RequestFailed {
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self::Status {
            status,
            body: body.into(),
        }
    }

    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }

    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedResponse {
            reason: reason.into(),
        }
    }

    /// HTTP status of the failed response, if one was received.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Response body (or failure reason) suitable for a user-facing message.
    pub fn body(&self) -> &str {
        match self {
            Self::Status { body, .. } => body,
            Self::Transport { reason } | Self::MalformedResponse { reason } => reason,
        }
    }
}

/// An uploaded object exists in the external store but is not linked to its expense.
///
/// Raised only when the attach phase of an upload fails. Carries everything a
/// caller needs to report the orphan or retry the attach step alone.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Receipt {object_key} was uploaded but could not be attached to expense {expense_id}: {source}")]
pub struct OrphanResourceWarning {
    pub expense_id: ExpenseId,
    pub object_key: String,
    pub destination: String,
    #[source]
    pub source: RequestFailed,
}

// =============================================================================
// TESTS
// =============================================================================
