//! User-facing messages for client failures.

use crate::error::ClientError;
use crate::upload::UploadError;
use chrono::{DateTime, Utc};
use outlay_core::{RequestFailed, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
    Success,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationAction {
    /// Repeat the whole action.
    Retry,
    /// Repeat only the attach step of an upload whose object is stored.
    RetryAttach,
    Dismiss,
}

#[derive(Debug, Clone)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
    pub action: Option<NotificationAction>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(level: NotificationLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            action: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_action(mut self, action: NotificationAction) -> Self {
        self.action = Some(action);
        self
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Success, message)
    }
}

impl From<&ClientError> for Notification {
    fn from(err: &ClientError) -> Self {
        match err {
            ClientError::Validation(e) => validation(e),
            ClientError::Request(e) => request("Request failed", e),
            ClientError::Mutation(e) => request("Could not save changes", &e.source),
            ClientError::Upload(e) => upload(e),
            ClientError::NotFound(id) => {
                Notification::new(NotificationLevel::Warning, format!("Expense {} not found", id))
                    .with_action(NotificationAction::Dismiss)
            }
            other => Notification::new(NotificationLevel::Error, other.to_string())
                .with_action(NotificationAction::Dismiss),
        }
    }
}

fn validation(err: &ValidationError) -> Notification {
    Notification::new(NotificationLevel::Warning, err.to_string())
        .with_action(NotificationAction::Dismiss)
}

fn request(prefix: &str, err: &RequestFailed) -> Notification {
    let detail = err.body().trim();
    let message = if detail.is_empty() {
        prefix.to_string()
    } else {
        format!("{}: {}", prefix, detail)
    };
    Notification::new(NotificationLevel::Error, message).with_action(NotificationAction::Retry)
}

fn upload(err: &UploadError) -> Notification {
    match err {
        UploadError::Validation(e) => validation(e),
        UploadError::Sign { source, .. } => request("Could not prepare the upload", source),
        UploadError::Transfer { source, .. } => request("Receipt upload failed", source),
        UploadError::Attach(orphan) => Notification::new(
            NotificationLevel::Warning,
            format!(
                "Receipt uploaded but could not be attached to expense {}",
                orphan.expense_id
            ),
        )
        .with_action(NotificationAction::RetryAttach),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use outlay_core::OrphanResourceWarning;

    #[test]
    fn test_orphan_offers_retry_attach() {
        let err = ClientError::Upload(UploadError::Attach(OrphanResourceWarning {
            expense_id: 7,
            object_key: "receipts/a.png".to_string(),
            destination: "https://store/a".to_string(),
            source: RequestFailed::status(500, "down"),
        }));
        let note = Notification::from(&err);
        assert_eq!(note.level, NotificationLevel::Warning);
        assert_eq!(note.action, Some(NotificationAction::RetryAttach));
        assert!(note.message.contains("uploaded but could not be attached"));
    }

    #[test]
    fn test_request_failure_includes_body() {
        let err = ClientError::Request(RequestFailed::status(400, "Title is required"));
        let note = Notification::from(&err);
        assert_eq!(note.message, "Request failed: Title is required");
        assert_eq!(note.action, Some(NotificationAction::Retry));
    }

    #[test]
    fn test_validation_is_dismissable() {
        let err = ClientError::Validation(ValidationError::required("title"));
        let note = Notification::from(&err);
        assert_eq!(note.message, "title is required");
        assert_eq!(note.action, Some(NotificationAction::Dismiss));
    }
}
