//! Wire payloads for the receipt upload endpoints.

use crate::error::RequestFailed;
use serde::{Deserialize, Serialize};

/// Body of `POST /upload/sign`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignRequest {
    pub filename: String,
    pub content_type: String,
}

/// Signed destination returned by the signing endpoint.
///
/// `upload_url` is single-use and time-bounded; `key` is the stable handle the
/// server recognizes when the receipt is attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedDestination {
    #[serde(default)]
    pub upload_url: String,
    #[serde(default)]
    pub key: String,
}

impl SignedDestination {
    /// Reject responses with a missing or empty field.
    pub fn ensure_complete(self) -> Result<Self, RequestFailed> {
        if self.upload_url.trim().is_empty() {
            return Err(RequestFailed::malformed("signing response has no uploadUrl"));
        }
        if self.key.trim().is_empty() {
            return Err(RequestFailed::malformed("signing response has no key"));
        }
        Ok(self)
    }
}

/// Body of `PATCH /expenses/{id}` when attaching a receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachReceipt {
    pub file_reference: String,
}
