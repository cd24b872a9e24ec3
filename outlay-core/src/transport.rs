//! Collaborator contracts for the network boundary.
//!
//! Every `await` on one of these traits is a suspension point: other reads
//! and mutations may interleave while the call is in flight.

use crate::error::RequestFailed;
use crate::Value;
use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;

/// JSON API access used by the read path and by mutations.
///
/// `resource` is a path relative to the API base (e.g. `/expenses/7`).
/// Implementations must map every non-success response to [`RequestFailed`].
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn get(&self, resource: &str) -> Result<Value, RequestFailed>;

    async fn post(&self, resource: &str, body: &Value) -> Result<Value, RequestFailed>;

    async fn patch(&self, resource: &str, body: &Value) -> Result<Value, RequestFailed>;

    /// `body` may be `Value::Null` for a bodiless delete.
    async fn delete(&self, resource: &str, body: &Value) -> Result<Value, RequestFailed>;
}

/// Raw byte upload to a signed, single-use destination in an external store.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put_object(
        &self,
        destination: &str,
        content_type: &str,
        body: Bytes,
    ) -> Result<(), RequestFailed>;
}

/// Decode a collaborator payload, reporting shape mismatches as malformed responses.
pub fn decode_payload<T: DeserializeOwned>(value: Value) -> Result<T, RequestFailed> {
    serde_json::from_value(value).map_err(|e| RequestFailed::malformed(e.to_string()))
}
