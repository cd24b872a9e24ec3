//! Outlay Test Utilities
//!
//! Centralized test infrastructure for the Outlay workspace:
//! - Mock collaborators (`MockFetcher`, `MockObjectStore`)
//! - Gates for holding a remote call open at a chosen point
//! - Fixtures for common payloads
//! - Proptest generators for expenses

pub use outlay_core::{
    Expense, ExpenseDetail, ExpenseEnvelope, ExpenseId, ExpenseList, Fetcher, ObjectStore,
    RequestFailed, SignedDestination, Value,
};

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// GATES
// ============================================================================

/// Test-side half of a gate: observe that the call started, then let it finish.
#[derive(Debug)]
pub struct GateHandle {
    started: oneshot::Receiver<()>,
    release: oneshot::Sender<()>,
}

impl GateHandle {
    /// Wait until the gated call has reached its suspension point.
    pub async fn started(&mut self) {
        let _ = (&mut self.started).await;
    }

    /// Let the gated call complete.
    pub fn release(self) {
        let _ = self.release.send(());
    }
}

/// Call-side half of a gate.
#[derive(Debug)]
pub struct GatedCall {
    started: oneshot::Sender<()>,
    release: oneshot::Receiver<()>,
}

impl GatedCall {
    /// Signal that the call started, then suspend until released.
    ///
    /// Returns immediately if the handle was dropped.
    pub async fn wait(self) {
        let _ = self.started.send(());
        let _ = self.release.await;
    }
}

/// Create a connected gate pair.
pub fn gate() -> (GateHandle, GatedCall) {
    let (started_tx, started_rx) = oneshot::channel();
    let (release_tx, release_rx) = oneshot::channel();
    (
        GateHandle {
            started: started_rx,
            release: release_tx,
        },
        GatedCall {
            started: started_tx,
            release: release_rx,
        },
    )
}

// ============================================================================
// MOCK FETCHER
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Patch,
    Delete,
}

/// One call observed by [`MockFetcher`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub method: Method,
    pub resource: String,
    pub body: Value,
}

#[derive(Debug)]
struct Scripted {
    result: Result<Value, RequestFailed>,
    gate: Option<GatedCall>,
}

/// Scripted in-memory [`Fetcher`].
///
/// Responses are queued per method and resource. Each call consumes the
/// front response; the last ungated response repeats for further calls.
/// Unscripted calls fail with a 404.
#[derive(Debug, Default)]
pub struct MockFetcher {
    scripts: Mutex<HashMap<(Method, String), VecDeque<Scripted>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(
        self,
        method: Method,
        resource: impl Into<String>,
        result: Result<Value, RequestFailed>,
    ) -> Self {
        self.push(method, resource.into(), result, None);
        self
    }

    pub fn with_get(self, resource: impl Into<String>, value: Value) -> Self {
        self.with_response(Method::Get, resource, Ok(value))
    }

    pub fn with_get_error(self, resource: impl Into<String>, err: RequestFailed) -> Self {
        self.with_response(Method::Get, resource, Err(err))
    }

    pub fn with_post(self, resource: impl Into<String>, value: Value) -> Self {
        self.with_response(Method::Post, resource, Ok(value))
    }

    pub fn with_post_error(self, resource: impl Into<String>, err: RequestFailed) -> Self {
        self.with_response(Method::Post, resource, Err(err))
    }

    pub fn with_patch(self, resource: impl Into<String>, value: Value) -> Self {
        self.with_response(Method::Patch, resource, Ok(value))
    }

    pub fn with_patch_error(self, resource: impl Into<String>, err: RequestFailed) -> Self {
        self.with_response(Method::Patch, resource, Err(err))
    }

    pub fn with_delete(self, resource: impl Into<String>, value: Value) -> Self {
        self.with_response(Method::Delete, resource, Ok(value))
    }

    pub fn with_delete_error(self, resource: impl Into<String>, err: RequestFailed) -> Self {
        self.with_response(Method::Delete, resource, Err(err))
    }

    /// Queue a response that is held until the returned handle releases it.
    pub fn push_gated(
        &self,
        method: Method,
        resource: impl Into<String>,
        result: Result<Value, RequestFailed>,
    ) -> GateHandle {
        let (handle, call) = gate();
        self.push(method, resource.into(), result, Some(call));
        handle
    }

    /// Queue a response on an already shared fetcher.
    pub fn push_response(
        &self,
        method: Method,
        resource: impl Into<String>,
        result: Result<Value, RequestFailed>,
    ) {
        self.push(method, resource.into(), result, None);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        lock(&self.calls).clone()
    }

    pub fn calls_to(&self, method: Method, resource: &str) -> Vec<RecordedCall> {
        lock(&self.calls)
            .iter()
            .filter(|c| c.method == method && c.resource == resource)
            .cloned()
            .collect()
    }

    pub fn get_count(&self, resource: &str) -> usize {
        self.calls_to(Method::Get, resource).len()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    fn push(
        &self,
        method: Method,
        resource: String,
        result: Result<Value, RequestFailed>,
        gate: Option<GatedCall>,
    ) {
        lock(&self.scripts)
            .entry((method, resource))
            .or_default()
            .push_back(Scripted { result, gate });
    }

    async fn respond(
        &self,
        method: Method,
        resource: &str,
        body: &Value,
    ) -> Result<Value, RequestFailed> {
        lock(&self.calls).push(RecordedCall {
            method,
            resource: resource.to_string(),
            body: body.clone(),
        });

        let next = {
            let mut scripts = lock(&self.scripts);
            match scripts.get_mut(&(method, resource.to_string())) {
                Some(queue)
                    if queue.len() > 1 || queue.front().is_some_and(|s| s.gate.is_some()) =>
                {
                    queue.pop_front().map(|s| (s.result, s.gate))
                }
                Some(queue) => queue.front().map(|s| (s.result.clone(), None)),
                None => None,
            }
        };

        match next {
            Some((result, gate)) => {
                if let Some(gate) = gate {
                    gate.wait().await;
                }
                result
            }
            None => Err(RequestFailed::status(
                404,
                format!("no scripted response for {:?} {}", method, resource),
            )),
        }
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn get(&self, resource: &str) -> Result<Value, RequestFailed> {
        self.respond(Method::Get, resource, &Value::Null).await
    }

    async fn post(&self, resource: &str, body: &Value) -> Result<Value, RequestFailed> {
        self.respond(Method::Post, resource, body).await
    }

    async fn patch(&self, resource: &str, body: &Value) -> Result<Value, RequestFailed> {
        self.respond(Method::Patch, resource, body).await
    }

    async fn delete(&self, resource: &str, body: &Value) -> Result<Value, RequestFailed> {
        self.respond(Method::Delete, resource, body).await
    }
}

// ============================================================================
// MOCK OBJECT STORE
// ============================================================================

/// One upload observed by [`MockObjectStore`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedPut {
    pub destination: String,
    pub content_type: String,
    pub body: Bytes,
}

/// In-memory [`ObjectStore`] that records every put.
///
/// A failing store still records the attempt: the bytes may have partially
/// reached the destination.
#[derive(Debug, Default)]
pub struct MockObjectStore {
    puts: Mutex<Vec<RecordedPut>>,
    failure: Option<RequestFailed>,
}

impl MockObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(err: RequestFailed) -> Self {
        Self {
            puts: Mutex::new(Vec::new()),
            failure: Some(err),
        }
    }

    pub fn puts(&self) -> Vec<RecordedPut> {
        lock(&self.puts).clone()
    }

    pub fn put_count(&self) -> usize {
        lock(&self.puts).len()
    }
}

#[async_trait]
impl ObjectStore for MockObjectStore {
    async fn put_object(
        &self,
        destination: &str,
        content_type: &str,
        body: Bytes,
    ) -> Result<(), RequestFailed> {
        lock(&self.puts).push(RecordedPut {
            destination: destination.to_string(),
            content_type: content_type.to_string(),
            body,
        });
        match &self.failure {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub fn expense(id: ExpenseId, title: &str, amount: f64) -> Expense {
    Expense {
        id,
        title: title.to_string(),
        amount,
        file_reference: None,
    }
}

/// Body of `GET /expenses` for the given expenses.
pub fn expense_list_value(expenses: &[Expense]) -> Value {
    json!({ "expenses": expenses })
}

/// Body of `GET /expenses` with generated titles for each id.
pub fn expense_list_of(ids: &[ExpenseId]) -> Value {
    let expenses: Vec<Expense> = ids
        .iter()
        .map(|id| expense(*id, &format!("Expense {}", id), 10.0))
        .collect();
    expense_list_value(&expenses)
}

/// Body of `GET /expenses` as the server sends it: legacy `fileUrl: null`
/// plus fields the client does not model.
pub fn server_expense_list_of(ids: &[ExpenseId]) -> Value {
    let rows: Vec<Value> = ids
        .iter()
        .map(|id| {
            json!({
                "id": id,
                "title": format!("Expense {}", id),
                "amount": 10.0,
                "fileUrl": null,
                "userId": "user-1",
                "createdAt": "2026-01-05T10:00:00Z"
            })
        })
        .collect();
    json!({ "expenses": rows })
}

/// Body of `GET /expenses/{id}`.
pub fn expense_detail_value(expense: Option<&Expense>) -> Value {
    json!({ "expense": expense })
}

/// Body returned by create and patch endpoints.
pub fn expense_envelope_value(expense: &Expense) -> Value {
    json!({ "expense": expense })
}

/// Body returned by the signing endpoint.
pub fn sign_response(upload_url: &str, key: &str) -> Value {
    json!({ "uploadUrl": upload_url, "key": key })
}

// ============================================================================
// GENERATORS
// ============================================================================

pub mod strategies {
    use super::*;
    use proptest::prelude::*;

    pub fn arb_expense_id() -> impl Strategy<Value = ExpenseId> {
        1i64..100_000
    }

    pub fn arb_title() -> impl Strategy<Value = String> {
        "[A-Za-z][A-Za-z ]{0,23}"
    }

    pub fn arb_amount() -> impl Strategy<Value = f64> {
        (1u32..1_000_000).prop_map(|cents| f64::from(cents) / 100.0)
    }

    pub fn arb_expense() -> impl Strategy<Value = Expense> {
        (arb_expense_id(), arb_title(), arb_amount()).prop_map(|(id, title, amount)| Expense {
            id,
            title,
            amount,
            file_reference: None,
        })
    }

    /// Distinct, sorted server ids.
    pub fn arb_id_list() -> impl Strategy<Value = Vec<ExpenseId>> {
        prop::collection::btree_set(arb_expense_id(), 1..12)
            .prop_map(|ids| ids.into_iter().collect())
    }
}
