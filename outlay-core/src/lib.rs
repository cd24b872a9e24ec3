//! Outlay Core - Entity Types
//!
//! Pure data structures and collaborator contracts. All other crates depend on this.
//! The cache engine lives in outlay-sync; HTTP implementations live in outlay-client.

pub mod error;
pub mod expense;
pub mod transport;
pub mod upload;

pub use error::{OrphanResourceWarning, RequestFailed, ValidationError};
pub use expense::{
    Expense, ExpenseDetail, ExpenseDraft, ExpenseEnvelope, ExpenseId, ExpenseList, NewExpense,
    ProvisionalIds,
};
pub use transport::{decode_payload, Fetcher, ObjectStore};
pub use upload::{AttachReceipt, SignRequest, SignedDestination};

/// Opaque JSON-like payload exchanged with collaborator endpoints.
pub type Value = serde_json::Value;
