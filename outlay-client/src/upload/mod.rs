//! Receipt uploads.
//!
//! An upload signs a destination with the API, writes the bytes straight to
//! the external object store, then attaches the returned object key to the
//! expense through the mutation coordinator. A failure after the transfer
//! leaves an orphan object, reported as [`UploadError::Attach`]. Orphans are
//! neither cleaned up nor retried automatically.

pub mod protocol;
pub mod session;

pub use protocol::{
    UploadError, UploadProtocol, UploadReceipt, UploadSettings, DEFAULT_CONTENT_TYPE,
    SIGN_RESOURCE,
};
pub use session::{content_type_for, LocalFile, Stage, UploadPhase, UploadSession};
