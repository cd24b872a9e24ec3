//! Per-receipt upload state.

use bytes::Bytes;
use outlay_core::{ExpenseId, SignedDestination};
use std::fmt;
use std::path::Path;
use tracing::info;

/// Phase of the upload that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Sign,
    Transfer,
    Attach,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sign => "sign",
            Self::Transfer => "transfer",
            Self::Attach => "attach",
        })
    }
}

/// Upload lifecycle. Phases run strictly in order; `Failed` is reachable
/// from every non-terminal phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadPhase {
    Signing,
    Transferring,
    Attaching,
    Done,
    Failed { stage: Stage, reason: String },
}

impl UploadPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed { .. })
    }

    pub fn can_transition_to(&self, next: &UploadPhase) -> bool {
        match (self, next) {
            (Self::Signing, Self::Transferring)
            | (Self::Transferring, Self::Attaching)
            | (Self::Attaching, Self::Done) => true,
            (from, Self::Failed { .. }) => !from.is_terminal(),
            _ => false,
        }
    }

    /// Stage a failure in this phase is attributed to.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Signing => Some(Stage::Sign),
            Self::Transferring => Some(Stage::Transfer),
            Self::Attaching => Some(Stage::Attach),
            Self::Done => None,
            Self::Failed { stage, .. } => Some(*stage),
        }
    }
}

/// A receipt file read into memory.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalFile {
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

impl LocalFile {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        let filename = filename.into();
        let content_type = content_type_for(&filename).map(str::to_string);
        Self {
            filename,
            content_type,
            bytes: bytes.into(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Read `path` and infer the content type from its extension.
    pub async fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::new(filename, bytes))
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Content type for common receipt formats.
pub fn content_type_for(filename: &str) -> Option<&'static str> {
    let (_, ext) = filename.rsplit_once('.')?;
    let content_type = match ext.to_ascii_lowercase().as_str() {
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "heic" => "image/heic",
        "txt" => "text/plain",
        _ => return None,
    };
    Some(content_type)
}

/// One receipt upload for one expense. Owned by the caller that started it.
#[derive(Debug)]
pub struct UploadSession {
    expense_id: ExpenseId,
    file: LocalFile,
    content_type: String,
    phase: UploadPhase,
    destination: Option<SignedDestination>,
    history: Vec<UploadPhase>,
}

impl UploadSession {
    pub(crate) fn new(expense_id: ExpenseId, file: LocalFile, content_type: String) -> Self {
        Self {
            expense_id,
            file,
            content_type,
            phase: UploadPhase::Signing,
            destination: None,
            history: vec![UploadPhase::Signing],
        }
    }

    pub fn expense_id(&self) -> ExpenseId {
        self.expense_id
    }

    pub fn filename(&self) -> &str {
        &self.file.filename
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn phase(&self) -> &UploadPhase {
        &self.phase
    }

    /// Every phase entered so far, in order.
    pub fn history(&self) -> &[UploadPhase] {
        &self.history
    }

    /// Object key issued by the signing endpoint, once signed.
    pub fn object_key(&self) -> Option<&str> {
        self.destination.as_ref().map(|d| d.key.as_str())
    }

    /// Signed write URL, once signed.
    pub fn destination(&self) -> Option<&str> {
        self.destination.as_ref().map(|d| d.upload_url.as_str())
    }

    pub(crate) fn body(&self) -> Bytes {
        self.file.bytes.clone()
    }

    pub(crate) fn signed(&mut self, destination: SignedDestination) {
        self.destination = Some(destination);
        self.enter(UploadPhase::Transferring);
    }

    pub(crate) fn transferred(&mut self) {
        self.enter(UploadPhase::Attaching);
    }

    pub(crate) fn attached(&mut self) {
        self.enter(UploadPhase::Done);
    }

    pub(crate) fn fail(&mut self, reason: impl Into<String>) {
        if let Some(stage) = self.phase.stage() {
            self.enter(UploadPhase::Failed {
                stage,
                reason: reason.into(),
            });
        }
    }

    fn enter(&mut self, next: UploadPhase) {
        debug_assert!(self.phase.can_transition_to(&next), "{:?} -> {:?}", self.phase, next);
        info!(expense_id = self.expense_id, from = ?self.phase, to = ?next, "Upload phase");
        self.history.push(next.clone());
        self.phase = next;
    }
}
