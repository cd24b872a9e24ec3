//! Three-phase receipt upload: sign, transfer, attach.

use super::session::{LocalFile, Stage, UploadSession};
use crate::expenses::{detail_key, detail_resource, list_key, set_file_reference};
use outlay_core::{
    decode_payload, AttachReceipt, Expense, ExpenseEnvelope, ExpenseId, Fetcher, ObjectStore,
    OrphanResourceWarning, RequestFailed, SignRequest, SignedDestination, ValidationError, Value,
};
use outlay_sync::MutationCoordinator;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

pub const SIGN_RESOURCE: &str = "/upload/sign";
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Local limits applied before any network call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSettings {
    pub default_content_type: String,
    pub max_file_bytes: u64,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            default_content_type: DEFAULT_CONTENT_TYPE.to_string(),
            max_file_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Why an upload stopped, tagged by phase.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum UploadError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Could not sign upload of {filename}: {source}")]
    Sign {
        filename: String,
        #[source]
        source: RequestFailed,
    },

    /// The destination may now hold an empty or partial object.
    #[error("Upload of {object_key} failed: {source}")]
    Transfer {
        object_key: String,
        destination: String,
        #[source]
        source: RequestFailed,
    },

    #[error(transparent)]
    Attach(#[from] OrphanResourceWarning),
}

impl UploadError {
    /// Phase that failed; `None` for local validation.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Validation(_) => None,
            Self::Sign { .. } => Some(Stage::Sign),
            Self::Transfer { .. } => Some(Stage::Transfer),
            Self::Attach(_) => Some(Stage::Attach),
        }
    }

    pub fn object_key(&self) -> Option<&str> {
        match self {
            Self::Transfer { object_key, .. } => Some(object_key),
            Self::Attach(orphan) => Some(&orphan.object_key),
            _ => None,
        }
    }

    pub fn destination(&self) -> Option<&str> {
        match self {
            Self::Transfer { destination, .. } => Some(destination),
            Self::Attach(orphan) => Some(&orphan.destination),
            _ => None,
        }
    }

    /// True when the object was stored but is linked to nothing.
    pub fn is_orphan(&self) -> bool {
        matches!(self, Self::Attach(_))
    }

    pub fn request_failed(&self) -> Option<&RequestFailed> {
        match self {
            Self::Validation(_) => None,
            Self::Sign { source, .. } | Self::Transfer { source, .. } => Some(source),
            Self::Attach(orphan) => Some(&orphan.source),
        }
    }
}

/// A receipt that is stored and attached.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadReceipt {
    pub expense_id: ExpenseId,
    pub object_key: String,
    /// Updated expense, when the patch endpoint returned one.
    pub expense: Option<Expense>,
}

/// Drives [`UploadSession`]s through their phases.
#[derive(Clone)]
pub struct UploadProtocol {
    fetcher: Arc<dyn Fetcher>,
    store: Arc<dyn ObjectStore>,
    coordinator: MutationCoordinator,
    settings: UploadSettings,
}

impl UploadProtocol {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        store: Arc<dyn ObjectStore>,
        coordinator: MutationCoordinator,
        settings: UploadSettings,
    ) -> Self {
        Self {
            fetcher,
            store,
            coordinator,
            settings,
        }
    }

    pub fn settings(&self) -> &UploadSettings {
        &self.settings
    }

    /// Validate `file` and open a session in the Signing phase.
    pub fn start(
        &self,
        expense_id: ExpenseId,
        file: Option<LocalFile>,
    ) -> Result<UploadSession, UploadError> {
        let file = file.ok_or_else(|| ValidationError::required("file"))?;
        if file.filename.trim().is_empty() {
            return Err(ValidationError::required("file").into());
        }
        if file.len() as u64 > self.settings.max_file_bytes {
            return Err(ValidationError::invalid(
                "file",
                format!("exceeds {} bytes", self.settings.max_file_bytes),
            )
            .into());
        }
        let content_type = file
            .content_type
            .clone()
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| self.settings.default_content_type.clone());
        Ok(UploadSession::new(expense_id, file, content_type))
    }

    /// Validate and run a whole upload.
    pub async fn upload(
        &self,
        expense_id: ExpenseId,
        file: Option<LocalFile>,
    ) -> Result<UploadReceipt, UploadError> {
        let mut session = self.start(expense_id, file)?;
        self.run(&mut session).await
    }

    /// Run `session` from Signing to Done. The failure, if any, is also
    /// recorded as the session's terminal phase.
    pub async fn run(&self, session: &mut UploadSession) -> Result<UploadReceipt, UploadError> {
        let destination = match self.sign(session).await {
            Ok(destination) => destination,
            Err(source) => {
                let err = UploadError::Sign {
                    filename: session.filename().to_string(),
                    source,
                };
                session.fail(err.to_string());
                return Err(err);
            }
        };
        let object_key = destination.key.clone();
        let upload_url = destination.upload_url.clone();
        session.signed(destination);

        if let Err(source) = self
            .store
            .put_object(&upload_url, session.content_type(), session.body())
            .await
        {
            let err = UploadError::Transfer {
                object_key,
                destination: upload_url,
                source,
            };
            session.fail(err.to_string());
            return Err(err);
        }
        session.transferred();

        match self.attach(session.expense_id(), &object_key, &upload_url).await {
            Ok(receipt) => {
                session.attached();
                Ok(receipt)
            }
            Err(orphan) => {
                session.fail(orphan.to_string());
                Err(orphan.into())
            }
        }
    }

    /// Repeat only the attach phase for an object that is already stored.
    pub async fn retry_attach(
        &self,
        orphan: &OrphanResourceWarning,
    ) -> Result<UploadReceipt, UploadError> {
        Ok(self
            .attach(orphan.expense_id, &orphan.object_key, &orphan.destination)
            .await?)
    }

    async fn sign(&self, session: &UploadSession) -> Result<SignedDestination, RequestFailed> {
        let request = SignRequest {
            filename: session.filename().to_string(),
            content_type: session.content_type().to_string(),
        };
        let body =
            serde_json::to_value(&request).map_err(|e| RequestFailed::malformed(e.to_string()))?;
        let response = self.fetcher.post(SIGN_RESOURCE, &body).await?;
        decode_payload::<SignedDestination>(response)?.ensure_complete()
    }

    async fn attach(
        &self,
        expense_id: ExpenseId,
        object_key: &str,
        destination: &str,
    ) -> Result<UploadReceipt, OrphanResourceWarning> {
        let fetcher = Arc::clone(&self.fetcher);
        let resource = detail_resource(expense_id);
        let body = AttachReceipt {
            file_reference: object_key.to_string(),
        };
        let body = serde_json::to_value(&body).map_err(|e| {
            orphan(expense_id, object_key, destination, RequestFailed::malformed(e.to_string()))
        })?;

        let result = self
            .coordinator
            .run(
                &detail_key(expense_id),
                set_file_reference(object_key.to_string()),
                move || async move { fetcher.patch(&resource, &body).await },
            )
            .await;

        match result {
            Ok(confirmed) => {
                self.coordinator.cache().invalidate(&list_key());
                info!(expense_id, object_key, "Receipt attached");
                Ok(UploadReceipt {
                    expense_id,
                    object_key: object_key.to_string(),
                    expense: updated_expense(confirmed.into_response()),
                })
            }
            Err(failed) => {
                warn!(
                    expense_id,
                    object_key,
                    error = %failed.source,
                    "Receipt stored but not attached"
                );
                Err(orphan(expense_id, object_key, destination, failed.into_source()))
            }
        }
    }
}

fn updated_expense(response: Value) -> Option<Expense> {
    decode_payload::<ExpenseEnvelope>(response)
        .ok()
        .map(|envelope| envelope.expense)
}

fn orphan(
    expense_id: ExpenseId,
    object_key: &str,
    destination: &str,
    source: RequestFailed,
) -> OrphanResourceWarning {
    OrphanResourceWarning {
        expense_id,
        object_key: object_key.to_string(),
        destination: destination.to_string(),
        source,
    }
}
