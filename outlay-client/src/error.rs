//! Error types for the client.

use crate::api_client::ApiClientError;
use crate::config::ConfigError;
use crate::upload::UploadError;
use outlay_core::{RequestFailed, ValidationError};
use outlay_sync::MutationFailed;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Api(#[from] ApiClientError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Request(#[from] RequestFailed),
    #[error(transparent)]
    Mutation(#[from] MutationFailed),
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error("Failed to initialise logging: {0}")]
    Telemetry(String),
    #[error("Expense {0} not found")]
    NotFound(outlay_core::ExpenseId),
}

pub type ClientResult<T> = Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;

    fn validate_title(title: &str) -> ClientResult<()> {
        outlay_core::ExpenseDraft::new(title, 1.0).validate()?;
        Ok(())
    }

    #[test]
    fn test_concern_errors_convert() {
        assert!(matches!(validate_title(" "), Err(ClientError::Validation(_))));
        assert!(validate_title("Coffee").is_ok());

        let request: ClientError = RequestFailed::status(503, "busy").into();
        assert!(matches!(request, ClientError::Request(_)));
        assert_eq!(request.to_string(), RequestFailed::status(503, "busy").to_string());

        let config: ClientError = ClientConfig::from_toml("not toml = ").unwrap_err().into();
        assert!(matches!(config, ClientError::Config(ConfigError::Parse(_))));
    }
}
