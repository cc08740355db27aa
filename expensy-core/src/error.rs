use thiserror::Error;

use crate::gateway::GatewayError;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage io: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialize state: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no card accounts available")]
    NoAccounts,
    #[error("account not found: {0}")]
    AccountNotFound(String),
    #[error("an import is already running for account {0}")]
    ImportInProgress(String),
    #[error("extraction failed: {0}")]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
