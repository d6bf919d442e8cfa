use std::time::Duration;
use thiserror::Error;

/// Failure of a whole sync operation.
///
/// Per-page problems never surface here; they are collected into the
/// `failed` list of the operation's report instead.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("spreadsheet is missing required column '{0}'")]
    MissingColumn(&'static str),
    #[error("missing {0} credentials")]
    MissingCredentials(&'static str),
    #[error("backup version {0} not found")]
    VersionNotFound(String),
    #[error("{what} timed out after {after:?}")]
    Timeout { what: String, after: Duration },
    #[error("snapshot store failed: {0:#}")]
    Storage(anyhow::Error),
    /// Upstream API failures and anything else unexpected.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SyncError {
    /// Configuration problems are the caller's to fix; nothing was attempted.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            SyncError::MissingColumn(_) | SyncError::MissingCredentials(_)
        )
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
