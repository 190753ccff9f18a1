//! Error types for the sync engine.

use thiserror::Error;

use crate::{downloader::FormDownloadResult, repository::RepositoryError};

/// Failures talking to a form server. These are `Clone` so the last one can
/// be kept in observable state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormSourceError {
    #[error("server {0} is unreachable")]
    Unreachable(String),

    #[error("server {0} rejected the credentials")]
    Security(String),

    #[error("server {server_url} responded with status {status}")]
    Server { status: u16, server_url: String },

    #[error("could not parse the response from {0}")]
    Parse(String),

    #[error("server {0} is not OpenRosa compliant")]
    NotOpenRosaCompliant(String),

    /// One or more forms of a batch failed to download.
    #[error("one or more forms failed to download")]
    Fetch,
}

#[derive(Debug, Error)]
pub enum FormDownloadError {
    #[error("download was interrupted")]
    Interrupted,

    #[error(transparent)]
    FormSource(#[from] FormSourceError),

    #[error("could not parse downloaded form: {0}")]
    FormParsing(String),

    #[error("downloaded form has id {actual}, expected {expected}")]
    FormIdMismatch { expected: String, actual: String },

    #[error("disk error: {0}")]
    Disk(#[from] std::io::Error),

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Pass-level outcome of matching the device against a server.
#[derive(Debug, Error)]
pub enum FormsSyncError {
    #[error(transparent)]
    FormSource(#[from] FormSourceError),

    #[error("synchronization was interrupted")]
    Interrupted,

    #[error("{} form(s) failed to download", .0.len())]
    DownloadFailures(Vec<FormDownloadResult>),

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
}

impl FormsSyncError {
    /// The error published to observers of a project's sync state.
    pub fn to_source_error(&self) -> FormSourceError {
        match self {
            FormsSyncError::FormSource(e) => e.clone(),
            _ => FormSourceError::Fetch,
        }
    }
}
