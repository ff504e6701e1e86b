//! Error taxonomy for the archive subsystem.
//!
//! Each component returns its own typed error. [`ArchiveError`] is what the
//! top-level caller sees; it names the failing stage and carries the cause.

use std::path::PathBuf;

use thiserror::Error;

/// Failures while obtaining a credential. All of them are terminal for a run.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The OAuth client secret file has not been provisioned.
    #[error(
        "client secret file not found at {0}; download OAuth client credentials \
         for a desktop application and save them there"
    )]
    MissingClientSecret(PathBuf),

    /// The client secret file exists but cannot be used.
    #[error("client secret file {path} is invalid: {reason}")]
    InvalidClientSecret { path: PathBuf, reason: String },

    /// Refresh failed and the re-consent fallback failed as well.
    #[error("token refresh failed ({refresh}); re-consent also failed: {consent}")]
    RefreshFailed { refresh: String, consent: String },

    /// The interactive consent flow did not produce a credential.
    #[error("consent flow failed: {0}")]
    ConsentFailed(String),

    /// The durable token file could not be read or written.
    #[error("token storage error at {path}: {reason}")]
    Storage { path: PathBuf, reason: String },
}

/// Transport-level failures of the external document store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document not found or not accessible: {0}")]
    NotFound(String),

    #[error("store returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("request failed: {0}")]
    Transport(String),

    #[error("unexpected response: {0}")]
    InvalidResponse(String),

    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self {
        StoreError::Transport(e.to_string())
    }
}

/// Failures while resolving the canonical document.
#[derive(Debug, Error)]
pub enum ResolutionError {
    /// The fixed document id cannot be used. Absorbed by the resolver,
    /// which falls back to search-or-create.
    #[error("fixed document {id} is not accessible: {cause}")]
    NotFoundInaccessible { id: String, cause: StoreError },

    /// Search or create failed.
    #[error("document store unavailable: {0}")]
    StoreUnavailable(StoreError),
}

/// Failures while appending an entry.
#[derive(Debug, Error)]
pub enum AppendError {
    #[error("failed to fetch document {id}: {cause}")]
    FetchFailed { id: String, cause: StoreError },

    #[error("failed to insert entry into document {id}: {cause}")]
    InsertFailed { id: String, cause: StoreError },
}

/// A pipeline stage failed to produce text.
#[derive(Debug, Error)]
#[error("stage '{stage}' failed: {cause}")]
pub struct PipelineError {
    pub stage: String,
    pub cause: String,
}

/// Top-level result of an archive run.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("auth failed: {0}")]
    Auth(#[from] AuthError),

    #[error("format failed: nothing to archive (input is empty)")]
    EmptyContent,

    #[error("resolve failed: {0}")]
    Resolve(#[from] ResolutionError),

    #[error("append failed: {0}")]
    Append(#[from] AppendError),

    #[error("pipeline failed: {0}")]
    Pipeline(#[from] PipelineError),
}

impl ArchiveError {
    /// Name of the stage that failed.
    pub fn stage(&self) -> &'static str {
        match self {
            ArchiveError::Auth(_) => "auth",
            ArchiveError::EmptyContent => "format",
            ArchiveError::Resolve(_) => "resolve",
            ArchiveError::Append(_) => "append",
            ArchiveError::Pipeline(_) => "pipeline",
        }
    }
}
