//! The persistence seam shared by the local and remote backends.

use crate::models::stored_file::{DownloadedFile, NewFile, StoredFile};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};
use thiserror::Error;

/// Which backend a store talks to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Embedded SQLite database holding metadata and payload in one row.
    Local,
    /// Hosted storage bucket plus REST metadata table.
    Remote,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Local => write!(f, "local"),
            Backend::Remote => write!(f, "remote"),
        }
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("file `{0}` not found")]
    NotFound(String),
    #[error("remote service returned {status}: {message}")]
    Remote { status: u16, message: String },
    #[error("unexpected response from remote service: {0}")]
    Decode(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Save/list/download/delete against one backend.
///
/// Implementations never return payload bytes from `save` or `list`; the
/// payload is only read by `download`.
#[async_trait]
pub trait FileStore: Send + Sync {
    fn backend(&self) -> Backend;

    /// Persist a validated upload and return its metadata.
    async fn save(&self, file: NewFile) -> StorageResult<StoredFile>;

    /// All stored files, newest first.
    async fn list(&self) -> StorageResult<Vec<StoredFile>>;

    async fn download(&self, id: &str) -> StorageResult<DownloadedFile>;

    async fn delete(&self, id: &str) -> StorageResult<()>;

    /// Cheap round trip used by the readiness probe.
    async fn ping(&self) -> StorageResult<()>;
}

pub type SharedStore = Arc<dyn FileStore>;
