//! Remote object stores that hold the archives.
//!

use std::{
    io::{self, Read},
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use shared::Progress;
use thiserror::Error;

mod s3;

pub use s3::{S3Config, S3Store};

/// The most objects [`ObjectStore::list`] returns.
pub const LIST_LIMIT: usize = 10;

/// An object held by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    /// The object's key, including its prefix.
    pub key: String,
    /// When the object was last written.
    pub last_modified: DateTime<Utc>,
    /// The object's size in bytes.
    pub size: u64,
}

/// A key addressed store of immutable objects.
///
/// Transport errors are returned as they happen, retrying is left to the caller.
pub trait ObjectStore {
    /// Stream `len` bytes from `body` into the object `key`, then return a signed, time bounded
    /// URL to retrieve it.
    ///
    /// `progress` is updated with `(bytes sent, len)`.
    fn upload(
        &self,
        key: &str,
        body: &mut dyn Read,
        len: u64,
        progress: Option<&mut dyn Progress>,
    ) -> Result<String, TransferError>;

    /// The [`LIST_LIMIT`] most recently modified objects under `prefix`, newest first.
    ///
    /// An empty prefix is not an error, it returns an empty list.
    fn list(&self, prefix: &str) -> Result<Vec<RemoteObject>, TransferError>;

    /// Write the object `key` to `local_path`, creating parent directories as needed.
    fn download(&self, key: &str, local_path: &Path) -> Result<(), TransferError>;
}

impl<T: ObjectStore + ?Sized> ObjectStore for &T {
    fn upload(
        &self,
        key: &str,
        body: &mut dyn Read,
        len: u64,
        progress: Option<&mut dyn Progress>,
    ) -> Result<String, TransferError> {
        (**self).upload(key, body, len, progress)
    }

    fn list(&self, prefix: &str) -> Result<Vec<RemoteObject>, TransferError> {
        (**self).list(prefix)
    }

    fn download(&self, key: &str, local_path: &Path) -> Result<(), TransferError> {
        (**self).download(key, local_path)
    }
}

/// Order `objects` newest first and keep at most [`LIST_LIMIT`] of them.
pub fn newest_first(mut objects: Vec<RemoteObject>) -> Vec<RemoteObject> {
    objects.sort_by(|a, b| {
        b.last_modified
            .cmp(&a.last_modified)
            .then_with(|| b.key.cmp(&a.key))
    });
    objects.truncate(LIST_LIMIT);
    objects
}

#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("Failed to {action} '{key}': {message}")]
    Request {
        action: &'static str,
        key: String,
        message: String,
    },

    #[error("Failed to sign a URL for '{key}': {message}")]
    Presign { key: String, message: String },

    #[error("The response to {action} '{key}' had no {field}")]
    MissingField {
        action: &'static str,
        key: String,
        field: &'static str,
    },

    #[error("Failed to read the upload body: {0}")]
    ReadBody(#[source] io::Error),

    #[error("Failed to {action} {path:?}: {source}")]
    Io {
        #[source]
        source: io::Error,
        action: &'static str,
        path: PathBuf,
    },

    #[error("Failed to create the async runtime: {0}")]
    Runtime(#[source] io::Error),
}
