//! Remote content host boundary.
//!
//! A collection is one JSON file on the host. Reads are conditional on the
//! last known revision; writes replace the whole file and must name the
//! write handle of the version they replace, which is what makes them safe
//! under concurrent writers.

mod github;
#[cfg(any(test, feature = "testing"))]
mod memory;

pub use github::GitHubRemote;
#[cfg(any(test, feature = "testing"))]
pub use memory::{Injected, MemoryRemote, RemoteCall};

use async_trait::async_trait;
use gitdoc_engine::Document;
use thiserror::Error;

/// Opaque token identifying an exact content version (an ETag).
pub type Revision = String;

/// Identifier a replacement write must present (a blob SHA).
pub type WriteHandle = String;

/// A decoded remote object.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteObject {
    pub documents: Vec<Document>,
    /// Token for the next conditional read, when the host supplied one
    pub revision: Option<Revision>,
    pub write_handle: WriteHandle,
}

/// Result of a conditional read.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// The supplied revision is still current
    NotModified,
    Modified(RemoteObject),
}

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("remote object not found: {0}")]
    NotFound(String),

    #[error("write handle for {0} is stale")]
    Conflict(String),

    #[error("remote responded with HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("failed to encode or decode {path}: {reason}")]
    Codec { path: String, reason: String },
}

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Read the object at `path`. With `if_revision` set, the host may answer
    /// [`FetchOutcome::NotModified`] instead of transferring the body.
    async fn fetch(&self, path: &str, if_revision: Option<&str>)
        -> Result<FetchOutcome, RemoteError>;

    /// Replace the object at `path` with `documents`.
    ///
    /// `write_handle` must match the object's live version, or be `None`
    /// when creating it. Returns the new write handle.
    async fn put(
        &self,
        path: &str,
        documents: &[Document],
        write_handle: Option<&str>,
        message: &str,
    ) -> Result<WriteHandle, RemoteError>;
}
