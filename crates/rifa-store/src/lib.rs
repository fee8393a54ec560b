// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

use async_trait::async_trait;
use rifa_model::DocumentFields;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::time::Duration;

mod memory;
mod rest;
mod watch;

pub use memory::MemoryStore;
pub use rest::{RestStore, RetryPolicy};
pub use watch::{watch_collection, CollectionWatch};

pub const CRATE_NAME: &str = "rifa-store";

#[derive(Debug)]
pub enum StoreError {
    /// Network or backend failure; the operation may be retried later.
    Unavailable(String),
    /// The operation deadline elapsed before the store answered.
    Timeout,
    /// The store answered with a payload that does not decode.
    Corrupt(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable(msg) => write!(f, "store unavailable: {msg}"),
            Self::Timeout => write!(f, "store operation timed out"),
            Self::Corrupt(msg) => write!(f, "store payload corrupt: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// One document of a collection read: the store key plus its field map.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub key: String,
    pub fields: DocumentFields,
}

/// Outcome of an atomic create-if-absent.
#[derive(Debug)]
pub enum CreateOutcome {
    Created,
    /// The key was already taken; carries the current document so the
    /// caller can report who holds it without a second round trip.
    Exists(DocumentFields),
}

#[derive(Debug)]
pub enum CollectionFetch {
    NotModified,
    Updated { etag: String, docs: Vec<Document> },
}

/// Seam to the remote document store. Implementations must make `create`
/// atomic per key: two concurrent creates for one key yield exactly one
/// `Created`.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    fn backend_tag(&self) -> &'static str;

    async fn get(&self, collection: &str, key: &str)
        -> Result<Option<DocumentFields>, StoreError>;

    async fn create(
        &self,
        collection: &str,
        key: &str,
        fields: DocumentFields,
    ) -> Result<CreateOutcome, StoreError>;

    /// Partial update of the named fields only. Returns false when the
    /// document does not exist; merge never creates.
    async fn merge(
        &self,
        collection: &str,
        key: &str,
        patch: DocumentFields,
    ) -> Result<bool, StoreError>;

    /// Full collection read with an etag for conditional polling.
    async fn fetch_collection(
        &self,
        collection: &str,
        if_none_match: Option<&str>,
    ) -> Result<CollectionFetch, StoreError>;

    /// Parks the caller until the store may have committed a change, for
    /// at most `max_wait`. The default implementation just sleeps out the
    /// interval; in-process backends override it with a commit signal so
    /// watchers wake promptly instead of waiting for the next poll.
    async fn wait_for_change(&self, max_wait: Duration) {
        tokio::time::sleep(max_wait).await;
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for b in digest {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

pub(crate) fn collection_etag(
    docs: &BTreeMap<String, DocumentFields>,
) -> Result<String, StoreError> {
    let bytes = serde_json::to_vec(docs)
        .map_err(|e| StoreError::Corrupt(format!("collection serialize failed: {e}")))?;
    Ok(sha256_hex(&bytes))
}
