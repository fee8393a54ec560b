// SPDX-License-Identifier: Apache-2.0

use crate::{collection_etag, CollectionFetch, CreateOutcome, Document, DocumentStore, StoreError};
use async_trait::async_trait;
use rifa_model::DocumentFields;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, Notify};

/// In-process store used in tests and as the default backend when no
/// remote store is configured. `create` is atomic under the store lock,
/// and every commit signals `commits` so a parked watcher wakes without
/// waiting out its poll interval. The failure and latency knobs let
/// tests exercise outage and timeout paths without a network.
pub struct MemoryStore {
    collections: Mutex<HashMap<String, BTreeMap<String, DocumentFields>>>,
    commits: Notify,
    pub write_calls: AtomicU64,
    pub fail_reads: AtomicBool,
    pub slow_ops: bool,
    pub slow_op_delay: Duration,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            collections: Mutex::new(HashMap::new()),
            commits: Notify::new(),
            write_calls: AtomicU64::new(0),
            fail_reads: AtomicBool::new(false),
            slow_ops: false,
            slow_op_delay: Duration::from_millis(0),
        }
    }
}

impl MemoryStore {
    /// A store where every operation takes `delay`, for timeout tests.
    #[must_use]
    pub fn with_latency(delay: Duration) -> Self {
        Self {
            slow_ops: true,
            slow_op_delay: delay,
            ..Self::default()
        }
    }

    async fn maybe_delay(&self) {
        if self.slow_ops {
            let delay = if self.slow_op_delay.is_zero() {
                Duration::from_millis(200)
            } else {
                self.slow_op_delay
            };
            tokio::time::sleep(delay).await;
        }
    }

    fn check_reads(&self) -> Result<(), StoreError> {
        if self.fail_reads.load(Ordering::Relaxed) {
            return Err(StoreError::Unavailable(
                "simulated store outage".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn backend_tag(&self) -> &'static str {
        "memory"
    }

    async fn get(
        &self,
        collection: &str,
        key: &str,
    ) -> Result<Option<DocumentFields>, StoreError> {
        self.maybe_delay().await;
        self.check_reads()?;
        Ok(self
            .collections
            .lock()
            .await
            .get(collection)
            .and_then(|docs| docs.get(key))
            .cloned())
    }

    async fn create(
        &self,
        collection: &str,
        key: &str,
        fields: DocumentFields,
    ) -> Result<CreateOutcome, StoreError> {
        self.maybe_delay().await;
        let mut collections = self.collections.lock().await;
        let docs = collections.entry(collection.to_string()).or_default();
        if let Some(existing) = docs.get(key) {
            return Ok(CreateOutcome::Exists(existing.clone()));
        }
        docs.insert(key.to_string(), fields);
        self.write_calls.fetch_add(1, Ordering::Relaxed);
        self.commits.notify_one();
        Ok(CreateOutcome::Created)
    }

    async fn merge(
        &self,
        collection: &str,
        key: &str,
        patch: DocumentFields,
    ) -> Result<bool, StoreError> {
        self.maybe_delay().await;
        let mut collections = self.collections.lock().await;
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(false);
        };
        let Some(existing) = docs.get_mut(key) else {
            return Ok(false);
        };
        existing.extend(patch);
        self.write_calls.fetch_add(1, Ordering::Relaxed);
        self.commits.notify_one();
        Ok(true)
    }

    async fn fetch_collection(
        &self,
        collection: &str,
        if_none_match: Option<&str>,
    ) -> Result<CollectionFetch, StoreError> {
        self.maybe_delay().await;
        self.check_reads()?;
        let collections = self.collections.lock().await;
        let empty = BTreeMap::new();
        let docs = collections.get(collection).unwrap_or(&empty);
        let etag = collection_etag(docs)?;
        if if_none_match == Some(etag.as_str()) {
            return Ok(CollectionFetch::NotModified);
        }
        Ok(CollectionFetch::Updated {
            etag,
            docs: docs
                .iter()
                .map(|(key, fields)| Document {
                    key: key.clone(),
                    fields: fields.clone(),
                })
                .collect(),
        })
    }

    // `notify_one` leaves a permit behind when no watcher is parked yet,
    // so a commit landing just before the park still wakes it.
    async fn wait_for_change(&self, max_wait: Duration) {
        let _ = tokio::time::timeout(max_wait, self.commits.notified()).await;
    }
}
