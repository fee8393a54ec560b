// SPDX-License-Identifier: Apache-2.0

use crate::{CollectionFetch, Document, DocumentStore, StoreError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::warn;

/// Live view of one collection. The backing poll task keeps running until
/// the handle is dropped; dropping it aborts the task and releases the
/// store connection.
pub struct CollectionWatch {
    rx: watch::Receiver<Option<Vec<Document>>>,
    task: JoinHandle<()>,
}

impl CollectionWatch {
    /// A receiver over the delivered document sets. `None` until the first
    /// fetch completes; every later value is the full collection, never a
    /// diff. Intermediate states may coalesce under tokio watch semantics.
    #[must_use]
    pub fn receiver(&self) -> watch::Receiver<Option<Vec<Document>>> {
        self.rx.clone()
    }
}

impl Drop for CollectionWatch {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Polls the collection with etag-conditional fetches and publishes every
/// change. Between polls the task parks on the store's change signal, so
/// backends with an in-process commit hook deliver promptly and remote
/// backends fall back to the poll cadence. Fetch failures are logged and
/// retried with a growing delay so a store outage turns into delayed
/// delivery, not a dead subscription.
pub fn watch_collection(
    store: Arc<dyn DocumentStore>,
    collection: String,
    poll_interval: Duration,
) -> CollectionWatch {
    let (tx, rx) = watch::channel(None);
    let task = tokio::spawn(async move {
        let mut etag: Option<String> = None;
        let mut failures: u32 = 0;
        loop {
            match store.fetch_collection(&collection, etag.as_deref()).await {
                Ok(CollectionFetch::NotModified) => {
                    failures = 0;
                }
                Ok(CollectionFetch::Updated {
                    etag: new_etag,
                    docs,
                }) => {
                    failures = 0;
                    etag = Some(new_etag);
                    if tx.send(Some(docs)).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    failures = failures.saturating_add(1);
                    log_fetch_failure(&collection, failures, &e);
                }
            }
            let delay = poll_interval.saturating_mul(failures.min(5) + 1);
            store.wait_for_change(delay).await;
            if tx.is_closed() {
                return;
            }
        }
    });
    CollectionWatch { rx, task }
}

fn log_fetch_failure(collection: &str, failures: u32, err: &StoreError) {
    warn!("collection watch fetch failed collection={collection} consecutive={failures}: {err}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;
    use rifa_model::DocumentFields;
    use serde_json::Value;
    use std::sync::atomic::Ordering;

    fn fields(buyer: &str) -> DocumentFields {
        let mut f = DocumentFields::new();
        f.insert("buyer".to_string(), Value::String(buyer.to_string()));
        f
    }

    #[tokio::test]
    async fn first_delivery_is_the_full_current_state() {
        let store = Arc::new(MemoryStore::default());
        store.create("sold", "7", fields("Ana")).await.unwrap();

        let watch = watch_collection(store, "sold".to_string(), Duration::from_millis(10));
        let mut rx = watch.receiver();
        rx.changed().await.unwrap();
        let docs = rx.borrow_and_update().clone().unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].key, "7");
    }

    #[tokio::test]
    async fn writes_reach_the_watcher() {
        let store = Arc::new(MemoryStore::default());
        let watch = watch_collection(
            store.clone(),
            "sold".to_string(),
            Duration::from_millis(10),
        );
        let mut rx = watch.receiver();
        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().clone().unwrap().is_empty());

        store.create("sold", "3", fields("Luis")).await.unwrap();
        rx.changed().await.unwrap();
        let docs = rx.borrow_and_update().clone().unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].key, "3");
    }

    #[tokio::test]
    async fn commits_wake_the_watcher_between_polls() {
        let store = Arc::new(MemoryStore::default());
        // A poll interval far beyond the test deadline: only the commit
        // signal can deliver in time.
        let watch = watch_collection(store.clone(), "sold".to_string(), Duration::from_secs(10));
        let mut rx = watch.receiver();
        rx.changed().await.unwrap();

        store.create("sold", "3", fields("Luis")).await.unwrap();
        tokio::time::timeout(Duration::from_millis(500), rx.changed())
            .await
            .expect("commit must wake the watcher before the poll timer")
            .unwrap();
        let docs = rx.borrow_and_update().clone().unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].key, "3");
    }

    #[tokio::test]
    async fn watcher_survives_a_store_outage() {
        let store = Arc::new(MemoryStore::default());
        let watch = watch_collection(
            store.clone(),
            "sold".to_string(),
            Duration::from_millis(10),
        );
        let mut rx = watch.receiver();
        rx.changed().await.unwrap();

        store.fail_reads.store(true, Ordering::Relaxed);
        tokio::time::sleep(Duration::from_millis(50)).await;
        store.fail_reads.store(false, Ordering::Relaxed);

        store.create("sold", "9", fields("Maria")).await.unwrap();
        rx.changed().await.unwrap();
        let docs = rx.borrow_and_update().clone().unwrap();
        assert_eq!(docs[0].key, "9");
    }

    #[tokio::test]
    async fn dropping_the_handle_stops_delivery() {
        let store = Arc::new(MemoryStore::default());
        let watch = watch_collection(
            store.clone(),
            "sold".to_string(),
            Duration::from_millis(10),
        );
        let mut rx = watch.receiver();
        rx.changed().await.unwrap();

        drop(watch);
        store.create("sold", "1", fields("Ana")).await.unwrap();
        let outcome =
            tokio::time::timeout(Duration::from_millis(100), rx.changed()).await;
        // Either the channel closes or no further value arrives.
        assert!(outcome.is_err() || outcome.unwrap().is_err());
    }
}
