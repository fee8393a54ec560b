// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

use rifa_model::{BoardSnapshot, BuyerName, DocumentFields, Phone, Ticket, TicketNumber};
use rifa_store::{watch_collection, CollectionWatch, CreateOutcome, DocumentStore, StoreError};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::{broadcast, watch};
use tracing::{info, warn};

mod errors;

pub use errors::{SellError, ToggleError};

pub const CRATE_NAME: &str = "rifa-registry";

/// Collection holding the sold slots; unsold numbers have no document.
pub const DEFAULT_COLLECTION: &str = "sold";

#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub collection: String,
    /// Deadline for each store round trip; elapse maps to a timeout error.
    pub op_timeout: Duration,
    /// Base polling cadence of the live collection view.
    pub poll_interval: Duration,
    pub event_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            collection: DEFAULT_COLLECTION.to_string(),
            op_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(500),
            event_capacity: 64,
        }
    }
}

/// Structured notification published on successful writes. The registry
/// core never formats user-facing text; notification layers subscribe and
/// render these as they see fit.
#[derive(Debug, Clone)]
pub enum RegistryEvent {
    TicketSold {
        number: TicketNumber,
        buyer: BuyerName,
    },
    PaidChanged {
        number: TicketNumber,
        paid: bool,
    },
}

/// Subscriber view of the board. Updates coalesce: the current value is
/// always the latest full snapshot, never a diff. Dropping the watch only
/// detaches this subscriber; the registry keeps its store subscription.
#[derive(Clone)]
pub struct BoardWatch {
    rx: watch::Receiver<BoardSnapshot>,
}

impl BoardWatch {
    /// Waits for the next snapshot delivery. Returns `None` once the
    /// registry has been torn down.
    pub async fn next(&mut self) -> Option<BoardSnapshot> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    #[must_use]
    pub fn current(&self) -> BoardSnapshot {
        self.rx.borrow().clone()
    }
}

/// Owns the 100-slot numbering space: mediates all reads and writes
/// against the document store and enforces the no-double-sale invariant
/// through the store's atomic create.
///
/// The local snapshot cache is populated exclusively by the live
/// subscription; `sell` and `set_paid` write through to the store and the
/// cache catches up when the watcher observes the change.
pub struct TicketRegistry {
    store: Arc<dyn DocumentStore>,
    collection: String,
    op_timeout: Duration,
    board_rx: watch::Receiver<BoardSnapshot>,
    ready_rx: watch::Receiver<bool>,
    events: broadcast::Sender<RegistryEvent>,
    _watch: CollectionWatch,
}

impl TicketRegistry {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, config: RegistryConfig) -> Self {
        let watch_handle =
            watch_collection(store.clone(), config.collection.clone(), config.poll_interval);
        let (board_tx, board_rx) = watch::channel(BoardSnapshot::default());
        let (ready_tx, ready_rx) = watch::channel(false);
        let (events, _) = broadcast::channel(config.event_capacity);
        info!(
            "ticket registry starting backend={} collection={}",
            store.backend_tag(),
            config.collection
        );

        let mut docs_rx = watch_handle.receiver();
        tokio::spawn(async move {
            loop {
                if docs_rx.changed().await.is_err() {
                    return;
                }
                let Some(docs) = docs_rx.borrow_and_update().clone() else {
                    continue;
                };
                match BoardSnapshot::from_documents(
                    docs.iter().map(|d| (d.key.as_str(), &d.fields)),
                ) {
                    Ok(snapshot) => {
                        if board_tx.send(snapshot).is_err() {
                            return;
                        }
                        let _ = ready_tx.send(true);
                    }
                    // Keep the previous snapshot rather than show a
                    // partially decoded board.
                    Err(e) => warn!("discarding undecodable board state: {e}"),
                }
            }
        });

        Self {
            store,
            collection: config.collection,
            op_timeout: config.op_timeout,
            board_rx,
            ready_rx,
            events,
            _watch: watch_handle,
        }
    }

    /// Resolves once the first full snapshot has arrived. Callers gate
    /// their "loaded" state on this, mirroring the board's loading screen.
    pub async fn wait_ready(&self) {
        let mut rx = self.ready_rx.clone();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    #[must_use]
    pub fn subscribe(&self) -> BoardWatch {
        BoardWatch {
            rx: self.board_rx.clone(),
        }
    }

    /// Most recently received snapshot; no store round trip.
    #[must_use]
    pub fn snapshot(&self) -> BoardSnapshot {
        self.board_rx.borrow().clone()
    }

    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    /// Sells a slot. Validation happens before any store round trip; the
    /// write is an atomic create-if-absent, so two concurrent sells for
    /// one number yield exactly one success.
    pub async fn sell(&self, number: i64, buyer: &str, phone: &str) -> Result<Ticket, SellError> {
        let number = TicketNumber::parse(number).map_err(SellError::InvalidInput)?;
        let buyer = BuyerName::parse(buyer).map_err(SellError::InvalidInput)?;
        let phone = Phone::parse(phone).map_err(SellError::InvalidInput)?;
        let ticket = Ticket::new(buyer, phone, now_epoch_ms());

        let outcome = self
            .with_timeout(self.store.create(&self.collection, &number.key(), ticket.to_fields()))
            .await?;
        match outcome {
            CreateOutcome::Created => {
                let _ = self.events.send(RegistryEvent::TicketSold {
                    number,
                    buyer: ticket.buyer.clone(),
                });
                info!("ticket sold number={number} buyer={}", ticket.buyer);
                Ok(ticket)
            }
            CreateOutcome::Exists(existing) => Err(SellError::AlreadySold {
                existing_buyer: existing
                    .get("buyer")
                    .and_then(Value::as_str)
                    .unwrap_or("desconocido")
                    .to_string(),
            }),
        }
    }

    /// Sets the payment flag of a sold slot. Merges only the `paid` field;
    /// buyer, phone and sale time stay untouched. Idempotent.
    pub async fn set_paid(&self, number: i64, paid: bool) -> Result<(), ToggleError> {
        let number = TicketNumber::parse(number).map_err(ToggleError::InvalidNumber)?;
        let key = number.key();

        let current = self
            .with_timeout(self.store.get(&self.collection, &key))
            .await?;
        if current.is_none() {
            return Err(ToggleError::NotSold);
        }

        let mut patch = DocumentFields::new();
        patch.insert("paid".to_string(), Value::Bool(paid));
        let applied = self
            .with_timeout(self.store.merge(&self.collection, &key, patch))
            .await?;
        if !applied {
            return Err(ToggleError::NotSold);
        }
        let _ = self
            .events
            .send(RegistryEvent::PaidChanged { number, paid });
        Ok(())
    }

    async fn with_timeout<T, F>(&self, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout),
        }
    }
}

fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
