//! History ledger
//!
//! Appends identified records under their owner and keeps a live,
//! reconciled, newest-first view for the signed-in owner.
//!
//! # Subscription lifecycle
//! - `subscribe(owner)`: tears down any previous owner's feed, clears the
//!   view, publishes the cleared state, then loads the owner's snapshot and
//!   starts following the store's change feed.
//! - `unsubscribe()`: stops the feed and clears the view; repeatable.
//!
//! The change receiver is taken before the snapshot is read, so a record
//! committed in between shows up in both and is de-duplicated by id.

pub mod ids;
pub mod store;
pub mod view;

pub use ids::RecordIdMinter;
pub use store::{LedgerError, LedgerStore, SqliteLedgerStore};
pub use view::HistoryView;

use partid_common::events::PartidEvent;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::models::{ComponentRecord, HistoryEntrySummary, Identity, RecordId};

/// Published state of the history view
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HistorySnapshot {
    pub owner: Option<Identity>,
    /// `created_at` descending, unique ids
    pub records: Vec<ComponentRecord>,
    /// False until the owner's stored records have been loaded
    pub loaded: bool,
}

impl HistorySnapshot {
    pub fn summaries(&self) -> Vec<HistoryEntrySummary> {
        self.records.iter().map(ComponentRecord::summary).collect()
    }
}

/// View plus its publisher; every mutation is published under the lock
struct SharedView {
    view: Mutex<HistoryView>,
    loaded: Mutex<bool>,
    tx: watch::Sender<HistorySnapshot>,
}

impl SharedView {
    fn lock(&self) -> MutexGuard<'_, HistoryView> {
        self.view.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_loaded(&self, loaded: bool) {
        *self.loaded.lock().unwrap_or_else(|e| e.into_inner()) = loaded;
    }

    /// Run `f` on the view; publish if it reports a change
    fn mutate<F>(&self, f: F) -> bool
    where
        F: FnOnce(&mut HistoryView) -> bool,
    {
        let mut view = self.lock();
        let changed = f(&mut view);
        if changed {
            self.publish(&view);
        }
        changed
    }

    fn publish(&self, view: &HistoryView) {
        let loaded = *self.loaded.lock().unwrap_or_else(|e| e.into_inner());
        self.tx.send_replace(HistorySnapshot {
            owner: view.owner().cloned(),
            records: view.records(),
            loaded,
        });
    }
}

struct ActiveFeed {
    owner: Identity,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

pub struct HistoryLedger {
    store: Arc<dyn LedgerStore>,
    minter: Arc<RecordIdMinter>,
    shared: Arc<SharedView>,
    active: tokio::sync::Mutex<Option<ActiveFeed>>,
}

impl HistoryLedger {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        let (tx, _) = watch::channel(HistorySnapshot::default());
        Self {
            store,
            minter: Arc::new(RecordIdMinter::new()),
            shared: Arc::new(SharedView {
                view: Mutex::new(HistoryView::new()),
                loaded: Mutex::new(false),
                tx,
            }),
            active: tokio::sync::Mutex::new(None),
        }
    }

    /// Id/time minter records must be created with
    pub fn minter(&self) -> Arc<RecordIdMinter> {
        self.minter.clone()
    }

    /// Receiver of the live view without changing the subscription
    pub fn watch(&self) -> watch::Receiver<HistorySnapshot> {
        self.shared.tx.subscribe()
    }

    /// Current view contents
    pub fn snapshot(&self) -> HistorySnapshot {
        self.shared.tx.borrow().clone()
    }

    /// Owner of the active feed, if any
    pub async fn subscribed_owner(&self) -> Option<Identity> {
        self.active.lock().await.as_ref().map(|feed| feed.owner.clone())
    }

    /// Durable ordered set of `owner`, bypassing the live view
    pub async fn list(&self, owner: &Identity) -> Result<Vec<ComponentRecord>, LedgerError> {
        self.store.load_owner(owner).await
    }

    /// Open the live feed for `owner`
    ///
    /// Idempotent for the current owner. A different owner replaces the
    /// previous feed, and the prior owner's records are cleared before any
    /// of the new owner's appear.
    pub async fn subscribe(
        &self,
        owner: Identity,
    ) -> Result<watch::Receiver<HistorySnapshot>, LedgerError> {
        let mut active = self.active.lock().await;

        if let Some(feed) = active.as_ref() {
            if feed.owner == owner {
                debug!(owner = %owner, "Already subscribed");
                return Ok(self.watch());
            }
        }
        if let Some(previous) = active.take() {
            stop_feed(previous).await;
        }

        self.shared.set_loaded(false);
        self.shared.mutate(|view| {
            view.reset(Some(owner.clone()));
            true
        });

        let changes = self.store.changes();
        let records = match self.store.load_owner(&owner).await {
            Ok(records) => records,
            Err(e) => {
                error!(owner = %owner, error = %e, "Failed to load history");
                self.shared.mutate(|view| {
                    view.reset(None);
                    true
                });
                return Err(e);
            }
        };

        let count = records.len();
        self.shared.set_loaded(true);
        self.shared.mutate(|view| {
            view.apply_snapshot(records);
            true
        });

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_feed(
            self.store.clone(),
            self.shared.clone(),
            owner.clone(),
            changes,
            cancel.clone(),
        ));

        info!(owner = %owner, records = count, "History subscription opened");
        *active = Some(ActiveFeed {
            owner,
            cancel,
            task,
        });

        Ok(self.watch())
    }

    /// Release the live feed and clear the view; safe to repeat
    pub async fn unsubscribe(&self) {
        let mut active = self.active.lock().await;
        if let Some(feed) = active.take() {
            let owner = feed.owner.clone();
            stop_feed(feed).await;
            info!(owner = %owner, "History subscription closed");
        }

        self.shared.set_loaded(false);
        self.shared.mutate(|view| {
            let changed = view.owner().is_some() || !view.is_empty();
            view.reset(None);
            changed
        });
    }

    /// Durably store an identified record
    ///
    /// When the record's owner is the one being viewed, it is shown
    /// optimistically and withdrawn again if the write fails. Callers
    /// must never pass an `Uncertain` record.
    pub async fn append(&self, record: ComponentRecord) -> Result<(), LedgerError> {
        debug_assert!(
            record.confidence.is_identified(),
            "uncertain results are never persisted"
        );

        let id = record.id;
        let optimistic = self.shared.mutate(|view| view.insert_pending(record.clone()));

        match self.store.insert(&record).await {
            Ok(()) => {
                debug!(record_id = %id, optimistic, "Append committed");
                Ok(())
            }
            Err(e) => {
                error!(owner = %record.owner_id, record_id = %id, error = %e, "Append failed");
                if optimistic {
                    self.shared.mutate(|view| view.discard_pending(id));
                }
                Err(e)
            }
        }
    }
}

async fn stop_feed(feed: ActiveFeed) {
    feed.cancel.cancel();
    if let Err(e) = feed.task.await {
        warn!(owner = %feed.owner, error = %e, "History feed task ended abnormally");
    }
}

async fn run_feed(
    store: Arc<dyn LedgerStore>,
    shared: Arc<SharedView>,
    owner: Identity,
    mut changes: broadcast::Receiver<PartidEvent>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            event = changes.recv() => event,
        };

        match event {
            Ok(event) if event.owner_id() != owner.as_str() => continue,
            Ok(PartidEvent::RecordAppended { record_id, .. }) => {
                let id = RecordId::from_uuid(record_id);
                match store.load_record(&owner, id).await {
                    Ok(Some(record)) if !cancel.is_cancelled() => {
                        if shared.mutate(|view| view.confirm(record)) {
                            debug!(owner = %owner, record_id = %id, "Record confirmed");
                        }
                    }
                    Ok(Some(_)) => break,
                    Ok(None) => warn!(owner = %owner, record_id = %id, "Announced record not found"),
                    Err(e) => warn!(owner = %owner, record_id = %id, error = %e, "Failed to load announced record"),
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(owner = %owner, skipped, "History feed lagged, reloading");
                match store.load_owner(&owner).await {
                    Ok(records) if !cancel.is_cancelled() => {
                        shared.mutate(|view| {
                            view.apply_snapshot(records);
                            true
                        });
                    }
                    Ok(_) => break,
                    Err(e) => warn!(owner = %owner, error = %e, "History reload failed"),
                }
            }
            Err(broadcast::error::RecvError::Closed) => {
                debug!(owner = %owner, "Change feed closed");
                break;
            }
        }
    }
}
