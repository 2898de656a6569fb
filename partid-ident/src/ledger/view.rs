//! Local reconciled history view
//!
//! Two ordered maps keyed by `(created_at, id)`: records the store has
//! confirmed, and optimistic inserts still awaiting confirmation. An id
//! index ties them together so an entry is only ever in one of them.
//! Reading merges both, newest first. Records are matched by id, never by
//! position.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};

use crate::models::{ComponentRecord, Identity, RecordId};

type OrderKey = (DateTime<Utc>, RecordId);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Pending,
    Confirmed,
}

/// Per-owner view state
#[derive(Debug, Default)]
pub struct HistoryView {
    owner: Option<Identity>,
    confirmed: BTreeMap<OrderKey, ComponentRecord>,
    pending: BTreeMap<OrderKey, ComponentRecord>,
    index: HashMap<RecordId, (OrderKey, Slot)>,
}

impl HistoryView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn owner(&self) -> Option<&Identity> {
        self.owner.as_ref()
    }

    /// Drop every entry and rebind to `owner`
    pub fn reset(&mut self, owner: Option<Identity>) {
        self.owner = owner;
        self.confirmed.clear();
        self.pending.clear();
        self.index.clear();
    }

    fn accepts(&self, record: &ComponentRecord) -> bool {
        self.owner.as_ref() == Some(&record.owner_id)
    }

    /// Replace the confirmed set with a full snapshot from the store
    ///
    /// Pending entries present in the snapshot are promoted; the rest stay
    /// pending.
    pub fn apply_snapshot(&mut self, records: Vec<ComponentRecord>) {
        self.confirmed.clear();
        self.index.retain(|_, (_, slot)| *slot == Slot::Pending);

        for record in records {
            if !self.accepts(&record) {
                continue;
            }
            if let Some((key, _)) = self.index.remove(&record.id) {
                self.pending.remove(&key);
            }
            let key = record.order_key();
            self.index.insert(record.id, (key, Slot::Confirmed));
            self.confirmed.insert(key, record);
        }
    }

    /// Optimistically show a just-appended record
    ///
    /// Returns false when the record belongs to another owner or its id is
    /// already present.
    pub fn insert_pending(&mut self, record: ComponentRecord) -> bool {
        if !self.accepts(&record) || self.index.contains_key(&record.id) {
            return false;
        }
        let key = record.order_key();
        self.index.insert(record.id, (key, Slot::Pending));
        self.pending.insert(key, record);
        true
    }

    /// Apply a store confirmation; de-duplicates against pending by id
    ///
    /// Returns false when nothing changed.
    pub fn confirm(&mut self, record: ComponentRecord) -> bool {
        if !self.accepts(&record) {
            return false;
        }
        match self.index.get(&record.id).copied() {
            Some((_, Slot::Confirmed)) => false,
            Some((key, Slot::Pending)) => {
                self.pending.remove(&key);
                let key = record.order_key();
                self.index.insert(record.id, (key, Slot::Confirmed));
                self.confirmed.insert(key, record);
                true
            }
            None => {
                let key = record.order_key();
                self.index.insert(record.id, (key, Slot::Confirmed));
                self.confirmed.insert(key, record);
                true
            }
        }
    }

    /// Withdraw an optimistic entry whose write failed
    pub fn discard_pending(&mut self, id: RecordId) -> bool {
        match self.index.get(&id).copied() {
            Some((key, Slot::Pending)) => {
                self.index.remove(&id);
                self.pending.remove(&key);
                true
            }
            _ => false,
        }
    }

    pub fn contains(&self, id: RecordId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn is_pending(&self, id: RecordId) -> bool {
        matches!(self.index.get(&id), Some((_, Slot::Pending)))
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Merged entries, `created_at` descending
    pub fn records(&self) -> Vec<ComponentRecord> {
        let mut merged: Vec<(&OrderKey, &ComponentRecord)> =
            self.confirmed.iter().chain(self.pending.iter()).collect();
        merged.sort_by(|a, b| b.0.cmp(a.0));
        merged.into_iter().map(|(_, r)| r.clone()).collect()
    }
}
