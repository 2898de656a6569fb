//! Record id and creation-time minting
//!
//! Timestamps are truncated to microseconds (the precision the store keeps)
//! and forced strictly increasing within the process, so two sequential
//! identifications never share a `createdAt`.

use chrono::{DateTime, Duration, SubsecRound, Utc};
use std::sync::Mutex;

use crate::models::RecordId;

#[derive(Debug, Default)]
pub struct RecordIdMinter {
    last: Mutex<Option<DateTime<Utc>>>,
}

impl RecordIdMinter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a fresh id and its creation timestamp
    pub fn mint(&self) -> (RecordId, DateTime<Utc>) {
        let now = Utc::now().trunc_subsecs(6);
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());

        let created_at = match *last {
            Some(prev) if now <= prev => prev + Duration::microseconds(1),
            _ => now,
        };
        *last = Some(created_at);

        (RecordId::mint(), created_at)
    }
}
