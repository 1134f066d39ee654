//! History ledger
//!
//! Append-only record of every status change. Entries are hash-chained per
//! case; [`HistoryLedger::verify_chain`] recomputes the chain to detect
//! edits made behind the store's back.

use crate::error::{DeskError, DeskResult};
use buzon_model::{CaseId, Priority};
use buzon_store::{Datastore, HistoryDraft, HistoryRecord, HistoryStore, GENESIS_HASH};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Ledger service over a [`HistoryStore`]
pub struct HistoryLedger<S: ?Sized = dyn Datastore> {
    store: Arc<S>,
}

impl<S: ?Sized> Clone for HistoryLedger<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: HistoryStore + ?Sized> HistoryLedger<S> {
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Append `draft` if the case head is still `expected_head`
    ///
    /// # Errors
    /// [`DeskError::Storage`] wrapping `StoreError::HeadMoved` when another
    /// append won the race
    pub fn append(&self, draft: HistoryDraft, expected_head: Option<u64>) -> DeskResult<HistoryRecord> {
        Ok(self.store.append_history(draft, expected_head)?)
    }

    /// Entries ordered by (`occurred_at`, `seq`)
    pub fn list_for_case(&self, case_id: CaseId) -> DeskResult<Vec<HistoryRecord>> {
        Ok(self.store.list_history(case_id)?)
    }

    pub fn head(&self, case_id: CaseId) -> DeskResult<Option<HistoryRecord>> {
        Ok(self.store.history_head(case_id)?)
    }

    /// Recompute the hash chain, returning the number of verified entries
    ///
    /// # Errors
    /// [`DeskError::LedgerCorrupted`] at the first entry whose link, hash or
    /// timestamp order does not verify
    pub fn verify_chain(&self, case_id: CaseId) -> DeskResult<usize> {
        let mut entries = self.store.list_history(case_id)?;
        entries.sort_by_key(|e| e.seq);

        let mut prev_hash = GENESIS_HASH;
        let mut prev_time: Option<DateTime<Utc>> = None;
        for entry in &entries {
            let linked = entry.case_id == case_id && entry.prev_hash == prev_hash;
            let ordered = prev_time.map_or(true, |t| entry.occurred_at >= t);
            if !linked || !ordered || entry.compute_hash() != entry.hash {
                tracing::error!(case_id = %case_id, seq = entry.seq, "history chain does not verify");
                return Err(DeskError::LedgerCorrupted {
                    case_id,
                    seq: entry.seq,
                });
            }
            prev_hash = entry.hash;
            prev_time = Some(entry.occurred_at);
        }
        Ok(entries.len())
    }
}

/// Priority from the latest entry that set one
#[must_use]
pub fn current_priority(entries: &[HistoryRecord]) -> Option<Priority> {
    entries.iter().rev().find_map(|e| e.priority)
}

/// Latest entry that resolved the case
#[must_use]
pub fn latest_resolution(entries: &[HistoryRecord]) -> Option<&HistoryRecord> {
    entries.iter().rev().find(|e| e.resolved_at.is_some())
}
