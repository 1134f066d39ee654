//! In-process storage backend
//!
//! Every map is a [`DashMap`]; per-key atomicity comes from holding the
//! shard entry while reading and writing, so unrelated keys never contend.

use crate::error::{StoreError, StoreResult};
use crate::model::{
    CaseFilter, CaseRecord, CounterKey, HistoryDraft, HistoryRecord, NewCase, SubmitterProfile,
    SubmitterRecord,
};
use crate::spi::{CaseRepository, CounterStore, HistoryStore, IdentityStore};
use buzon_model::{CaseId, CaseStatus, SubmitterId};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Memory-backed [`Datastore`](crate::Datastore)
#[derive(Debug)]
pub struct InMemoryStore {
    atomic_counters: bool,
    counters: DashMap<CounterKey, u64>,
    identities: DashMap<SubmitterId, SubmitterRecord>,
    identity_index: DashMap<(String, bool), SubmitterId>,
    cases: DashMap<CaseId, CaseRecord>,
    folios: DashMap<String, CaseId>,
    history: DashMap<CaseId, Vec<HistoryRecord>>,
    last_seq: AtomicU64,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            atomic_counters: true,
            counters: DashMap::new(),
            identities: DashMap::new(),
            identity_index: DashMap::new(),
            cases: DashMap::new(),
            folios: DashMap::new(),
            history: DashMap::new(),
            last_seq: AtomicU64::new(0),
        }
    }

    /// Hide the atomic increment so allocators fall back to
    /// compare-and-swap
    #[inline]
    #[must_use]
    pub fn without_atomic_increment(mut self) -> Self {
        self.atomic_counters = false;
        self
    }

    fn next_seq(&self) -> u64 {
        self.last_seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Overwrite a stored history entry in place.
    ///
    /// Bypasses the append-only contract; exists so integrity checks can be
    /// exercised against a tampered ledger.
    #[cfg(any(test, feature = "test-utils"))]
    pub fn tamper_history(&self, case_id: CaseId, seq: u64, f: impl FnOnce(&mut HistoryRecord)) -> bool {
        let Some(mut chain) = self.history.get_mut(&case_id) else {
            return false;
        };
        match chain.iter_mut().find(|e| e.seq == seq) {
            Some(entry) => {
                f(entry);
                true
            }
            None => false,
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CounterStore for InMemoryStore {
    fn supports_atomic_increment(&self) -> bool {
        self.atomic_counters
    }

    fn increment_counter(&self, key: CounterKey) -> StoreResult<u64> {
        if !self.atomic_counters {
            return Err(StoreError::Unsupported("atomic counter increment"));
        }
        let mut next = self.counters.entry(key).or_insert(1);
        let allocated = *next;
        *next += 1;
        Ok(allocated)
    }

    fn load_counter(&self, key: CounterKey) -> StoreResult<Option<u64>> {
        Ok(self.counters.get(&key).map(|v| *v))
    }

    fn compare_and_swap_counter(
        &self,
        key: CounterKey,
        expected: Option<u64>,
        new: u64,
    ) -> StoreResult<bool> {
        let swapped = match self.counters.entry(key) {
            Entry::Occupied(mut slot) => {
                if expected == Some(*slot.get()) {
                    slot.insert(new);
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(slot) => {
                if expected.is_none() {
                    slot.insert(new);
                    true
                } else {
                    false
                }
            }
        };
        Ok(swapped)
    }
}

impl IdentityStore for InMemoryStore {
    fn find_identity(&self, email: &str, confidential: bool) -> StoreResult<Option<SubmitterRecord>> {
        let Some(id) = self
            .identity_index
            .get(&(email.to_string(), confidential))
            .map(|id| *id)
        else {
            return Ok(None);
        };
        Ok(self.identities.get(&id).map(|r| r.clone()))
    }

    fn upsert_identity(
        &self,
        email: &str,
        confidential: bool,
        profile: &SubmitterProfile,
        at: DateTime<Utc>,
    ) -> StoreResult<SubmitterRecord> {
        // Index entry stays locked until the identity row is in place
        match self.identity_index.entry((email.to_string(), confidential)) {
            Entry::Occupied(slot) => {
                let id = *slot.get();
                let mut record = self
                    .identities
                    .get_mut(&id)
                    .ok_or_else(|| StoreError::Corrupt(format!("dangling identity index {id}")))?;
                record.profile.merge_from(profile);
                record.updated_at = at;
                Ok(record.clone())
            }
            Entry::Vacant(slot) => {
                let record = SubmitterRecord {
                    id: SubmitterId::new(),
                    email: email.to_string(),
                    confidential,
                    profile: profile.clone(),
                    created_at: at,
                    updated_at: at,
                };
                self.identities.insert(record.id, record.clone());
                slot.insert(record.id);
                Ok(record)
            }
        }
    }

    fn get_identity(&self, id: SubmitterId) -> StoreResult<Option<SubmitterRecord>> {
        Ok(self.identities.get(&id).map(|r| r.clone()))
    }

    fn identities_by_email(&self, email: &str) -> StoreResult<Vec<SubmitterRecord>> {
        let mut found: Vec<SubmitterRecord> = [false, true]
            .into_iter()
            .filter_map(|confidential| {
                let id = *self.identity_index.get(&(email.to_string(), confidential))?;
                self.identities.get(&id).map(|r| r.clone())
            })
            .collect();
        found.sort_by_key(|r| r.created_at);
        Ok(found)
    }
}

fn newest_first(cases: &mut [CaseRecord]) {
    cases.sort_by(|a, b| b.received_at.cmp(&a.received_at).then_with(|| b.id.cmp(&a.id)));
}

impl CaseRepository for InMemoryStore {
    fn insert_case(
        &self,
        case: NewCase,
        initial: HistoryDraft,
    ) -> StoreResult<(CaseRecord, HistoryRecord)> {
        match self.folios.entry(case.folio.as_str().to_string()) {
            Entry::Occupied(slot) => Err(StoreError::DuplicateFolio(slot.key().clone())),
            Entry::Vacant(slot) => {
                let entry = HistoryRecord::seal(initial, self.next_seq(), None);
                let record = CaseRecord::from_new(case, entry.to_status, entry.seq);
                self.history.insert(record.id, vec![entry.clone()]);
                self.cases.insert(record.id, record.clone());
                slot.insert(record.id);
                Ok((record, entry))
            }
        }
    }

    fn get_case(&self, id: CaseId) -> StoreResult<Option<CaseRecord>> {
        Ok(self.cases.get(&id).map(|r| r.clone()))
    }

    fn get_case_by_folio(&self, folio: &str) -> StoreResult<Option<CaseRecord>> {
        let Some(id) = self.folios.get(folio).map(|id| *id) else {
            return Ok(None);
        };
        self.get_case(id)
    }

    fn list_cases_by_submitters(&self, submitters: &[SubmitterId]) -> StoreResult<Vec<CaseRecord>> {
        let mut found: Vec<CaseRecord> = self
            .cases
            .iter()
            .filter(|c| c.submitter.is_some_and(|s| submitters.contains(&s)))
            .map(|c| c.clone())
            .collect();
        newest_first(&mut found);
        Ok(found)
    }

    fn list_cases(&self, filter: &CaseFilter) -> StoreResult<Vec<CaseRecord>> {
        let mut found: Vec<CaseRecord> = self
            .cases
            .iter()
            .filter(|c| filter.matches(c))
            .map(|c| c.clone())
            .collect();
        newest_first(&mut found);
        Ok(found
            .into_iter()
            .skip(filter.offset)
            .take(filter.limit.unwrap_or(usize::MAX))
            .collect())
    }

    fn update_cached_status(&self, id: CaseId, status: CaseStatus, seq: u64) -> StoreResult<bool> {
        let mut record = self.cases.get_mut(&id).ok_or(StoreError::CaseNotFound(id))?;
        if seq <= record.status_seq {
            return Ok(false);
        }
        record.status = status;
        record.status_seq = seq;
        Ok(true)
    }
}

impl HistoryStore for InMemoryStore {
    fn append_history(
        &self,
        draft: HistoryDraft,
        expected_head: Option<u64>,
    ) -> StoreResult<HistoryRecord> {
        let case_id = draft.case_id;
        let mut chain = self
            .history
            .get_mut(&case_id)
            .ok_or(StoreError::CaseNotFound(case_id))?;

        let actual = chain.last().map(|e| e.seq);
        if actual != expected_head {
            return Err(StoreError::HeadMoved {
                case_id,
                expected: expected_head,
                actual,
            });
        }

        let entry = HistoryRecord::seal(draft, self.next_seq(), chain.last());
        chain.push(entry.clone());
        Ok(entry)
    }

    fn list_history(&self, case_id: CaseId) -> StoreResult<Vec<HistoryRecord>> {
        let mut entries = self
            .history
            .get(&case_id)
            .map(|chain| chain.clone())
            .unwrap_or_default();
        entries.sort_by(|a, b| a.occurred_at.cmp(&b.occurred_at).then(a.seq.cmp(&b.seq)));
        Ok(entries)
    }

    fn history_head(&self, case_id: CaseId) -> StoreResult<Option<HistoryRecord>> {
        Ok(self
            .history
            .get(&case_id)
            .and_then(|chain| chain.last().cloned()))
    }
}
