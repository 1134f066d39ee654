//! Testing utilities for the Buzón workspace
//!
//! Shared fixtures and fault-injecting store wrappers.

#![allow(missing_docs)]

use buzon_core::{CaseDesk, DeskConfig, PrivacyChoice, Submission};
use buzon_model::{CaseId, CaseKind, CaseStatus, CategoryId, Channel, SubmitterId};
use buzon_store::{
    CaseFilter, CaseRecord, CaseRepository, CounterKey, CounterStore, HistoryDraft, HistoryRecord,
    HistoryStore, IdentityStore, InMemoryStore, MemoryBlobStore, NewCase, SqliteStore, StoreError,
    StoreResult, SubmitterProfile, SubmitterRecord,
};
use chrono::{DateTime, TimeZone, Utc};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

pub fn memory_desk() -> (Arc<InMemoryStore>, CaseDesk<InMemoryStore>) {
    memory_desk_with(DeskConfig::new())
}

pub fn memory_desk_with(config: DeskConfig) -> (Arc<InMemoryStore>, CaseDesk<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::new());
    let desk = CaseDesk::new(config, Arc::clone(&store), Arc::new(MemoryBlobStore::new())).unwrap();
    (store, desk)
}

/// Desk over a fresh `SQLite` store at `path`
pub fn sqlite_desk(path: &Path) -> (Arc<SqliteStore>, CaseDesk<SqliteStore>) {
    let store = Arc::new(SqliteStore::open(path).unwrap());
    let desk = CaseDesk::new(DeskConfig::new(), Arc::clone(&store), Arc::new(MemoryBlobStore::new())).unwrap();
    (store, desk)
}

/// Desk over a [`FaultyStore`] wrapping a memory store
pub fn faulty_desk(config: DeskConfig) -> (Arc<FaultyStore<InMemoryStore>>, CaseDesk<FaultyStore<InMemoryStore>>) {
    let store = Arc::new(FaultyStore::new(InMemoryStore::new()));
    let desk = CaseDesk::new(config, Arc::clone(&store), Arc::new(MemoryBlobStore::new())).unwrap();
    (store, desk)
}

pub fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 9, 30, 0).unwrap()
}

/// Digital contact-authorized complaint, academic category
pub fn contact_complaint(email: &str) -> Submission {
    Submission::new(
        Channel::Digital,
        CaseKind::Complaint,
        CategoryId(1),
        "Final grades were not published on time",
        PrivacyChoice::contact_authorized(email),
    )
    .with_area("School of Engineering")
    .with_improvement("Publish a grading calendar")
    .with_profile(SubmitterProfile {
        display_name: Some("Ana López".into()),
        phone: Some("961 555 0101".into()),
        affiliation: Some("student".into()),
        ..SubmitterProfile::default()
    })
}

/// Physical confidential suggestion, infrastructure category
pub fn confidential_suggestion(email: Option<&str>) -> Submission {
    Submission::new(
        Channel::Physical,
        CaseKind::Suggestion,
        CategoryId(3),
        "Add ramps to building C",
        PrivacyChoice::confidential(email),
    )
    .with_profile(SubmitterProfile {
        display_name: Some("Beto Ruiz".into()),
        campus: Some("Tuxtla".into()),
        ..SubmitterProfile::default()
    })
}

pub fn commendation() -> Submission {
    Submission::new(
        Channel::Digital,
        CaseKind::Commendation,
        CategoryId(5),
        "The library staff were very helpful",
        PrivacyChoice::confidential(None),
    )
}

/// Store wrapper whose faults can be switched on per test
#[derive(Debug)]
pub struct FaultyStore<S> {
    inner: S,
    fail_cache_updates: AtomicBool,
    lose_counter_swaps: AtomicBool,
    swaps_lost: AtomicUsize,
}

impl<S> FaultyStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            fail_cache_updates: AtomicBool::new(false),
            lose_counter_swaps: AtomicBool::new(false),
            swaps_lost: AtomicUsize::new(0),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Make every `update_cached_status` fail
    pub fn fail_cache_updates(&self, on: bool) {
        self.fail_cache_updates.store(on, Ordering::SeqCst);
    }

    /// Hide the atomic increment and lose every compare-and-swap
    pub fn lose_counter_swaps(&self, on: bool) {
        self.lose_counter_swaps.store(on, Ordering::SeqCst);
    }

    pub fn swaps_lost(&self) -> usize {
        self.swaps_lost.load(Ordering::SeqCst)
    }
}

impl<S: CounterStore> CounterStore for FaultyStore<S> {
    fn supports_atomic_increment(&self) -> bool {
        !self.lose_counter_swaps.load(Ordering::SeqCst) && self.inner.supports_atomic_increment()
    }

    fn increment_counter(&self, key: CounterKey) -> StoreResult<u64> {
        self.inner.increment_counter(key)
    }

    fn load_counter(&self, key: CounterKey) -> StoreResult<Option<u64>> {
        self.inner.load_counter(key)
    }

    fn compare_and_swap_counter(&self, key: CounterKey, expected: Option<u64>, new: u64) -> StoreResult<bool> {
        if self.lose_counter_swaps.load(Ordering::SeqCst) {
            self.swaps_lost.fetch_add(1, Ordering::SeqCst);
            return Ok(false);
        }
        self.inner.compare_and_swap_counter(key, expected, new)
    }
}

impl<S: IdentityStore> IdentityStore for FaultyStore<S> {
    fn find_identity(&self, email: &str, confidential: bool) -> StoreResult<Option<SubmitterRecord>> {
        self.inner.find_identity(email, confidential)
    }

    fn upsert_identity(
        &self,
        email: &str,
        confidential: bool,
        profile: &SubmitterProfile,
        at: DateTime<Utc>,
    ) -> StoreResult<SubmitterRecord> {
        self.inner.upsert_identity(email, confidential, profile, at)
    }

    fn get_identity(&self, id: SubmitterId) -> StoreResult<Option<SubmitterRecord>> {
        self.inner.get_identity(id)
    }

    fn identities_by_email(&self, email: &str) -> StoreResult<Vec<SubmitterRecord>> {
        self.inner.identities_by_email(email)
    }
}

impl<S: CaseRepository> CaseRepository for FaultyStore<S> {
    fn insert_case(&self, case: NewCase, initial: HistoryDraft) -> StoreResult<(CaseRecord, HistoryRecord)> {
        self.inner.insert_case(case, initial)
    }

    fn get_case(&self, id: CaseId) -> StoreResult<Option<CaseRecord>> {
        self.inner.get_case(id)
    }

    fn get_case_by_folio(&self, folio: &str) -> StoreResult<Option<CaseRecord>> {
        self.inner.get_case_by_folio(folio)
    }

    fn list_cases_by_submitters(&self, submitters: &[SubmitterId]) -> StoreResult<Vec<CaseRecord>> {
        self.inner.list_cases_by_submitters(submitters)
    }

    fn list_cases(&self, filter: &CaseFilter) -> StoreResult<Vec<CaseRecord>> {
        self.inner.list_cases(filter)
    }

    fn update_cached_status(&self, id: CaseId, status: CaseStatus, seq: u64) -> StoreResult<bool> {
        if self.fail_cache_updates.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("cache writes disabled".into()));
        }
        self.inner.update_cached_status(id, status, seq)
    }
}

impl<S: HistoryStore> HistoryStore for FaultyStore<S> {
    fn append_history(&self, draft: HistoryDraft, expected_head: Option<u64>) -> StoreResult<HistoryRecord> {
        self.inner.append_history(draft, expected_head)
    }

    fn list_history(&self, case_id: CaseId) -> StoreResult<Vec<HistoryRecord>> {
        self.inner.list_history(case_id)
    }

    fn history_head(&self, case_id: CaseId) -> StoreResult<Option<HistoryRecord>> {
        self.inner.history_head(case_id)
    }
}
