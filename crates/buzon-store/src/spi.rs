//! Storage interfaces
//!
//! Every durable fact lives behind these traits:
//! - [`CounterStore`]: per (channel, year) sequence counters
//! - [`IdentityStore`]: submitter identities keyed by (email, confidential)
//! - [`CaseRepository`]: case rows and their cached status
//! - [`HistoryStore`]: the append-only, hash-chained transition ledger
//! - [`BlobStore`]: opaque attachment content
//!
//! [`Datastore`] bundles the synchronous traits for components that need
//! all of them.

use crate::error::StoreResult;
use crate::model::{
    BlobRef, CaseFilter, CaseRecord, CounterKey, HistoryDraft, HistoryRecord, NewCase,
    SubmitterProfile, SubmitterRecord,
};
use buzon_model::{BlobId, CaseId, CaseStatus, SubmitterId};
use chrono::{DateTime, Utc};

/// Sequence counters
pub trait CounterStore: Send + Sync {
    /// Whether [`CounterStore::increment_counter`] is available
    fn supports_atomic_increment(&self) -> bool;

    /// Atomically allocate the next value for `key`, starting at 1
    ///
    /// # Errors
    /// [`StoreError::Unsupported`](crate::StoreError::Unsupported) when the
    /// backend has no atomic read-modify-write
    fn increment_counter(&self, key: CounterKey) -> StoreResult<u64>;

    /// Value the next allocation would receive, `None` before the first one
    fn load_counter(&self, key: CounterKey) -> StoreResult<Option<u64>>;

    /// Replace the stored next value if it still equals `expected`.
    /// `expected == None` means "no row yet". Returns whether the swap won.
    fn compare_and_swap_counter(
        &self,
        key: CounterKey,
        expected: Option<u64>,
        new: u64,
    ) -> StoreResult<bool>;
}

/// Submitter identities
pub trait IdentityStore: Send + Sync {
    /// Look up by normalized email and confidentiality
    fn find_identity(&self, email: &str, confidential: bool) -> StoreResult<Option<SubmitterRecord>>;

    /// Lookup-or-create in one atomic step, merging `profile` into an
    /// existing row
    fn upsert_identity(
        &self,
        email: &str,
        confidential: bool,
        profile: &SubmitterProfile,
        at: DateTime<Utc>,
    ) -> StoreResult<SubmitterRecord>;

    fn get_identity(&self, id: SubmitterId) -> StoreResult<Option<SubmitterRecord>>;

    /// Every identity registered under `email`
    fn identities_by_email(&self, email: &str) -> StoreResult<Vec<SubmitterRecord>>;
}

/// Case rows
pub trait CaseRepository: Send + Sync {
    /// Persist the case and its first ledger entry in one transaction.
    ///
    /// # Errors
    /// [`StoreError::DuplicateFolio`](crate::StoreError::DuplicateFolio) when
    /// the folio was already issued; nothing is written in that case
    fn insert_case(
        &self,
        case: NewCase,
        initial: HistoryDraft,
    ) -> StoreResult<(CaseRecord, HistoryRecord)>;

    fn get_case(&self, id: CaseId) -> StoreResult<Option<CaseRecord>>;

    fn get_case_by_folio(&self, folio: &str) -> StoreResult<Option<CaseRecord>>;

    /// Cases linked to any of `submitters`, newest first
    fn list_cases_by_submitters(&self, submitters: &[SubmitterId]) -> StoreResult<Vec<CaseRecord>>;

    /// Cases matching `filter`, newest first, paged
    fn list_cases(&self, filter: &CaseFilter) -> StoreResult<Vec<CaseRecord>>;

    /// Move the cached status forward. Ignored when `seq` is not newer than
    /// the cached one; returns whether the row changed.
    fn update_cached_status(&self, id: CaseId, status: CaseStatus, seq: u64) -> StoreResult<bool>;
}

/// Append-only history ledger
pub trait HistoryStore: Send + Sync {
    /// Append if the case head is still `expected_head`.
    ///
    /// # Errors
    /// [`StoreError::HeadMoved`](crate::StoreError::HeadMoved) when another
    /// append won; nothing is written in that case
    fn append_history(
        &self,
        draft: HistoryDraft,
        expected_head: Option<u64>,
    ) -> StoreResult<HistoryRecord>;

    /// Entries for a case ordered by (`occurred_at`, `seq`)
    fn list_history(&self, case_id: CaseId) -> StoreResult<Vec<HistoryRecord>>;

    /// Latest entry for a case
    fn history_head(&self, case_id: CaseId) -> StoreResult<Option<HistoryRecord>>;
}

/// Everything a case desk needs from synchronous storage
pub trait Datastore: CounterStore + IdentityStore + CaseRepository + HistoryStore {}

impl<T> Datastore for T where T: CounterStore + IdentityStore + CaseRepository + HistoryStore {}

/// Opaque attachment storage
#[async_trait::async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` for `case_id` and return its reference
    async fn put_blob(&self, case_id: CaseId, content_type: &str, bytes: Vec<u8>) -> StoreResult<BlobRef>;

    /// References for a case in upload order
    async fn list_blobs(&self, case_id: CaseId) -> StoreResult<Vec<BlobRef>>;

    /// Content of one blob
    async fn get_blob(&self, case_id: CaseId, id: BlobId) -> StoreResult<Option<Vec<u8>>>;
}
