//! Stored records
//!
//! Timestamps are kept at microsecond precision so that every backend
//! returns exactly what it was given and history hashes stay stable.

use buzon_model::{
    BlobId, CaseId, CaseKind, CaseStatus, CategoryId, Channel, Folio, Priority, SubmitterId, Year,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use sha2::{Digest, Sha256};

/// Hash preceding the first entry of every case chain
pub const GENESIS_HASH: [u8; 32] = [0u8; 32];

/// Current time truncated to microseconds
#[must_use]
pub fn now() -> DateTime<Utc> {
    truncate_micros(Utc::now())
}

/// Drop sub-microsecond precision
#[must_use]
pub fn truncate_micros(t: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(t.timestamp_micros()).unwrap_or(t)
}

/// Sequence counter key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CounterKey {
    pub channel: Channel,
    pub year: Year,
}

impl CounterKey {
    #[inline]
    #[must_use]
    pub const fn new(channel: Channel, year: Year) -> Self {
        Self { channel, year }
    }
}

/// Optional submitter profile
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitterProfile {
    pub display_name: Option<String>,
    pub phone: Option<String>,
    pub affiliation: Option<String>,
    pub gender: Option<String>,
    pub age_range: Option<String>,
    pub campus: Option<String>,
}

impl SubmitterProfile {
    /// Apply a later submission's profile to a stored one.
    ///
    /// Contact fields present in `update` overwrite; demographic fields only
    /// fill gaps.
    pub fn merge_from(&mut self, update: &SubmitterProfile) {
        fn overwrite(slot: &mut Option<String>, value: &Option<String>) {
            if value.is_some() {
                slot.clone_from(value);
            }
        }
        fn fill(slot: &mut Option<String>, value: &Option<String>) {
            if slot.is_none() {
                slot.clone_from(value);
            }
        }

        overwrite(&mut self.display_name, &update.display_name);
        overwrite(&mut self.phone, &update.phone);
        overwrite(&mut self.affiliation, &update.affiliation);
        fill(&mut self.gender, &update.gender);
        fill(&mut self.age_range, &update.age_range);
        fill(&mut self.campus, &update.campus);
    }
}

/// Submitter identity row, unique per (email, confidential)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitterRecord {
    pub id: SubmitterId,
    pub email: String,
    pub confidential: bool,
    pub profile: SubmitterProfile,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Case row as written at intake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCase {
    pub id: CaseId,
    pub folio: Folio,
    pub kind: CaseKind,
    pub category: CategoryId,
    pub channel: Channel,
    pub year: Year,
    pub consecutive: u64,
    pub submitter: Option<SubmitterId>,
    pub description: String,
    pub area_involved: Option<String>,
    pub improvement_proposal: Option<String>,
    pub received_at: DateTime<Utc>,
}

/// Stored case with its cached status
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaseRecord {
    pub id: CaseId,
    pub folio: Folio,
    pub kind: CaseKind,
    pub category: CategoryId,
    pub channel: Channel,
    pub year: Year,
    pub consecutive: u64,
    pub submitter: Option<SubmitterId>,
    pub description: String,
    pub area_involved: Option<String>,
    pub improvement_proposal: Option<String>,
    pub received_at: DateTime<Utc>,
    /// Cached status; the ledger is authoritative
    pub status: CaseStatus,
    /// Ledger seq the cached status was taken from
    pub status_seq: u64,
}

impl CaseRecord {
    #[must_use]
    pub fn from_new(case: NewCase, status: CaseStatus, status_seq: u64) -> Self {
        Self {
            id: case.id,
            folio: case.folio,
            kind: case.kind,
            category: case.category,
            channel: case.channel,
            year: case.year,
            consecutive: case.consecutive,
            submitter: case.submitter,
            description: case.description,
            area_involved: case.area_involved,
            improvement_proposal: case.improvement_proposal,
            received_at: case.received_at,
            status,
            status_seq,
        }
    }
}

/// History entry before the ledger assigns seq and hashes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryDraft {
    pub case_id: CaseId,
    pub to_status: CaseStatus,
    pub actor: Option<String>,
    pub notes: String,
    pub priority: Option<Priority>,
    pub occurred_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Immutable ledger entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryRecord {
    pub seq: u64,
    pub case_id: CaseId,
    pub to_status: CaseStatus,
    pub actor: Option<String>,
    pub notes: String,
    pub priority: Option<Priority>,
    pub occurred_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(serialize_with = "hex_digest")]
    pub prev_hash: [u8; 32],
    #[serde(serialize_with = "hex_digest")]
    pub hash: [u8; 32],
}

impl HistoryRecord {
    /// Assign `seq`, link to the chain tip `prev` and compute the entry hash.
    ///
    /// `occurred_at` is clamped so it never precedes the tip, and
    /// `resolved_at` never precedes `occurred_at`.
    #[must_use]
    pub fn seal(draft: HistoryDraft, seq: u64, prev: Option<&HistoryRecord>) -> Self {
        let mut occurred_at = truncate_micros(draft.occurred_at);
        if let Some(tip) = prev {
            occurred_at = occurred_at.max(tip.occurred_at);
        }
        let resolved_at = draft
            .resolved_at
            .map(|t| truncate_micros(t).max(occurred_at));

        let mut record = Self {
            seq,
            case_id: draft.case_id,
            to_status: draft.to_status,
            actor: draft.actor,
            notes: draft.notes,
            priority: draft.priority,
            occurred_at,
            resolved_at,
            prev_hash: prev.map_or(GENESIS_HASH, |tip| tip.hash),
            hash: GENESIS_HASH,
        };
        record.hash = record.compute_hash();
        record
    }

    /// Recompute the hash from the stored fields
    #[must_use]
    pub fn compute_hash(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.seq.to_le_bytes());
        hasher.update(self.case_id.0.to_bytes());
        hasher.update(self.to_status.as_str().as_bytes());
        hasher.update([0]);
        hasher.update(self.actor.as_deref().unwrap_or_default().as_bytes());
        hasher.update([0]);
        hasher.update(self.notes.as_bytes());
        hasher.update([0]);
        hasher.update(self.priority.map(Priority::as_str).unwrap_or_default().as_bytes());
        hasher.update([0]);
        hasher.update(self.occurred_at.timestamp_micros().to_le_bytes());
        hasher.update(
            self.resolved_at
                .map_or(i64::MIN, |t| t.timestamp_micros())
                .to_le_bytes(),
        );
        hasher.update(self.prev_hash);
        hasher.finalize().into()
    }
}

fn hex_digest<S: Serializer>(digest: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&hex::encode(digest))
}

/// Staff listing criteria; all set fields must match
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaseFilter {
    pub kind: Option<CaseKind>,
    pub status: Option<CaseStatus>,
    pub channel: Option<Channel>,
    pub category: Option<CategoryId>,
    pub year: Option<Year>,
    pub received_from: Option<DateTime<Utc>>,
    pub received_to: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl CaseFilter {
    #[inline]
    #[must_use]
    pub fn with_kind(mut self, kind: CaseKind) -> Self {
        self.kind = Some(kind);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_status(mut self, status: CaseStatus) -> Self {
        self.status = Some(status);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_channel(mut self, channel: Channel) -> Self {
        self.channel = Some(channel);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_category(mut self, category: CategoryId) -> Self {
        self.category = Some(category);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_year(mut self, year: Year) -> Self {
        self.year = Some(year);
        self
    }

    /// Inclusive lower and exclusive upper bound on `received_at`
    #[inline]
    #[must_use]
    pub fn with_received_between(
        mut self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Self {
        self.received_from = from;
        self.received_to = to;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_page(mut self, limit: usize, offset: usize) -> Self {
        self.limit = Some(limit);
        self.offset = offset;
        self
    }

    /// Row predicate, ignoring paging
    #[must_use]
    pub fn matches(&self, case: &CaseRecord) -> bool {
        self.kind.map_or(true, |k| case.kind == k)
            && self.status.map_or(true, |s| case.status == s)
            && self.channel.map_or(true, |c| case.channel == c)
            && self.category.map_or(true, |c| case.category == c)
            && self.year.map_or(true, |y| case.year == y)
            && self.received_from.map_or(true, |t| case.received_at >= t)
            && self.received_to.map_or(true, |t| case.received_at < t)
    }
}

/// Attachment metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobRef {
    pub id: BlobId,
    pub case_id: CaseId,
    pub content_type: String,
    pub size_bytes: u64,
    /// Hex SHA-256 of the content
    pub sha256: String,
    pub stored_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(case_id: CaseId) -> HistoryDraft {
        HistoryDraft {
            case_id,
            to_status: CaseStatus::Received,
            actor: None,
            notes: String::new(),
            priority: None,
            occurred_at: now(),
            resolved_at: None,
        }
    }

    #[test]
    fn sealed_hash_covers_fields() {
        let case_id = CaseId::new();
        let record = HistoryRecord::seal(draft(case_id), 1, None);
        assert_eq!(record.hash, record.compute_hash());
        assert_eq!(record.prev_hash, GENESIS_HASH);

        let mut tampered = record.clone();
        tampered.notes = "edited".into();
        assert_ne!(tampered.compute_hash(), record.hash);

        let mut relinked = record.clone();
        relinked.prev_hash = [1u8; 32];
        assert_ne!(relinked.compute_hash(), record.hash);
    }

    #[test]
    fn seal_clamps_time_to_chain_tip() {
        let case_id = CaseId::new();
        let first = HistoryRecord::seal(draft(case_id), 1, None);
        let mut late = draft(case_id);
        late.to_status = CaseStatus::Closed;
        late.occurred_at = first.occurred_at - chrono::Duration::seconds(30);
        late.resolved_at = Some(late.occurred_at);

        let second = HistoryRecord::seal(late, 2, Some(&first));
        assert_eq!(second.occurred_at, first.occurred_at);
        assert_eq!(second.resolved_at, Some(first.occurred_at));
        assert_eq!(second.prev_hash, first.hash);
    }

    #[test]
    fn profile_merge_overwrites_contact_and_fills_demographics() {
        let mut stored = SubmitterProfile {
            display_name: Some("Ana".into()),
            phone: Some("555".into()),
            gender: Some("f".into()),
            ..SubmitterProfile::default()
        };
        let update = SubmitterProfile {
            display_name: Some("Ana María".into()),
            affiliation: Some("student".into()),
            gender: Some("x".into()),
            campus: Some("north".into()),
            ..SubmitterProfile::default()
        };
        stored.merge_from(&update);
        assert_eq!(stored.display_name.as_deref(), Some("Ana María"));
        assert_eq!(stored.phone.as_deref(), Some("555"));
        assert_eq!(stored.affiliation.as_deref(), Some("student"));
        assert_eq!(stored.gender.as_deref(), Some("f"));
        assert_eq!(stored.campus.as_deref(), Some("north"));
    }

    #[test]
    fn history_serializes_hashes_as_hex() {
        let record = HistoryRecord::seal(draft(CaseId::new()), 3, None);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["prev_hash"], hex::encode(GENESIS_HASH));
        assert_eq!(json["to_status"], "received");
    }
}
