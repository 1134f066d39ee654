//! Case store service
//!
//! Reads go through here so that two rules hold everywhere:
//! - submitter data is shown only when the viewer may see it
//! - the status shown is the ledger's, and a drifted cache is repaired on
//!   the way out

use crate::error::{DeskError, DeskResult};
use crate::ledger::{current_priority, latest_resolution};
use buzon_model::{
    category_by_id, CaseId, CaseKind, CaseStatus, CategoryId, Channel, Folio, Priority, SubmitterId,
};
use buzon_store::{
    CaseFilter, CaseRecord, CaseRepository, Datastore, HistoryDraft, HistoryRecord, HistoryStore,
    IdentityStore, NewCase, SubmitterRecord,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

/// Who is reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Viewer {
    /// Anyone holding a folio or an email; never sees submitter data
    Public,
    /// Staff; sees non-confidential submitters
    Staff,
    /// Privileged disclosure path; sees every submitter
    Privileged,
}

impl Viewer {
    #[inline]
    #[must_use]
    pub fn may_see(self, identity: &SubmitterRecord) -> bool {
        match self {
            Viewer::Public => false,
            Viewer::Staff => !identity.confidential,
            Viewer::Privileged => true,
        }
    }
}

/// Submitter data in a case view
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmitterView {
    pub id: SubmitterId,
    pub email: String,
    pub confidential: bool,
    pub display_name: Option<String>,
    pub phone: Option<String>,
    pub affiliation: Option<String>,
    pub gender: Option<String>,
    pub age_range: Option<String>,
    pub campus: Option<String>,
}

impl From<SubmitterRecord> for SubmitterView {
    fn from(record: SubmitterRecord) -> Self {
        Self {
            id: record.id,
            email: record.email,
            confidential: record.confidential,
            display_name: record.profile.display_name,
            phone: record.profile.phone,
            affiliation: record.profile.affiliation,
            gender: record.profile.gender,
            age_range: record.profile.age_range,
            campus: record.profile.campus,
        }
    }
}

/// Case as shown to staff
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaseView {
    pub id: CaseId,
    pub folio: Folio,
    pub kind: CaseKind,
    pub category: CategoryId,
    pub category_code: String,
    pub category_label: String,
    pub channel: Channel,
    pub description: String,
    pub area_involved: Option<String>,
    pub improvement_proposal: Option<String>,
    pub received_at: DateTime<Utc>,
    pub status: CaseStatus,
    pub priority: Option<Priority>,
    pub resolution_notes: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    /// `None` when anonymous or hidden from this viewer
    pub submitter: Option<SubmitterView>,
}

/// Folio lookup result for the public
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublicCaseSummary {
    pub folio: Folio,
    pub kind: CaseKind,
    pub category_code: String,
    pub category_label: String,
    pub status: CaseStatus,
    pub received_at: DateTime<Utc>,
    pub resolution_notes: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Result of an explicit reconcile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReconcileOutcome {
    pub case_id: CaseId,
    pub status: CaseStatus,
    pub head_seq: u64,
    /// Whether the cached status had drifted and was rewritten
    pub repaired: bool,
}

fn category_names(id: CategoryId) -> (String, String) {
    category_by_id(id).map_or_else(
        || ("???".to_string(), format!("unknown category {id}")),
        |c| (c.code.to_string(), c.label.to_string()),
    )
}

/// Case reads and writes with redaction and cache reconciliation
pub struct CaseStore<S: ?Sized = dyn Datastore> {
    store: Arc<S>,
}

impl<S: ?Sized> Clone for CaseStore<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S> CaseStore<S>
where
    S: CaseRepository + HistoryStore + IdentityStore + ?Sized,
{
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Persist a case with its first ledger entry
    pub fn create(&self, case: NewCase, initial: HistoryDraft) -> DeskResult<(CaseRecord, HistoryRecord)> {
        Ok(self.store.insert_case(case, initial)?)
    }

    pub fn find_by_folio(&self, folio: &str) -> DeskResult<Option<CaseRecord>> {
        Ok(self.store.get_case_by_folio(folio)?)
    }

    /// # Errors
    /// [`DeskError::NotFound`] when no case has this id
    pub fn require(&self, id: CaseId) -> DeskResult<CaseRecord> {
        self.store
            .get_case(id)?
            .ok_or_else(|| DeskError::NotFound(id.to_string()))
    }

    /// Case view by folio
    ///
    /// # Errors
    /// [`DeskError::NotFound`] for an unknown folio
    pub fn get_by_folio(&self, folio: &str, viewer: Viewer) -> DeskResult<CaseView> {
        let record = self
            .find_by_folio(folio)?
            .ok_or_else(|| DeskError::NotFound(folio.to_string()))?;
        self.view(record, viewer)
    }

    pub fn get_by_id(&self, id: CaseId, viewer: Viewer) -> DeskResult<CaseView> {
        let record = self.require(id)?;
        self.view(record, viewer)
    }

    /// Public summary; never carries submitter data
    pub fn public_summary(&self, folio: &str) -> DeskResult<Option<PublicCaseSummary>> {
        let Some(record) = self.find_by_folio(folio)? else {
            return Ok(None);
        };
        let (record, entries) = self.with_history(record)?;
        let resolution = latest_resolution(&entries);
        let (category_code, category_label) = category_names(record.category);
        Ok(Some(PublicCaseSummary {
            folio: record.folio,
            kind: record.kind,
            category_code,
            category_label,
            status: record.status,
            received_at: record.received_at,
            resolution_notes: resolution.map(|e| e.notes.clone()),
            resolved_at: resolution.and_then(|e| e.resolved_at),
        }))
    }

    /// Cases of the given submitters, newest first
    pub fn list_by_submitters(&self, submitters: &[SubmitterId], viewer: Viewer) -> DeskResult<Vec<CaseView>> {
        self.store
            .list_cases_by_submitters(submitters)?
            .into_iter()
            .map(|record| self.view(record, viewer))
            .collect()
    }

    /// Cases matching `filter`, newest first.
    ///
    /// Status matching uses the reconciled status, so a row whose cache
    /// drifted away from the requested status is dropped after repair.
    pub fn list_all(&self, filter: &CaseFilter, viewer: Viewer) -> DeskResult<Vec<CaseView>> {
        let mut views = Vec::new();
        for record in self.store.list_cases(filter)? {
            let view = self.view(record, viewer)?;
            if filter.status.map_or(true, |s| s == view.status) {
                views.push(view);
            }
        }
        Ok(views)
    }

    /// Compare the cached status with the ledger head and repair drift
    pub fn reconcile(&self, id: CaseId) -> DeskResult<ReconcileOutcome> {
        let record = self.require(id)?;
        let head = self
            .store
            .history_head(id)?
            .ok_or(DeskError::LedgerCorrupted { case_id: id, seq: 0 })?;
        let repaired = self.repair(&record, &head)?;
        Ok(ReconcileOutcome {
            case_id: id,
            status: head.to_status,
            head_seq: head.seq,
            repaired,
        })
    }

    fn repair(&self, record: &CaseRecord, head: &HistoryRecord) -> DeskResult<bool> {
        if record.status_seq == head.seq && record.status == head.to_status {
            return Ok(false);
        }
        tracing::warn!(
            case_id = %record.id,
            folio = %record.folio,
            cached_status = %record.status,
            cached_seq = record.status_seq,
            ledger_status = %head.to_status,
            ledger_seq = head.seq,
            "cached status drifted from ledger; repairing"
        );
        self.store.update_cached_status(record.id, head.to_status, head.seq)?;
        Ok(true)
    }

    fn with_history(&self, mut record: CaseRecord) -> DeskResult<(CaseRecord, Vec<HistoryRecord>)> {
        let entries = self.store.list_history(record.id)?;
        // Last entry in (occurred_at, seq) order defines the status
        let head = entries.last().ok_or(DeskError::LedgerCorrupted {
            case_id: record.id,
            seq: 0,
        })?;
        if let Err(e) = self.repair(&record, head) {
            tracing::warn!(case_id = %record.id, error = %e, "cache repair failed; serving ledger status");
        }
        record.status = head.to_status;
        record.status_seq = head.seq;
        Ok((record, entries))
    }

    fn view(&self, record: CaseRecord, viewer: Viewer) -> DeskResult<CaseView> {
        let (record, entries) = self.with_history(record)?;

        let submitter = match record.submitter {
            Some(id) => self
                .store
                .get_identity(id)?
                .filter(|identity| viewer.may_see(identity))
                .map(SubmitterView::from),
            None => None,
        };

        let resolution = latest_resolution(&entries);
        let (category_code, category_label) = category_names(record.category);
        Ok(CaseView {
            id: record.id,
            folio: record.folio,
            kind: record.kind,
            category: record.category,
            category_code,
            category_label,
            channel: record.channel,
            description: record.description,
            area_involved: record.area_involved,
            improvement_proposal: record.improvement_proposal,
            received_at: record.received_at,
            status: record.status,
            priority: current_priority(&entries),
            resolution_notes: resolution.map(|e| e.notes.clone()),
            resolved_at: resolution.and_then(|e| e.resolved_at),
            submitter,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use buzon_model::Year;
    use buzon_store::{now, InMemoryStore, SubmitterProfile};
    use pretty_assertions::assert_eq;

    fn intake(
        cases: &CaseStore<InMemoryStore>,
        folio: &str,
        submitter: Option<SubmitterId>,
    ) -> (CaseRecord, HistoryRecord) {
        let id = CaseId::new();
        let at = now();
        cases
            .create(
                NewCase {
                    id,
                    folio: Folio::from_issued(folio),
                    kind: CaseKind::Complaint,
                    category: CategoryId(5),
                    channel: Channel::Digital,
                    year: Year::new(2025).unwrap(),
                    consecutive: 1,
                    submitter,
                    description: "rude service".into(),
                    area_involved: Some("front desk".into()),
                    improvement_proposal: None,
                    received_at: at,
                },
                HistoryDraft {
                    case_id: id,
                    to_status: CaseStatus::Received,
                    actor: None,
                    notes: String::new(),
                    priority: None,
                    occurred_at: at,
                    resolved_at: None,
                },
            )
            .unwrap()
    }

    fn identity(store: &InMemoryStore, email: &str, confidential: bool) -> SubmitterId {
        let profile = SubmitterProfile {
            display_name: Some("Dana".into()),
            ..SubmitterProfile::default()
        };
        store.upsert_identity(email, confidential, &profile, now()).unwrap().id
    }

    #[test]
    fn confidential_submitter_is_hidden_from_staff() {
        let store = Arc::new(InMemoryStore::new());
        let cases = CaseStore::new(Arc::clone(&store));
        let hidden = identity(&store, "dana@uni.mx", true);
        intake(&cases, "D0001-TRA-UNACH-25", Some(hidden));

        let staff = cases.get_by_folio("D0001-TRA-UNACH-25", Viewer::Staff).unwrap();
        assert_eq!(staff.submitter, None);
        let public = cases.get_by_folio("D0001-TRA-UNACH-25", Viewer::Public).unwrap();
        assert_eq!(public.submitter, None);

        let privileged = cases.get_by_folio("D0001-TRA-UNACH-25", Viewer::Privileged).unwrap();
        let submitter = privileged.submitter.unwrap();
        assert!(submitter.confidential);
        assert_eq!(submitter.email, "dana@uni.mx");
    }

    #[test]
    fn visible_submitter_is_shown_to_staff_only() {
        let store = Arc::new(InMemoryStore::new());
        let cases = CaseStore::new(Arc::clone(&store));
        let visible = identity(&store, "eli@uni.mx", false);
        intake(&cases, "D0002-TRA-UNACH-25", Some(visible));

        let staff = cases.get_by_folio("D0002-TRA-UNACH-25", Viewer::Staff).unwrap();
        assert_eq!(staff.submitter.unwrap().display_name.as_deref(), Some("Dana"));
        assert!(cases
            .get_by_folio("D0002-TRA-UNACH-25", Viewer::Public)
            .unwrap()
            .submitter
            .is_none());
    }

    #[test]
    fn drifted_cache_is_repaired_on_read() {
        let store = Arc::new(InMemoryStore::new());
        let cases = CaseStore::new(Arc::clone(&store));
        let (record, first) = intake(&cases, "D0003-TRA-UNACH-25", None);

        // Ledger moves without the cache following
        let at = now();
        let entry = store
            .append_history(
                HistoryDraft {
                    case_id: record.id,
                    to_status: CaseStatus::Closed,
                    actor: None,
                    notes: "apology issued".into(),
                    priority: None,
                    occurred_at: at,
                    resolved_at: Some(at),
                },
                Some(first.seq),
            )
            .unwrap();
        assert_eq!(store.get_case(record.id).unwrap().unwrap().status, CaseStatus::Received);

        let view = cases.get_by_id(record.id, Viewer::Staff).unwrap();
        assert_eq!(view.status, CaseStatus::Closed);
        assert_eq!(view.resolution_notes.as_deref(), Some("apology issued"));
        let cached = store.get_case(record.id).unwrap().unwrap();
        assert_eq!((cached.status, cached.status_seq), (CaseStatus::Closed, entry.seq));

        let outcome = cases.reconcile(record.id).unwrap();
        assert!(!outcome.repaired);
        assert_eq!(outcome.status, CaseStatus::Closed);
    }

    #[test]
    fn public_summary_of_unknown_folio_is_none() {
        let store = Arc::new(InMemoryStore::new());
        let cases = CaseStore::new(Arc::clone(&store));
        assert_eq!(cases.public_summary("D0099-TRA-UNACH-25").unwrap(), None);
        assert!(matches!(
            cases.get_by_folio("D0099-TRA-UNACH-25", Viewer::Staff),
            Err(DeskError::NotFound(_))
        ));
    }

    #[test]
    fn status_filter_uses_reconciled_status() {
        let store = Arc::new(InMemoryStore::new());
        let cases = CaseStore::new(Arc::clone(&store));
        let (record, first) = intake(&cases, "D0004-TRA-UNACH-25", None);
        intake(&cases, "D0005-TRA-UNACH-25", None);
        store
            .append_history(
                HistoryDraft {
                    case_id: record.id,
                    to_status: CaseStatus::InProgress,
                    actor: None,
                    notes: String::new(),
                    priority: Some(Priority::Low),
                    occurred_at: now(),
                    resolved_at: None,
                },
                Some(first.seq),
            )
            .unwrap();

        let received = cases
            .list_all(&CaseFilter::default().with_status(CaseStatus::Received), Viewer::Staff)
            .unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].folio.as_str(), "D0005-TRA-UNACH-25");

        let in_progress = cases
            .list_all(&CaseFilter::default().with_status(CaseStatus::InProgress), Viewer::Staff)
            .unwrap();
        assert_eq!(in_progress.len(), 1);
        assert_eq!(in_progress[0].priority, Some(Priority::Low));
    }
}
