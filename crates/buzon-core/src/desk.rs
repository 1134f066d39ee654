//! Case desk
//!
//! The one entry point callers use. A submission flows through the identity
//! resolver, the sequence allocator and the folio formatter before the case
//! store persists it with its `Received` entry; staff actions go through the
//! workflow engine.

use crate::cases::{CaseStore, CaseView, PublicCaseSummary, ReconcileOutcome, Viewer};
use crate::config::DeskConfig;
use crate::error::{DeskError, DeskResult};
use crate::identity::{normalize_email, validate_choice, IdentityResolver, PrivacyChoice};
use crate::ledger::HistoryLedger;
use crate::sequence::SequenceAllocator;
use crate::workflow::{TransitionRequest, WorkflowEngine};
use buzon_model::{
    category_by_id, CaseId, CaseKind, CaseStatus, CategoryId, Channel, Folio, FolioFormatter, FolioParts,
    Year,
};
use buzon_store::{
    now, truncate_micros, BlobRef, BlobStore, CaseFilter, Datastore, HistoryDraft, HistoryRecord,
    IdentityStore, NewCase, SubmitterProfile, SubmitterRecord,
};
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// What a self-service caller has shown about the email it presents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailAccess {
    /// Only typed the address
    Unverified,
    /// Ownership confirmed by the external authentication service
    VerifiedOwner,
    /// Privileged disclosure path
    Privileged,
}

impl EmailAccess {
    fn reaches(self, identity: &SubmitterRecord) -> bool {
        !identity.confidential || self != EmailAccess::Unverified
    }

    fn viewer(self) -> Viewer {
        match self {
            EmailAccess::Privileged => Viewer::Privileged,
            EmailAccess::Unverified | EmailAccess::VerifiedOwner => Viewer::Public,
        }
    }
}

/// A new complaint, suggestion or commendation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub channel: Channel,
    pub kind: CaseKind,
    pub category: CategoryId,
    pub description: String,
    #[serde(default)]
    pub area_involved: Option<String>,
    #[serde(default)]
    pub improvement_proposal: Option<String>,
    pub privacy: PrivacyChoice,
    #[serde(default)]
    pub profile: SubmitterProfile,
    /// Intake time; defaults to now. Physical forms keyed in later carry the
    /// date they were received.
    #[serde(default)]
    pub received_at: Option<DateTime<Utc>>,
}

impl Submission {
    #[must_use]
    pub fn new(
        channel: Channel,
        kind: CaseKind,
        category: CategoryId,
        description: impl Into<String>,
        privacy: PrivacyChoice,
    ) -> Self {
        Self {
            channel,
            kind,
            category,
            description: description.into(),
            area_involved: None,
            improvement_proposal: None,
            privacy,
            profile: SubmitterProfile::default(),
            received_at: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_area(mut self, area: impl Into<String>) -> Self {
        self.area_involved = Some(area.into());
        self
    }

    #[inline]
    #[must_use]
    pub fn with_improvement(mut self, proposal: impl Into<String>) -> Self {
        self.improvement_proposal = Some(proposal.into());
        self
    }

    #[inline]
    #[must_use]
    pub fn with_profile(mut self, profile: SubmitterProfile) -> Self {
        self.profile = profile;
        self
    }

    #[inline]
    #[must_use]
    pub fn received_at(mut self, at: DateTime<Utc>) -> Self {
        self.received_at = Some(at);
        self
    }
}

/// What the submitter gets back
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionReceipt {
    pub case_id: CaseId,
    pub folio: Folio,
    pub received_at: DateTime<Utc>,
    pub status: CaseStatus,
}

fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Front door for every case operation
pub struct CaseDesk<S: ?Sized = dyn Datastore> {
    config: DeskConfig,
    formatter: FolioFormatter,
    store: Arc<S>,
    allocator: SequenceAllocator<S>,
    identities: IdentityResolver<S>,
    cases: CaseStore<S>,
    workflow: WorkflowEngine<S>,
    ledger: HistoryLedger<S>,
    blobs: Arc<dyn BlobStore>,
}

impl<S: Datastore + ?Sized> CaseDesk<S> {
    /// # Errors
    /// [`DeskError::Config`] when `config` does not validate
    pub fn new(config: DeskConfig, store: Arc<S>, blobs: Arc<dyn BlobStore>) -> DeskResult<Self> {
        config.validate()?;
        let formatter = FolioFormatter::new(config.institution()?);
        Ok(Self {
            formatter,
            allocator: SequenceAllocator::new(Arc::clone(&store), config.allocation),
            identities: IdentityResolver::new(Arc::clone(&store), config.confidential_policy),
            cases: CaseStore::new(Arc::clone(&store)),
            workflow: WorkflowEngine::new(Arc::clone(&store), config.workflow),
            ledger: HistoryLedger::new(Arc::clone(&store)),
            store,
            blobs,
            config,
        })
    }

    #[inline]
    pub fn config(&self) -> &DeskConfig {
        &self.config
    }

    #[inline]
    pub fn formatter(&self) -> &FolioFormatter {
        &self.formatter
    }

    #[inline]
    pub fn ledger(&self) -> &HistoryLedger<S> {
        &self.ledger
    }

    /// Register a submission and issue its folio
    ///
    /// # Errors
    /// - privacy validation errors, see [`validate_choice`]
    /// - [`DeskError::InvalidSubmission`] for blank descriptions, unknown
    ///   categories, improvement fields on a commendation, or an intake year
    ///   the folio cannot encode
    /// - [`DeskError::AllocationContention`] when no consecutive could be
    ///   allocated
    pub fn submit(&self, submission: Submission) -> DeskResult<SubmissionReceipt> {
        validate_choice(&submission.privacy)?;

        let description = submission.description.trim().to_string();
        if description.is_empty() {
            return Err(DeskError::invalid_submission("description is blank"));
        }
        let category = category_by_id(submission.category).ok_or_else(|| {
            DeskError::invalid_submission(format!("unknown category {}", submission.category))
        })?;
        let area_involved = optional_text(submission.area_involved);
        let improvement_proposal = optional_text(submission.improvement_proposal);
        if !submission.kind.accepts_improvement_fields()
            && (area_involved.is_some() || improvement_proposal.is_some())
        {
            return Err(DeskError::invalid_submission(format!(
                "a {} carries no area or improvement proposal",
                submission.kind
            )));
        }
        let received_at = submission.received_at.map_or_else(now, truncate_micros);
        let year = u16::try_from(received_at.year())
            .ok()
            .and_then(|y| Year::new(y).ok())
            .ok_or_else(|| {
                DeskError::invalid_submission(format!("intake year {} is out of range", received_at.year()))
            })?;

        let decision = self
            .identities
            .resolve(&submission.privacy, &submission.profile, now())?;

        let consecutive = self.allocator.allocate(submission.channel, year)?;
        let folio = self.formatter.format(&FolioParts {
            channel: submission.channel,
            year,
            consecutive,
            category: category.code,
        })?;

        let case_id = CaseId::new();
        let (record, _) = self.cases.create(
            NewCase {
                id: case_id,
                folio,
                kind: submission.kind,
                category: category.id,
                channel: submission.channel,
                year,
                consecutive,
                submitter: decision.submitter(),
                description,
                area_involved,
                improvement_proposal,
                received_at,
            },
            HistoryDraft {
                case_id,
                to_status: CaseStatus::Received,
                actor: None,
                notes: String::new(),
                priority: None,
                occurred_at: received_at,
                resolved_at: None,
            },
        )?;

        tracing::info!(
            case_id = %record.id,
            folio = %record.folio,
            kind = %record.kind,
            channel = %record.channel,
            year = %year,
            identity = decision.mode(),
            "case received"
        );
        Ok(SubmissionReceipt {
            case_id: record.id,
            folio: record.folio,
            received_at: record.received_at,
            status: record.status,
        })
    }

    /// Apply a status transition
    ///
    /// # Errors
    /// See [`WorkflowEngine::transition`]
    pub fn transition(&self, req: TransitionRequest) -> DeskResult<HistoryRecord> {
        self.workflow.transition(req)
    }

    /// Resolve a folio to its case id
    ///
    /// # Errors
    /// [`DeskError::MalformedFolio`] or [`DeskError::NotFound`]
    pub fn case_id_for_folio(&self, folio: &str) -> DeskResult<CaseId> {
        self.formatter.parse(folio)?;
        self.cases
            .find_by_folio(folio)?
            .map(|record| record.id)
            .ok_or_else(|| DeskError::NotFound(folio.to_string()))
    }

    /// Public folio lookup; `Ok(None)` when no case carries the folio
    ///
    /// # Errors
    /// [`DeskError::MalformedFolio`] when `folio` is not a folio at all
    pub fn lookup_public(&self, folio: &str) -> DeskResult<Option<PublicCaseSummary>> {
        self.formatter.parse(folio)?;
        self.cases.public_summary(folio)
    }

    /// Case view by folio for `viewer`
    pub fn get_case(&self, folio: &str, viewer: Viewer) -> DeskResult<CaseView> {
        self.formatter.parse(folio)?;
        self.cases.get_by_folio(folio, viewer)
    }

    pub fn get_case_by_id(&self, case_id: CaseId, viewer: Viewer) -> DeskResult<CaseView> {
        self.cases.get_by_id(case_id, viewer)
    }

    pub fn list(&self, filter: &CaseFilter, viewer: Viewer) -> DeskResult<Vec<CaseView>> {
        self.cases.list_all(filter, viewer)
    }

    /// Self-service listing for whoever presents `email`.
    ///
    /// Confidential identities registered under the email count only when
    /// `access` proves ownership of it or comes from the privileged
    /// disclosure path. Submitter fields appear only for
    /// [`EmailAccess::Privileged`].
    pub fn cases_for_email(&self, email: &str, access: EmailAccess) -> DeskResult<Vec<CaseView>> {
        let email = normalize_email(email);
        if email.is_empty() {
            return Err(DeskError::MissingContactEmail);
        }
        let ids: Vec<_> = self
            .store
            .identities_by_email(&email)?
            .into_iter()
            .filter(|identity| access.reaches(identity))
            .map(|identity| identity.id)
            .collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.cases.list_by_submitters(&ids, access.viewer())
    }

    /// Ledger entries in (`occurred_at`, `seq`) order
    pub fn history(&self, case_id: CaseId) -> DeskResult<Vec<HistoryRecord>> {
        self.cases.require(case_id)?;
        self.ledger.list_for_case(case_id)
    }

    pub fn reconcile(&self, case_id: CaseId) -> DeskResult<ReconcileOutcome> {
        self.cases.reconcile(case_id)
    }

    /// Verify the case's hash chain, returning the entry count
    pub fn verify_ledger(&self, case_id: CaseId) -> DeskResult<usize> {
        self.cases.require(case_id)?;
        self.ledger.verify_chain(case_id)
    }

    /// Store an attachment for a case
    ///
    /// # Errors
    /// [`DeskError::AttachmentRejected`] when the content is empty, too
    /// large, of a disallowed type, or the case already holds
    /// `attachments.max_per_case` files
    pub async fn attach(&self, case_id: CaseId, content_type: &str, bytes: Vec<u8>) -> DeskResult<BlobRef> {
        self.cases.require(case_id)?;
        let policy = &self.config.attachments;
        let content_type = content_type.trim().to_ascii_lowercase();

        if bytes.is_empty() {
            return Err(DeskError::AttachmentRejected("attachment is empty".into()));
        }
        let size = u64::try_from(bytes.len()).unwrap_or(u64::MAX);
        if size > policy.max_bytes {
            return Err(DeskError::AttachmentRejected(format!(
                "{size} bytes exceeds the {} byte limit",
                policy.max_bytes
            )));
        }
        if !policy.allows(&content_type) {
            return Err(DeskError::AttachmentRejected(format!(
                "content type {content_type} is not allowed"
            )));
        }
        // TODO: the count check and the put are not atomic; two racing
        // uploads can both pass at max_per_case - 1
        let existing = self.blobs.list_blobs(case_id).await?.len();
        if existing >= policy.max_per_case {
            return Err(DeskError::AttachmentRejected(format!(
                "case already has {existing} attachments"
            )));
        }

        let blob = self.blobs.put_blob(case_id, &content_type, bytes).await?;
        tracing::info!(
            case_id = %case_id,
            blob_id = %blob.id,
            size_bytes = blob.size_bytes,
            content_type = %blob.content_type,
            "attachment stored"
        );
        Ok(blob)
    }

    pub async fn attachments(&self, case_id: CaseId) -> DeskResult<Vec<BlobRef>> {
        self.cases.require(case_id)?;
        Ok(self.blobs.list_blobs(case_id).await?)
    }
}
