//! Error types for the case desk
//!
//! One taxonomy for every desk operation:
//! - Validation failures, never retried and surfaced verbatim
//! - Contention failures, retried internally to a bound and then surfaced
//!   as retryable
//! - Storage and configuration failures

use buzon_model::{CaseId, CaseStatus, Channel, FolioError, Year};
use buzon_store::StoreError;

/// Main desk error type
#[derive(Debug, thiserror::Error)]
pub enum DeskError {
    /// Both confidential and contact-authorized were requested
    #[error("a submission cannot be both confidential and contact-authorized")]
    ConflictingPrivacyFlags,

    /// Neither privacy mode was chosen
    #[error("a submission must choose confidential or contact-authorized")]
    MissingPrivacyChoice,

    /// Contact was authorized without an email to contact
    #[error("contact-authorized submissions require an email")]
    MissingContactEmail,

    /// Optimistic allocation lost every attempt
    #[error("could not allocate a consecutive for {channel}/{year} after {attempts} attempts")]
    AllocationContention {
        channel: Channel,
        year: Year,
        attempts: u32,
    },

    /// Folio does not follow the grammar
    #[error(transparent)]
    MalformedFolio(#[from] FolioError),

    /// Move not allowed by the workflow
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: CaseStatus, to: CaseStatus },

    /// Resolution statuses need notes
    #[error("moving a case to {to} requires resolution notes")]
    MissingResolutionNotes { to: CaseStatus },

    /// No such case
    #[error("case not found: {0}")]
    NotFound(String),

    /// Submission content rejected
    #[error("invalid submission: {0}")]
    InvalidSubmission(String),

    /// Attachment rejected by policy
    #[error("attachment rejected: {0}")]
    AttachmentRejected(String),

    /// Transitions on the same case kept racing
    #[error("case {case_id} changed concurrently; gave up after {attempts} attempts")]
    ConcurrentModification { case_id: CaseId, attempts: u32 },

    /// History hash chain does not verify
    #[error("ledger of case {case_id} is corrupted at seq {seq}")]
    LedgerCorrupted { case_id: CaseId, seq: u64 },

    /// Storage failure
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl DeskError {
    /// Check if the caller may retry the same request
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::AllocationContention { .. } | Self::ConcurrentModification { .. } => true,
            Self::Storage(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Check if the request itself was rejected
    #[inline]
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::ConflictingPrivacyFlags
                | Self::MissingPrivacyChoice
                | Self::MissingContactEmail
                | Self::MalformedFolio(_)
                | Self::InvalidTransition { .. }
                | Self::MissingResolutionNotes { .. }
                | Self::InvalidSubmission(_)
                | Self::AttachmentRejected(_)
        )
    }

    #[inline]
    pub(crate) fn invalid_submission(reason: impl Into<String>) -> Self {
        Self::InvalidSubmission(reason.into())
    }
}

/// Result alias for desk operations
pub type DeskResult<T> = Result<T, DeskError>;
