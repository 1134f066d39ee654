//! Buzón Core - the case desk
//!
//! Everything between a submission form and the ledger:
//! - Resolves the submitter's privacy choice into an identity decision
//! - Allocates the folio consecutive per (channel, year) without duplicates
//! - Persists cases with their first history entry
//! - Serves reads with privacy redaction and cache reconciliation
//! - Moves cases through the status workflow, one writer per case at a time
//!
//! # Example
//!
//! ```rust
//! use buzon_core::{CaseDesk, DeskConfig, PrivacyChoice, Submission, TransitionRequest};
//! use buzon_model::{CaseKind, CaseStatus, CategoryId, Channel};
//! use buzon_store::{InMemoryStore, MemoryBlobStore};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), buzon_core::DeskError> {
//! let desk = CaseDesk::new(
//!     DeskConfig::new(),
//!     Arc::new(InMemoryStore::new()),
//!     Arc::new(MemoryBlobStore::new()),
//! )?;
//!
//! let receipt = desk.submit(Submission::new(
//!     Channel::Digital,
//!     CaseKind::Complaint,
//!     CategoryId(1),
//!     "Grades were published late",
//!     PrivacyChoice::contact_authorized("ana@unach.mx"),
//! ))?;
//!
//! desk.transition(
//!     TransitionRequest::new(receipt.case_id, CaseStatus::Closed).with_notes("Published"),
//! )?;
//! let summary = desk.lookup_public(receipt.folio.as_str())?;
//! assert_eq!(summary.map(|s| s.status), Some(CaseStatus::Closed));
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod cases;
pub mod config;
pub mod desk;
pub mod error;
pub mod identity;
pub mod ledger;
pub mod sequence;
pub mod state_machine;
pub mod workflow;

// Re-exports for convenience
pub use cases::{CaseStore, CaseView, PublicCaseSummary, ReconcileOutcome, SubmitterView, Viewer};
pub use config::{
    AllocationConfig, AttachmentConfig, ConfidentialPolicy, DeskConfig, StorageConfig, WorkflowConfig,
};
pub use desk::{CaseDesk, EmailAccess, Submission, SubmissionReceipt};
pub use error::{DeskError, DeskResult};
pub use identity::{normalize_email, validate_choice, IdentityDecision, IdentityResolver, PrivacyChoice};
pub use ledger::{current_priority, latest_resolution, HistoryLedger};
pub use sequence::SequenceAllocator;
pub use state_machine::{allowed_transitions, validate_transition};
pub use workflow::{TransitionRequest, WorkflowEngine};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
