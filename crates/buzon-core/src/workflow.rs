//! Workflow engine
//!
//! Moves a case through its statuses. Every move is one conditional ledger
//! append against the head the move was validated on; a racing writer makes
//! the append fail with a moved head, and the move is re-validated against
//! the new head. Two closes on the same case therefore never both land.
//!
//! The cached status on the case row is written after the append and is
//! allowed to fail: reads repair it from the ledger.

use crate::config::WorkflowConfig;
use crate::error::{DeskError, DeskResult};
use crate::ledger::HistoryLedger;
use crate::state_machine::validate_transition;
use buzon_model::{CaseId, CaseStatus, Priority};
use buzon_store::{now, CaseRepository, Datastore, HistoryDraft, HistoryRecord, HistoryStore, StoreError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A requested status change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRequest {
    pub case_id: CaseId,
    pub to: CaseStatus,
    pub actor: Option<String>,
    pub notes: Option<String>,
    pub priority: Option<Priority>,
}

impl TransitionRequest {
    #[must_use]
    pub fn new(case_id: CaseId, to: CaseStatus) -> Self {
        Self {
            case_id,
            to,
            actor: None,
            notes: None,
            priority: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    #[inline]
    #[must_use]
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    #[inline]
    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }
}

fn trimmed(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Applies status transitions with per-case serialization
pub struct WorkflowEngine<S: ?Sized = dyn Datastore> {
    store: Arc<S>,
    ledger: HistoryLedger<S>,
    config: WorkflowConfig,
}

impl<S: ?Sized> Clone for WorkflowEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            ledger: self.ledger.clone(),
            config: self.config,
        }
    }
}

impl<S> WorkflowEngine<S>
where
    S: CaseRepository + HistoryStore + ?Sized,
{
    #[must_use]
    pub fn new(store: Arc<S>, config: WorkflowConfig) -> Self {
        Self {
            ledger: HistoryLedger::new(Arc::clone(&store)),
            store,
            config,
        }
    }

    /// Apply `req` and return the ledger entry it produced
    ///
    /// # Errors
    /// - [`DeskError::MissingResolutionNotes`] before anything is read
    /// - [`DeskError::NotFound`] for an unknown case
    /// - [`DeskError::InvalidTransition`] against the current head
    /// - [`DeskError::ConcurrentModification`] when every attempt lost the
    ///   race for the head
    pub fn transition(&self, req: TransitionRequest) -> DeskResult<HistoryRecord> {
        let notes = trimmed(req.notes.as_deref());
        if req.to.is_resolution() && notes.is_none() {
            return Err(DeskError::MissingResolutionNotes { to: req.to });
        }

        let case_id = req.case_id;
        if self.store.get_case(case_id)?.is_none() {
            return Err(DeskError::NotFound(case_id.to_string()));
        }
        let actor = trimmed(req.actor.as_deref());

        let attempts = self.config.max_attempts;
        for attempt in 1..=attempts {
            let head = self
                .ledger
                .head(case_id)?
                .ok_or(DeskError::LedgerCorrupted { case_id, seq: 0 })?;
            validate_transition(head.to_status, req.to)?;

            let at = now();
            let draft = HistoryDraft {
                case_id,
                to_status: req.to,
                actor: actor.clone(),
                notes: notes.clone().unwrap_or_default(),
                priority: req.priority,
                occurred_at: at,
                resolved_at: req.to.is_resolution().then_some(at),
            };

            match self.ledger.append(draft, Some(head.seq)) {
                Ok(entry) => {
                    self.refresh_cache(&entry);
                    tracing::info!(
                        case_id = %case_id,
                        from = %head.to_status,
                        to = %entry.to_status,
                        seq = entry.seq,
                        "case transitioned"
                    );
                    return Ok(entry);
                }
                Err(DeskError::Storage(StoreError::HeadMoved { .. })) => {
                    tracing::debug!(case_id = %case_id, attempt, "case head moved; revalidating");
                }
                Err(e) => return Err(e),
            }
        }

        tracing::warn!(case_id = %case_id, attempts, "transition kept losing the race");
        Err(DeskError::ConcurrentModification { case_id, attempts })
    }

    fn refresh_cache(&self, entry: &HistoryRecord) {
        if let Err(e) = self
            .store
            .update_cached_status(entry.case_id, entry.to_status, entry.seq)
        {
            tracing::warn!(
                case_id = %entry.case_id,
                seq = entry.seq,
                error = %e,
                "cached status not updated; reads will repair it"
            );
        }
    }
}
