//! Case status state machine
//!
//! ```text
//! Received   ──► InProgress | Addressed | Closed
//! InProgress ──► Addressed | Closed
//! Addressed  ──► Closed
//! ```
//!
//! Re-affirming the current status of an open case is allowed so staff can
//! update notes or priority. Nothing leaves `Closed`.

use crate::error::DeskError;
use buzon_model::CaseStatus;

/// Validates a status transition.
pub fn validate_transition(from: CaseStatus, to: CaseStatus) -> Result<(), DeskError> {
    if allowed(from, to) {
        Ok(())
    } else {
        Err(DeskError::InvalidTransition { from, to })
    }
}

pub fn allowed_transitions(from: CaseStatus) -> Vec<CaseStatus> {
    use CaseStatus::*;
    match from {
        Received => vec![Received, InProgress, Addressed, Closed],
        InProgress => vec![InProgress, Addressed, Closed],
        Addressed => vec![Addressed, Closed],
        Closed => vec![],
    }
}

fn allowed(from: CaseStatus, to: CaseStatus) -> bool {
    allowed_transitions(from).into_iter().any(|s| s == to)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_status() -> impl Strategy<Value = CaseStatus> {
        prop_oneof![
            Just(CaseStatus::Received),
            Just(CaseStatus::InProgress),
            Just(CaseStatus::Addressed),
            Just(CaseStatus::Closed),
        ]
    }

    #[test]
    fn forward_path_is_allowed() {
        assert!(validate_transition(CaseStatus::Received, CaseStatus::InProgress).is_ok());
        assert!(validate_transition(CaseStatus::InProgress, CaseStatus::Addressed).is_ok());
        assert!(validate_transition(CaseStatus::Addressed, CaseStatus::Closed).is_ok());
        assert!(validate_transition(CaseStatus::Received, CaseStatus::Closed).is_ok());
    }

    #[test]
    fn backward_moves_are_rejected() {
        assert!(matches!(
            validate_transition(CaseStatus::Addressed, CaseStatus::InProgress),
            Err(DeskError::InvalidTransition {
                from: CaseStatus::Addressed,
                to: CaseStatus::InProgress
            })
        ));
        assert!(validate_transition(CaseStatus::InProgress, CaseStatus::Received).is_err());
    }

    proptest! {
        #[test]
        fn closed_is_terminal(to in arb_status()) {
            prop_assert!(validate_transition(CaseStatus::Closed, to).is_err());
        }

        #[test]
        fn open_statuses_can_always_close(from in arb_status()) {
            prop_assert_eq!(
                validate_transition(from, CaseStatus::Closed).is_ok(),
                !from.is_terminal()
            );
        }

        #[test]
        fn reaffirming_is_allowed_until_closed(status in arb_status()) {
            prop_assert_eq!(validate_transition(status, status).is_ok(), !status.is_terminal());
        }

        #[test]
        fn allowed_list_agrees_with_validation(from in arb_status(), to in arb_status()) {
            prop_assert_eq!(
                allowed_transitions(from).contains(&to),
                validate_transition(from, to).is_ok()
            );
        }
    }
}
