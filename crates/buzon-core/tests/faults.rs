//! Recovery from partial writes, tampering and lost races

use buzon_core::{AllocationConfig, DeskConfig, DeskError, TransitionRequest, Viewer};
use buzon_model::CaseStatus;
use buzon_store::{CaseFilter, CaseRepository, StoreError};
use buzon_test_utils::{commendation, contact_complaint, faulty_desk, memory_desk};
use pretty_assertions::assert_eq;

#[test]
fn failed_cache_update_is_repaired_by_next_read() {
    let (store, desk) = faulty_desk(DeskConfig::new());
    let receipt = desk.submit(contact_complaint("ana@unach.mx")).unwrap();

    store.fail_cache_updates(true);
    let entry = desk
        .transition(TransitionRequest::new(receipt.case_id, CaseStatus::InProgress))
        .unwrap();
    let stale = store.inner().get_case(receipt.case_id).unwrap().unwrap();
    assert_eq!(stale.status, CaseStatus::Received);

    store.fail_cache_updates(false);
    let view = desk.get_case_by_id(receipt.case_id, Viewer::Staff).unwrap();
    assert_eq!(view.status, CaseStatus::InProgress);

    let repaired = store.inner().get_case(receipt.case_id).unwrap().unwrap();
    assert_eq!(repaired.status, CaseStatus::InProgress);
    assert_eq!(repaired.status_seq, entry.seq);
    assert!(!desk.reconcile(receipt.case_id).unwrap().repaired);
}

#[test]
fn explicit_reconcile_reports_repair() {
    let (store, desk) = faulty_desk(DeskConfig::new());
    let receipt = desk.submit(commendation()).unwrap();

    store.fail_cache_updates(true);
    desk.transition(TransitionRequest::new(receipt.case_id, CaseStatus::Closed).with_notes("Shared with the team"))
        .unwrap();
    store.fail_cache_updates(false);

    let outcome = desk.reconcile(receipt.case_id).unwrap();
    assert!(outcome.repaired);
    assert_eq!(outcome.status, CaseStatus::Closed);

    // Listing by status sees the repaired cache
    let closed = desk
        .list(&CaseFilter::default().with_status(CaseStatus::Closed), Viewer::Staff)
        .unwrap();
    assert_eq!(closed.len(), 1);
}

#[test]
fn reads_serve_ledger_status_while_cache_cannot_be_repaired() {
    let (store, desk) = faulty_desk(DeskConfig::new());
    let receipt = desk.submit(commendation()).unwrap();
    let folio = receipt.folio.as_str();

    store.fail_cache_updates(true);
    desk.transition(TransitionRequest::new(receipt.case_id, CaseStatus::Closed).with_notes("Shared with the team"))
        .unwrap();

    let view = desk.get_case_by_id(receipt.case_id, Viewer::Staff).unwrap();
    assert_eq!(view.status, CaseStatus::Closed);
    assert_eq!(view.resolution_notes.as_deref(), Some("Shared with the team"));
    let summary = desk.lookup_public(folio).unwrap().unwrap();
    assert_eq!(summary.status, CaseStatus::Closed);
    let listed = desk.list(&CaseFilter::default(), Viewer::Staff).unwrap();
    assert_eq!(listed[0].status, CaseStatus::Closed);

    // The cache stays stale and the explicit repair path still reports the failure
    let stale = store.inner().get_case(receipt.case_id).unwrap().unwrap();
    assert_eq!(stale.status, CaseStatus::Received);
    let err = desk.reconcile(receipt.case_id).unwrap_err();
    assert!(matches!(err, DeskError::Storage(StoreError::Unavailable(_))));
    assert!(err.is_retryable());
}

#[test]
fn losing_every_counter_swap_surfaces_contention() {
    let config = DeskConfig::new().with_allocation(AllocationConfig {
        max_attempts: 3,
        base_backoff_ms: 0,
        max_backoff_ms: 1,
    });
    let (store, desk) = faulty_desk(config);
    store.lose_counter_swaps(true);

    let err = desk.submit(commendation()).unwrap_err();
    assert!(matches!(err, DeskError::AllocationContention { attempts: 3, .. }), "{err}");
    assert!(err.is_retryable());
    assert_eq!(store.swaps_lost(), 3);
    assert!(desk.list(&CaseFilter::default(), Viewer::Staff).unwrap().is_empty());

    store.lose_counter_swaps(false);
    let receipt = desk.submit(commendation()).unwrap();
    assert!(receipt.folio.as_str().starts_with("D0001-"));
}

#[test]
fn tampered_history_fails_verification() {
    let (store, desk) = memory_desk();
    let receipt = desk.submit(contact_complaint("ana@unach.mx")).unwrap();
    let entry = desk
        .transition(TransitionRequest::new(receipt.case_id, CaseStatus::Addressed).with_notes("Fixed"))
        .unwrap();
    assert_eq!(desk.verify_ledger(receipt.case_id).unwrap(), 2);

    assert!(store.tamper_history(receipt.case_id, entry.seq, |e| e.notes = "Nothing was done".into()));
    let err = desk.verify_ledger(receipt.case_id).unwrap_err();
    assert!(matches!(err, DeskError::LedgerCorrupted { seq, .. } if seq == entry.seq));
}

#[test]
fn unknown_cases_are_not_found() {
    let (_, desk) = memory_desk();
    let ghost = buzon_model::CaseId::new();
    assert!(matches!(desk.history(ghost), Err(DeskError::NotFound(_))));
    assert!(matches!(desk.reconcile(ghost), Err(DeskError::NotFound(_))));
    assert!(matches!(desk.verify_ledger(ghost), Err(DeskError::NotFound(_))));
    assert!(matches!(
        desk.transition(TransitionRequest::new(ghost, CaseStatus::InProgress)),
        Err(DeskError::NotFound(_))
    ));
}
