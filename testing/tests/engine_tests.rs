//! Scenario tests for the redemption coordinator and payment reconciler.
//!
//! These drive the full engine against the in-memory store, covering the
//! contended paths: duplicate webhook delivery, concurrent redemption
//! attempts on the same code, and the payment gate.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)] // Test code can use unwrap/expect

use chrono::Utc;
use gatepass_core::{
    ExternalPaymentRef, PaymentNotification, PaymentReconciler, PaymentState,
    ReconcileOutcome, RedemptionCoordinator, StoreError, ValidationOutcome, ValidationRequest,
    ValidatorId,
};
use gatepass_testing::fixtures;
use gatepass_testing::mocks::{FailingAuditLog, FixedClock, InMemoryAuditLog, InMemoryTicketStore};
use std::sync::Arc;

fn coordinator(
    store: &Arc<InMemoryTicketStore>,
    audit: &Arc<InMemoryAuditLog>,
) -> RedemptionCoordinator {
    RedemptionCoordinator::new(
        store.clone(),
        audit.clone(),
        Arc::new(FixedClock::now()),
    )
}

fn reconciler(store: &Arc<InMemoryTicketStore>) -> PaymentReconciler {
    PaymentReconciler::new(store.clone())
}

fn request(validator: &str) -> ValidationRequest {
    ValidationRequest {
        code: None,
        security_code: None,
        qr_payload: None,
        validator_id: ValidatorId::new(validator),
    }
}

fn code_request(code: &str, validator: &str) -> ValidationRequest {
    ValidationRequest {
        code: Some(code.to_string()),
        ..request(validator)
    }
}

fn notification(reference: &str, status: &str) -> PaymentNotification {
    PaymentNotification {
        external_payment_ref: ExternalPaymentRef::new(format!("mp-{reference}")),
        external_reference: reference.to_string(),
        status: status.to_string(),
        paid_at: Some(Utc::now()),
    }
}

// ============================================================================
// Redemption scenarios
// ============================================================================

#[tokio::test]
async fn first_validation_redeems_second_is_already_used() {
    let store = InMemoryTicketStore::shared();
    let audit = InMemoryAuditLog::shared();
    store.insert(fixtures::approved_ticket("CS-100001"));
    let engine = coordinator(&store, &audit);

    let first = engine.submit(code_request("CS-100001", "Ana")).await.unwrap();
    assert_eq!(first.outcome, ValidationOutcome::Validated);
    let summary = first.ticket.expect("validated response carries the ticket");
    assert_eq!(summary.code.as_str(), "CS-100001");
    assert_eq!(summary.state, "used");

    let stored = store.get_by_code("CS-100001").unwrap();
    assert!(stored.redeemed_at.is_some());
    assert_eq!(stored.redeemed_by, Some(ValidatorId::new("Ana")));

    let second = engine.submit(code_request("CS-100001", "Bruno")).await.unwrap();
    assert_eq!(second.outcome, ValidationOutcome::AlreadyUsed);
    assert!(second.ticket.is_none());

    let outcomes: Vec<ValidationOutcome> =
        audit.attempts().iter().map(|a| a.outcome).collect();
    assert_eq!(
        outcomes,
        [ValidationOutcome::Validated, ValidationOutcome::AlreadyUsed]
    );
}

#[tokio::test]
async fn pending_ticket_is_not_paid_and_stays_unused() {
    let store = InMemoryTicketStore::shared();
    let audit = InMemoryAuditLog::shared();
    store.insert(fixtures::pending_ticket("CS-100002"));
    let engine = coordinator(&store, &audit);

    let response = engine.submit(code_request("CS-100002", "Ana")).await.unwrap();
    assert_eq!(response.outcome, ValidationOutcome::NotPaid);
    assert!(response.ticket.is_none());
    assert!(store.get_by_code("CS-100002").unwrap().redeemed_at.is_none());

    let attempts = audit.attempts();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].outcome, ValidationOutcome::NotPaid);
    assert_eq!(attempts[0].ticket_code, "CS-100002");
}

#[tokio::test]
async fn qr_url_payload_resolves_and_redeems() {
    let store = InMemoryTicketStore::shared();
    let audit = InMemoryAuditLog::shared();
    store.insert(fixtures::approved_ticket("CS-100003"));
    let engine = coordinator(&store, &audit);

    let response = engine
        .submit(ValidationRequest {
            qr_payload: Some("https://example/x?codigo=CS-100003".to_string()),
            ..request("Ana")
        })
        .await
        .unwrap();
    assert_eq!(response.outcome, ValidationOutcome::Validated);
}

#[tokio::test]
async fn delimited_qr_payload_resolves_by_internal_id() {
    let store = InMemoryTicketStore::shared();
    let audit = InMemoryAuditLog::shared();
    let ticket = fixtures::approved_ticket("CS-100004");
    let id = ticket.id;
    store.insert(ticket);
    let engine = coordinator(&store, &audit);

    let response = engine
        .submit(ValidationRequest {
            qr_payload: Some(format!("gate-a|{id}")),
            ..request("Ana")
        })
        .await
        .unwrap();
    assert_eq!(response.outcome, ValidationOutcome::Validated);
}

#[tokio::test]
async fn security_code_lookup_redeems_and_persists_derived_code() {
    let store = InMemoryTicketStore::shared();
    let audit = InMemoryAuditLog::shared();
    store.insert(fixtures::approved_ticket("CS-100005"));
    let engine = coordinator(&store, &audit);

    let response = engine
        .submit(ValidationRequest {
            security_code: Some("100005".to_string()),
            ..request("Ana")
        })
        .await
        .unwrap();
    assert_eq!(response.outcome, ValidationOutcome::Validated);

    // First validation use persisted the derived code.
    let stored = store.get_by_code("CS-100005").unwrap();
    assert_eq!(stored.security_code.map(|c| c.as_str().to_string()), Some("100005".to_string()));
}

#[tokio::test]
async fn unknown_code_is_not_found_and_audited() {
    let store = InMemoryTicketStore::shared();
    let audit = InMemoryAuditLog::shared();
    let engine = coordinator(&store, &audit);

    let response = engine.submit(code_request("CS-999999", "Ana")).await.unwrap();
    assert_eq!(response.outcome, ValidationOutcome::NotFound);

    let attempts = audit.attempts();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].ticket_code, "CS-999999");
}

#[tokio::test]
async fn uninterpretable_request_is_malformed_and_audited() {
    let store = InMemoryTicketStore::shared();
    let audit = InMemoryAuditLog::shared();
    let engine = coordinator(&store, &audit);

    let response = engine
        .submit(ValidationRequest {
            qr_payload: Some("lorem ipsum".to_string()),
            ..request("Ana")
        })
        .await
        .unwrap();
    assert_eq!(response.outcome, ValidationOutcome::Malformed);
    assert_eq!(audit.attempts()[0].outcome, ValidationOutcome::Malformed);
}

#[tokio::test]
async fn audit_failure_never_changes_a_decided_outcome() {
    let store = InMemoryTicketStore::shared();
    store.insert(fixtures::approved_ticket("CS-100006"));
    let engine = RedemptionCoordinator::new(
        store.clone(),
        Arc::new(FailingAuditLog),
        Arc::new(FixedClock::now()),
    );

    let response = engine.submit(code_request("CS-100006", "Ana")).await.unwrap();
    assert_eq!(response.outcome, ValidationOutcome::Validated);
    assert!(store.get_by_code("CS-100006").unwrap().redeemed_at.is_some());
}

#[tokio::test]
async fn store_outage_is_an_error_not_an_outcome() {
    let store = InMemoryTicketStore::shared();
    let audit = InMemoryAuditLog::shared();
    store.insert(fixtures::approved_ticket("CS-100007"));
    store.set_unavailable(true);
    let engine = coordinator(&store, &audit);

    let result = engine.submit(code_request("CS-100007", "Ana")).await;
    assert!(matches!(result, Err(StoreError::Unavailable(_))));
    // An infrastructure failure is not evidence the ticket is invalid:
    // nothing is audited.
    assert!(audit.is_empty());
}

#[tokio::test]
async fn duplicate_codes_halt_with_integrity_violation() {
    let store = InMemoryTicketStore::shared();
    let audit = InMemoryAuditLog::shared();
    store.insert(fixtures::approved_ticket("CS-100008"));
    store.insert(fixtures::approved_ticket("CS-100008"));
    let engine = coordinator(&store, &audit);

    let result = engine.submit(code_request("CS-100008", "Ana")).await;
    assert!(matches!(result, Err(StoreError::Integrity(_))));
    assert!(audit.is_empty());
}

// ============================================================================
// Concurrency: at-most-once redemption
// ============================================================================

/// 100 concurrent validation attempts for the same ticket.
///
/// Exactly one attempt observes `Validated`; the other 99 observe
/// `AlreadyUsed`; every attempt is audited.
#[tokio::test]
async fn concurrent_validations_redeem_at_most_once() {
    let store = InMemoryTicketStore::shared();
    let audit = InMemoryAuditLog::shared();
    store.insert(fixtures::approved_ticket("CS-200001"));
    let engine = Arc::new(coordinator(&store, &audit));

    let mut handles = Vec::new();
    for i in 0..100 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine
                .submit(code_request("CS-200001", &format!("validator-{i}")))
                .await
                .expect("validation must not error")
                .outcome
        }));
    }

    let mut validated = 0;
    let mut already_used = 0;
    for handle in handles {
        match handle.await.expect("task must not panic") {
            ValidationOutcome::Validated => validated += 1,
            ValidationOutcome::AlreadyUsed => already_used += 1,
            other => panic!("unexpected outcome {other}"),
        }
    }

    assert_eq!(validated, 1, "exactly one caller wins the redemption");
    assert_eq!(already_used, 99);
    assert_eq!(audit.len(), 100, "every attempt is audited");
    assert!(store.get_by_code("CS-200001").unwrap().redeemed_at.is_some());
}

// ============================================================================
// Payment reconciliation
// ============================================================================

#[tokio::test]
async fn approved_notification_transitions_pending_ticket() {
    let store = InMemoryTicketStore::shared();
    store.insert(fixtures::pending_ticket("CS-300001"));
    let engine = reconciler(&store);

    let outcome = engine.submit(notification("CS-300001", "approved")).await.unwrap();
    assert!(matches!(outcome, ReconcileOutcome::Applied { state: PaymentState::Approved, .. }));

    let stored = store.get_by_code("CS-300001").unwrap();
    assert_eq!(stored.payment_state, PaymentState::Approved);
    assert!(stored.paid_at.is_some());
    assert!(stored.external_payment_ref.is_some());
}

#[tokio::test]
async fn replayed_approval_is_a_no_op() {
    let store = InMemoryTicketStore::shared();
    store.insert(fixtures::pending_ticket("CS-300002"));
    let engine = reconciler(&store);

    engine.submit(notification("CS-300002", "approved")).await.unwrap();
    let after_first = store.get_by_code("CS-300002").unwrap();

    // Same terminal status again, with a different gateway timestamp.
    let mut replay = notification("CS-300002", "approved");
    replay.paid_at = Some(Utc::now() + chrono::Duration::hours(1));
    engine.submit(replay).await.unwrap();

    let after_replay = store.get_by_code("CS-300002").unwrap();
    assert_eq!(after_first, after_replay, "paid_at is set once, not overwritten");
}

#[tokio::test]
async fn unknown_reference_is_acknowledged_and_discarded() {
    let store = InMemoryTicketStore::shared();
    store.insert(fixtures::pending_ticket("CS-300003"));
    let engine = reconciler(&store);

    let outcome = engine.submit(notification("CS-999999", "approved")).await.unwrap();
    assert_eq!(outcome, ReconcileOutcome::UnknownReference);

    // This event never reached ticket-level logic.
    let stored = store.get_by_code("CS-300003").unwrap();
    assert_eq!(stored.payment_state, PaymentState::Pending);
}

#[tokio::test]
async fn conflicting_terminal_status_wins_last() {
    let store = InMemoryTicketStore::shared();
    store.insert(fixtures::pending_ticket("CS-300004"));
    let engine = reconciler(&store);

    engine.submit(notification("CS-300004", "approved")).await.unwrap();
    engine.submit(notification("CS-300004", "rejected")).await.unwrap();

    let stored = store.get_by_code("CS-300004").unwrap();
    assert_eq!(stored.payment_state, PaymentState::Rejected);
}

#[tokio::test]
async fn resolved_state_never_returns_to_pending() {
    let store = InMemoryTicketStore::shared();
    store.insert(fixtures::pending_ticket("CS-300005"));
    let engine = reconciler(&store);

    engine.submit(notification("CS-300005", "approved")).await.unwrap();
    // An unrecognized gateway status normalizes to Pending; it must not
    // un-resolve the ticket.
    engine.submit(notification("CS-300005", "some_new_status")).await.unwrap();

    let stored = store.get_by_code("CS-300005").unwrap();
    assert_eq!(stored.payment_state, PaymentState::Approved);
}

#[tokio::test]
async fn payment_gate_always_rejects_unpaid_tickets() {
    let store = InMemoryTicketStore::shared();
    let audit = InMemoryAuditLog::shared();
    let ticket = fixtures::pending_ticket("CS-300006");
    store.insert(ticket);
    let engine = coordinator(&store, &audit);

    for _ in 0..3 {
        let response = engine.submit(code_request("CS-300006", "Ana")).await.unwrap();
        assert_eq!(response.outcome, ValidationOutcome::NotPaid);
    }
    assert!(store.get_by_code("CS-300006").unwrap().redeemed_at.is_none());
}
