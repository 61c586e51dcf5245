//! HTTP API contract tests.
//!
//! These drive the handlers directly over in-memory engine doubles,
//! verifying the HTTP contract: validation responses always carry a
//! distinguishable outcome label and reason, and the payment webhook is
//! always a bare acknowledgment except on store outage.

#![allow(clippy::expect_used, clippy::unwrap_used)] // Test code can use unwrap/expect

use axum::extract::{Json, State};
use axum::http::StatusCode;
use gatepass_core::{PaymentReconciler, RedemptionCoordinator, ValidationOutcome};
use gatepass_server::api::notifications::{
    PaymentNotificationRequest, submit_notification,
};
use gatepass_server::api::validations::{ValidateTicketRequest, submit_validation};
use gatepass_server::{AppState, build_router};
use gatepass_testing::fixtures;
use gatepass_testing::mocks::{FixedClock, InMemoryAuditLog, InMemoryTicketStore};
use std::sync::Arc;

fn app_state(store: &Arc<InMemoryTicketStore>) -> AppState {
    let audit = InMemoryAuditLog::shared();
    AppState::new(
        Arc::new(RedemptionCoordinator::new(
            store.clone(),
            audit,
            Arc::new(FixedClock::now()),
        )),
        Arc::new(PaymentReconciler::new(store.clone())),
        None,
    )
}

fn validate_request(code: &str) -> ValidateTicketRequest {
    ValidateTicketRequest {
        code: Some(code.to_string()),
        security_code: None,
        qr_payload: None,
        validator_id: "Ana".to_string(),
    }
}

#[tokio::test]
async fn router_builds_with_all_routes() {
    let store = InMemoryTicketStore::shared();
    let _router = build_router(app_state(&store));
}

#[tokio::test]
async fn validation_response_carries_outcome_and_reason() {
    let store = InMemoryTicketStore::shared();
    store.insert(fixtures::approved_ticket("CS-100001"));
    let state = app_state(&store);

    let Json(response) = submit_validation(State(state), Json(validate_request("CS-100001")))
        .await
        .expect("validation succeeds");
    assert_eq!(response.outcome, ValidationOutcome::Validated);
    assert!(!response.reason.is_empty());
    let ticket = response.ticket.expect("validated response carries ticket");
    assert_eq!(ticket.code.as_str(), "CS-100001");

    // Outcome labels are stable snake_case strings on the wire.
    let json = serde_json::to_value(&response.outcome).unwrap();
    assert_eq!(json, serde_json::json!("validated"));
}

#[tokio::test]
async fn rejections_are_outcomes_not_http_errors() {
    let store = InMemoryTicketStore::shared();
    store.insert(fixtures::pending_ticket("CS-100002"));
    let state = app_state(&store);

    let Json(response) =
        submit_validation(State(state.clone()), Json(validate_request("CS-100002")))
            .await
            .expect("not_paid is a 200 outcome");
    assert_eq!(response.outcome, ValidationOutcome::NotPaid);
    assert!(response.ticket.is_none());

    let Json(response) = submit_validation(State(state), Json(validate_request("CS-404404")))
        .await
        .expect("not_found is a 200 outcome");
    assert_eq!(response.outcome, ValidationOutcome::NotFound);
}

#[tokio::test]
async fn blank_validator_id_is_a_bad_request() {
    let store = InMemoryTicketStore::shared();
    let state = app_state(&store);

    let error = submit_validation(
        State(state),
        Json(ValidateTicketRequest {
            code: Some("CS-100001".to_string()),
            security_code: None,
            qr_payload: None,
            validator_id: "   ".to_string(),
        }),
    )
    .await
    .expect_err("blank validator is rejected");
    assert_eq!(error.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn store_outage_maps_to_service_unavailable() {
    let store = InMemoryTicketStore::shared();
    store.insert(fixtures::approved_ticket("CS-100003"));
    store.set_unavailable(true);
    let state = app_state(&store);

    let error = submit_validation(State(state), Json(validate_request("CS-100003")))
        .await
        .expect_err("outage surfaces as an error");
    assert_eq!(error.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn webhook_acknowledges_even_unknown_references() {
    let store = InMemoryTicketStore::shared();
    let state = app_state(&store);

    let Json(ack) = submit_notification(
        State(state),
        Json(PaymentNotificationRequest {
            external_payment_ref: "mp-1".to_string(),
            external_reference: "CS-404404".to_string(),
            status: "approved".to_string(),
            paid_at: None,
        }),
    )
    .await
    .expect("unknown reference is acknowledged");
    assert!(ack.ack);
}

#[tokio::test]
async fn webhook_surfaces_store_outage_for_gateway_retry() {
    let store = InMemoryTicketStore::shared();
    store.set_unavailable(true);
    let state = app_state(&store);

    let error = submit_notification(
        State(state),
        Json(PaymentNotificationRequest {
            external_payment_ref: "mp-1".to_string(),
            external_reference: "CS-100001".to_string(),
            status: "approved".to_string(),
            paid_at: None,
        }),
    )
    .await
    .expect_err("outage must make the gateway retry");
    assert_eq!(error.status(), StatusCode::SERVICE_UNAVAILABLE);
}
