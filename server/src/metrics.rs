//! Business metrics for the Gatepass engine.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `gatepass_validation_attempts_total{outcome}` - Validation attempts by outcome
//! - `gatepass_payment_notifications_total{result}` - Gateway notifications by result
//! - `gatepass_payment_anomalies_total` - Conflicting payment states for resolved tickets
//! - `gatepass_audit_append_failures_total` - Audit appends that failed (outcome unaffected)
//! - `ticket_store.redeemed` - Winning conditional redemption updates
//! - `ticket_store.audit.appended{outcome}` - Audit rows written

use metrics::describe_counter;

/// Initialize and register all business metrics descriptions.
///
/// This should be called once at application startup, before any metrics
/// are recorded.
pub fn register_business_metrics() {
    describe_counter!(
        "gatepass_validation_attempts_total",
        "Total validation attempts by outcome (validated, already_used, not_paid, not_found, malformed)"
    );
    describe_counter!(
        "gatepass_payment_notifications_total",
        "Total gateway payment notifications by result (applied, unknown_reference)"
    );
    describe_counter!(
        "gatepass_payment_anomalies_total",
        "Gateway notifications that conflicted with an already-resolved payment state"
    );
    describe_counter!(
        "gatepass_audit_append_failures_total",
        "Validation audit appends that failed without affecting the outcome"
    );
    describe_counter!(
        "ticket_store.redeemed",
        "Tickets redeemed via the conditional update"
    );
    describe_counter!(
        "ticket_store.audit.appended",
        "Validation attempt rows appended to the audit log"
    );

    tracing::info!("Business metrics registered");
}
