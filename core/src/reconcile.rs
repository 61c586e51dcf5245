//! Payment reconciler: idempotent application of gateway notifications.
//!
//! Gateway webhooks are delivered at-least-once, unordered, and sometimes
//! duplicated. The reconciler normalizes the gateway's status vocabulary,
//! resolves the ticket by external reference, and delegates the idempotent
//! write to the store. The gateway's own status value is authoritative at
//! time of receipt: repeated application of the same terminal status is a
//! no-op, and conflicting terminal statuses are logged as an anomaly with
//! the later one winning.

use crate::error::StoreError;
use crate::store::{PaymentTransition, TicketStore};
use crate::types::{PaymentNotification, PaymentState, TicketCode};
use std::sync::Arc;
use tracing::{info, warn};

/// Business outcome of reconciling one notification.
#[derive(Clone, Debug, PartialEq)]
pub enum ReconcileOutcome {
    /// The transition was applied (or replayed as a no-op).
    Applied {
        /// Code of the affected ticket
        code: TicketCode,
        /// Payment state after the write
        state: PaymentState,
    },
    /// No ticket matches the correlation key. Acknowledged and discarded:
    /// the gateway must not be made to retry indefinitely for a ticket
    /// that does not exist on this side.
    UnknownReference,
}

/// Normalize the gateway status vocabulary into the three-valued payment
/// state. Unrecognized values default to `Pending`.
#[must_use]
pub fn normalize_gateway_status(status: &str) -> PaymentState {
    match status.trim().to_ascii_lowercase().as_str() {
        "approved" => PaymentState::Approved,
        "rejected" | "cancelled" | "charged_back" => PaymentState::Rejected,
        _ => PaymentState::Pending,
    }
}

/// Consumes gateway payment notifications and applies idempotent
/// transitions to the ticket store.
pub struct PaymentReconciler {
    store: Arc<dyn TicketStore>,
}

impl PaymentReconciler {
    /// Creates a new `PaymentReconciler`.
    #[must_use]
    pub fn new(store: Arc<dyn TicketStore>) -> Self {
        Self { store }
    }

    /// Apply one gateway notification.
    ///
    /// Safe to invoke arbitrarily many times with identical or superseding
    /// arguments: the store write is idempotent toward the ticket's state
    /// and `paid_at` is never overwritten on replays.
    ///
    /// # Errors
    ///
    /// [`StoreError`] on infrastructure failure, retryable by the
    /// gateway's own delivery loop. An unknown reference is a business
    /// outcome, not an error.
    #[tracing::instrument(skip(self, notification), fields(external_reference = %notification.external_reference))]
    pub async fn submit(
        &self,
        notification: PaymentNotification,
    ) -> Result<ReconcileOutcome, StoreError> {
        let new_state = normalize_gateway_status(&notification.status);
        let transition = PaymentTransition {
            external_reference: notification.external_reference.clone(),
            external_payment_ref: notification.external_payment_ref.clone(),
            new_state,
            paid_at: notification.paid_at,
        };

        let Some(applied) = self.store.apply_payment_transition(transition).await? else {
            warn!(
                external_payment_ref = %notification.external_payment_ref,
                status = %notification.status,
                "payment notification references no known ticket; acknowledged and discarded"
            );
            metrics::counter!("gatepass_payment_notifications_total", "result" => "unknown_reference")
                .increment(1);
            return Ok(ReconcileOutcome::UnknownReference);
        };

        if applied.previous_state.is_resolved() && applied.previous_state != new_state {
            // Gateway reversed a resolved decision (or sent an unknown
            // status for a resolved ticket). Last write wins.
            warn!(
                code = %applied.ticket.code,
                previous_state = %applied.previous_state,
                notified_state = %new_state,
                applied_state = %applied.ticket.payment_state,
                "conflicting payment states for resolved ticket"
            );
            metrics::counter!("gatepass_payment_anomalies_total").increment(1);
        } else {
            info!(
                code = %applied.ticket.code,
                state = %applied.ticket.payment_state,
                "payment notification applied"
            );
        }
        metrics::counter!("gatepass_payment_notifications_total", "result" => "applied")
            .increment(1);

        Ok(ReconcileOutcome::Applied {
            code: applied.ticket.code.clone(),
            state: applied.ticket.payment_state,
        })
    }
}
