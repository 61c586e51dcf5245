//! Ticket store and audit log trait seams.
//!
//! The store is the only shared mutable resource in the engine. The
//! application layer never locks it: all redemption mutation is expressed
//! as one atomic conditional update issued to the store, so correctness
//! holds across process instances.

use crate::error::StoreError;
use crate::resolver::TicketPredicate;
use crate::types::{
    ExternalPaymentRef, PaymentState, Ticket, TicketId, ValidationAttempt, ValidatorId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// A payment-state transition derived from one gateway notification.
#[derive(Clone, Debug, PartialEq)]
pub struct PaymentTransition {
    /// Correlation key (the ticket code set at preference creation)
    pub external_reference: String,
    /// Gateway's own transaction record id
    pub external_payment_ref: ExternalPaymentRef,
    /// Normalized target state
    pub new_state: PaymentState,
    /// Gateway-side payment timestamp, when provided
    pub paid_at: Option<DateTime<Utc>>,
}

/// Result of applying a payment transition to an existing ticket.
///
/// Carries the state observed before the write so the reconciler can
/// distinguish a replay (same state) from a gateway reversal (anomaly).
#[derive(Clone, Debug, PartialEq)]
pub struct PaymentApplied {
    /// The ticket after the transition
    pub ticket: Ticket,
    /// Payment state observed immediately before the write
    pub previous_state: PaymentState,
}

/// Result of the atomic redemption attempt.
///
/// Of N concurrent callers on the same ticket, exactly one observes
/// `Redeemed`; the rest observe ticket-level truth.
#[derive(Clone, Debug, PartialEq)]
pub enum RedeemOutcome {
    /// This caller performed the one-way unused→used transition
    Redeemed(Ticket),
    /// The ticket was already redeemed (possibly a moment ago, by a racing
    /// caller)
    AlreadyUsed(Ticket),
    /// Payment is no longer approved; no mutation happened
    NotApproved(Ticket),
}

/// Durable, consistent storage and lookup of [`Ticket`] records.
///
/// Implementations must make `try_redeem` linearizable per ticket: a single
/// conditional update whose success or failure is reported back, never a
/// read-then-write sequence.
#[async_trait]
pub trait TicketStore: Send + Sync {
    /// Find the single ticket matching an OR-combined predicate set.
    ///
    /// # Errors
    ///
    /// [`StoreError::Integrity`] when the predicates match more than one
    /// ticket; the store must never guess among multiple matches.
    /// [`StoreError::Unavailable`] on infrastructure failure.
    async fn find_by_predicates(
        &self,
        predicates: &[TicketPredicate],
    ) -> Result<Option<Ticket>, StoreError>;

    /// Idempotently apply a payment transition resolved by external
    /// reference.
    ///
    /// Reapplying an identical transition is a value-level no-op;
    /// `paid_at` is set by the first `Approved` application and unchanged
    /// by replays; once resolved, a `Pending` target never un-resolves the
    /// state. Returns `None` when no ticket matches the correlation key.
    ///
    /// # Errors
    ///
    /// [`StoreError::Unavailable`] on infrastructure failure (retryable).
    async fn apply_payment_transition(
        &self,
        transition: PaymentTransition,
    ) -> Result<Option<PaymentApplied>, StoreError>;

    /// Atomically redeem the ticket if and only if it is approved and
    /// unused.
    ///
    /// # Errors
    ///
    /// [`StoreError::Unavailable`] on infrastructure failure or timeout
    /// (outcome unknown); [`StoreError::Integrity`] when `ticket_id` no
    /// longer resolves to a row (tickets are never deleted by this core).
    async fn try_redeem(
        &self,
        ticket_id: TicketId,
        validator: &ValidatorId,
        now: DateTime<Utc>,
    ) -> Result<RedeemOutcome, StoreError>;
}

/// Append-only sink for validation attempts.
///
/// No reads are required by the engine; reporting consumes the storage
/// directly.
#[async_trait]
pub trait AuditLog: Send + Sync {
    /// Append one attempt record.
    ///
    /// # Errors
    ///
    /// [`StoreError::Unavailable`] on infrastructure failure. Callers must
    /// not let an append failure change a decided validation outcome.
    async fn append(&self, attempt: ValidationAttempt) -> Result<(), StoreError>;
}
