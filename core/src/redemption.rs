//! Redemption coordinator: at-most-once redemption with audited outcomes.
//!
//! Multiple validator devices can race on the same ticket code: network
//! retries, or two staff scanning the same QR screenshot. The coordinator
//! imposes no in-process queuing and takes no locks: it resolves the
//! request, gates on payment, and delegates the race to the store's atomic
//! `try_redeem` primitive. Every attempt is appended to the audit log with
//! the outcome that was returned to the caller.

use crate::clock::Clock;
use crate::error::StoreError;
use crate::resolver::{self, TicketPredicate};
use crate::store::{AuditLog, RedeemOutcome, TicketStore};
use crate::types::{
    PaymentState, TicketSummary, ValidationAttempt, ValidationOutcome, ValidatorId,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{error, info};

/// An inbound validation request from a scanning device or manual-entry
/// console. At least one identifier field should be present.
#[derive(Clone, Debug)]
pub struct ValidationRequest {
    /// Literal ticket code, if typed or pre-parsed
    pub code: Option<String>,
    /// Literal fallback security code
    pub security_code: Option<String>,
    /// Raw QR payload in any supported format
    pub qr_payload: Option<String>,
    /// Identity of the validator performing the attempt
    pub validator_id: ValidatorId,
}

/// The decided outcome of a validation attempt.
#[derive(Clone, Debug, PartialEq)]
pub struct ValidationResponse {
    /// Outcome label
    pub outcome: ValidationOutcome,
    /// Human-readable reason for validator staff
    pub reason: &'static str,
    /// Public ticket fields, populated only on `Validated`
    pub ticket: Option<TicketSummary>,
}

/// Enforces at-most-one successful redemption per ticket and produces a
/// precise rejection reason when redemption is denied.
pub struct RedemptionCoordinator {
    store: Arc<dyn TicketStore>,
    audit: Arc<dyn AuditLog>,
    clock: Arc<dyn Clock>,
}

impl RedemptionCoordinator {
    /// Creates a new `RedemptionCoordinator`.
    #[must_use]
    pub fn new(store: Arc<dyn TicketStore>, audit: Arc<dyn AuditLog>, clock: Arc<dyn Clock>) -> Self {
        Self { store, audit, clock }
    }

    /// Handle one validation request.
    ///
    /// Business outcomes are returned as values and always audited.
    ///
    /// # Errors
    ///
    /// [`StoreError`] on infrastructure failure or integrity violation. An
    /// infrastructure failure is not evidence the ticket is invalid, so it
    /// produces no audit record and no negative outcome.
    #[tracing::instrument(skip(self, request), fields(validator = %request.validator_id))]
    pub async fn submit(&self, request: ValidationRequest) -> Result<ValidationResponse, StoreError> {
        let now = self.clock.now();

        let predicates = match resolver::resolve(
            request.code.as_deref(),
            request.security_code.as_deref(),
            request.qr_payload.as_deref(),
        ) {
            Ok(predicates) => predicates,
            Err(_) => {
                return self
                    .conclude(
                        requested_identifier(&request),
                        ValidationOutcome::Malformed,
                        None,
                        &request.validator_id,
                        now,
                    )
                    .await;
            }
        };

        let Some(ticket) = self.store.find_by_predicates(&predicates).await? else {
            return self
                .conclude(
                    identifier_from_predicates(&predicates),
                    ValidationOutcome::NotFound,
                    None,
                    &request.validator_id,
                    now,
                )
                .await;
        };

        if ticket.payment_state != PaymentState::Approved {
            return self
                .conclude(
                    ticket.code.as_str().to_string(),
                    ValidationOutcome::NotPaid,
                    None,
                    &request.validator_id,
                    now,
                )
                .await;
        }

        match self.store.try_redeem(ticket.id, &request.validator_id, now).await? {
            RedeemOutcome::Redeemed(redeemed) => {
                info!(code = %redeemed.code, "ticket redeemed");
                let summary = redeemed.summary();
                self.conclude(
                    redeemed.code.as_str().to_string(),
                    ValidationOutcome::Validated,
                    Some(summary),
                    &request.validator_id,
                    now,
                )
                .await
            }
            RedeemOutcome::AlreadyUsed(t) => {
                self.conclude(
                    t.code.as_str().to_string(),
                    ValidationOutcome::AlreadyUsed,
                    None,
                    &request.validator_id,
                    now,
                )
                .await
            }
            // Payment state moved between the gate check and the
            // conditional update; same truth as NotPaid.
            RedeemOutcome::NotApproved(t) => {
                self.conclude(
                    t.code.as_str().to_string(),
                    ValidationOutcome::NotPaid,
                    None,
                    &request.validator_id,
                    now,
                )
                .await
            }
        }
    }

    /// Record the decided outcome and build the response.
    ///
    /// The audit append never turns a decided outcome into an error: a
    /// failed append is logged to the operational channel and counted.
    async fn conclude(
        &self,
        ticket_code: String,
        outcome: ValidationOutcome,
        ticket: Option<TicketSummary>,
        validator_id: &ValidatorId,
        now: DateTime<Utc>,
    ) -> Result<ValidationResponse, StoreError> {
        let attempt = ValidationAttempt {
            ticket_code,
            outcome,
            validator_id: validator_id.clone(),
            occurred_at: now,
        };
        if let Err(e) = self.audit.append(attempt).await {
            error!(error = %e, outcome = %outcome, "failed to append validation attempt to audit log");
            metrics::counter!("gatepass_audit_append_failures_total").increment(1);
        }
        metrics::counter!("gatepass_validation_attempts_total", "outcome" => outcome.as_str())
            .increment(1);

        Ok(ValidationResponse {
            outcome,
            reason: outcome.reason(),
            ticket,
        })
    }
}

/// Raw identifier to audit when the request could not be interpreted.
fn requested_identifier(request: &ValidationRequest) -> String {
    request
        .code
        .as_deref()
        .or(request.security_code.as_deref())
        .or(request.qr_payload.as_deref())
        .unwrap_or_default()
        .trim()
        .to_string()
}

/// Best identifier to audit for a well-formed request that matched no
/// ticket.
fn identifier_from_predicates(predicates: &[TicketPredicate]) -> String {
    for predicate in predicates {
        if let TicketPredicate::CodeEquals(code) = predicate {
            return code.as_str().to_string();
        }
    }
    match predicates.first() {
        Some(TicketPredicate::SecurityCodeEquals(sc)) => sc.as_str().to_string(),
        Some(TicketPredicate::IdEquals(id)) => id.to_string(),
        _ => String::new(),
    }
}
