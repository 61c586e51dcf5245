//! # Gatepass Testing
//!
//! Testing utilities and helpers for the Gatepass engine.
//!
//! This crate provides:
//! - In-memory doubles for the `TicketStore` and `AuditLog` seams
//! - A deterministic `FixedClock`
//! - Ticket fixtures for scenario tests
//!
//! The in-memory store serializes every mutation under one mutex, so
//! `try_redeem` has the same linearizable compare-and-set semantics the
//! production store provides with a conditional `UPDATE`.
//!
//! ## Example
//!
//! ```ignore
//! use gatepass_testing::fixtures;
//! use gatepass_testing::mocks::{InMemoryAuditLog, InMemoryTicketStore};
//!
//! #[tokio::test]
//! async fn test_validation_flow() {
//!     let store = InMemoryTicketStore::new();
//!     store.insert(fixtures::approved_ticket("CS-100001"));
//!     // drive a RedemptionCoordinator against `store` ...
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Mock implementations of the engine's trait seams.
pub mod mocks {
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use gatepass_core::store::{PaymentApplied, PaymentTransition, RedeemOutcome};
    use gatepass_core::{
        AuditLog, Clock, PaymentState, SecurityCode, StoreError, Ticket, TicketId,
        TicketPredicate, TicketStore, ValidationAttempt, ValidatorId,
    };
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex, MutexGuard};

    /// Fixed clock for deterministic tests.
    ///
    /// Always returns the same time, making tests reproducible.
    #[derive(Clone, Copy, Debug)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Creates a clock pinned to the given instant
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }

        /// Creates a clock pinned to the moment of construction
        #[must_use]
        pub fn now() -> Self {
            Self { time: Utc::now() }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
        mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// In-memory ticket store with linearizable `try_redeem`.
    ///
    /// All operations run under one mutex; an outage can be simulated with
    /// [`InMemoryTicketStore::set_unavailable`].
    #[derive(Default)]
    pub struct InMemoryTicketStore {
        tickets: Mutex<HashMap<TicketId, Ticket>>,
        unavailable: AtomicBool,
    }

    impl InMemoryTicketStore {
        /// Creates an empty store
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Creates an Arc-wrapped instance for sharing
        #[must_use]
        pub fn shared() -> Arc<Self> {
            Arc::new(Self::new())
        }

        /// Seed a ticket
        pub fn insert(&self, ticket: Ticket) {
            lock(&self.tickets).insert(ticket.id, ticket);
        }

        /// Snapshot a ticket by id
        #[must_use]
        pub fn get(&self, id: TicketId) -> Option<Ticket> {
            lock(&self.tickets).get(&id).cloned()
        }

        /// Snapshot a ticket by code
        #[must_use]
        pub fn get_by_code(&self, code: &str) -> Option<Ticket> {
            lock(&self.tickets)
                .values()
                .find(|t| t.code.as_str() == code)
                .cloned()
        }

        /// Make every subsequent call fail with `StoreError::Unavailable`
        pub fn set_unavailable(&self, unavailable: bool) {
            self.unavailable.store(unavailable, Ordering::SeqCst);
        }

        fn check_available(&self) -> Result<(), StoreError> {
            if self.unavailable.load(Ordering::SeqCst) {
                Err(StoreError::Unavailable("simulated outage".to_string()))
            } else {
                Ok(())
            }
        }

        fn matches(ticket: &Ticket, predicate: &TicketPredicate) -> bool {
            match predicate {
                TicketPredicate::CodeEquals(code) => &ticket.code == code,
                TicketPredicate::SecurityCodeEquals(sc) => {
                    let effective = ticket
                        .security_code
                        .clone()
                        .unwrap_or_else(|| SecurityCode::derive_from(&ticket.code));
                    &effective == sc
                }
                TicketPredicate::IdEquals(id) => ticket.id == *id,
            }
        }
    }

    #[async_trait]
    impl TicketStore for InMemoryTicketStore {
        async fn find_by_predicates(
            &self,
            predicates: &[TicketPredicate],
        ) -> Result<Option<Ticket>, StoreError> {
            self.check_available()?;
            let wants_security_code = predicates
                .iter()
                .any(|p| matches!(p, TicketPredicate::SecurityCodeEquals(_)));
            let mut tickets = lock(&self.tickets);
            let ids: Vec<TicketId> = tickets
                .values()
                .filter(|t| predicates.iter().any(|p| Self::matches(t, p)))
                .map(|t| t.id)
                .collect();
            match ids.as_slice() {
                [] => Ok(None),
                [id] => {
                    let Some(ticket) = tickets.get_mut(id) else {
                        return Ok(None);
                    };
                    // Lazily persist the derived security code, as the
                    // production store does on first validation use.
                    if wants_security_code && ticket.security_code.is_none() {
                        ticket.security_code = Some(SecurityCode::derive_from(&ticket.code));
                    }
                    Ok(Some(ticket.clone()))
                }
                many => Err(StoreError::Integrity(format!(
                    "{} tickets matched a single-identity lookup",
                    many.len()
                ))),
            }
        }

        async fn apply_payment_transition(
            &self,
            transition: PaymentTransition,
        ) -> Result<Option<PaymentApplied>, StoreError> {
            self.check_available()?;
            let mut tickets = lock(&self.tickets);
            let Some(ticket) = tickets
                .values_mut()
                .find(|t| t.code.as_str() == transition.external_reference)
            else {
                return Ok(None);
            };

            let previous_state = ticket.payment_state;
            // Once resolved, a Pending target never un-resolves the state.
            if !(transition.new_state == PaymentState::Pending && previous_state.is_resolved()) {
                ticket.payment_state = transition.new_state;
            }
            if ticket.external_payment_ref.is_none() {
                ticket.external_payment_ref = Some(transition.external_payment_ref);
            }
            if ticket.payment_state == PaymentState::Approved && ticket.paid_at.is_none() {
                ticket.paid_at = transition.paid_at;
            }

            Ok(Some(PaymentApplied {
                ticket: ticket.clone(),
                previous_state,
            }))
        }

        async fn try_redeem(
            &self,
            ticket_id: TicketId,
            validator: &ValidatorId,
            now: DateTime<Utc>,
        ) -> Result<RedeemOutcome, StoreError> {
            self.check_available()?;
            let mut tickets = lock(&self.tickets);
            let Some(ticket) = tickets.get_mut(&ticket_id) else {
                return Err(StoreError::Integrity(format!(
                    "ticket {ticket_id} vanished between lookup and redemption"
                )));
            };
            if ticket.payment_state != PaymentState::Approved {
                return Ok(RedeemOutcome::NotApproved(ticket.clone()));
            }
            if ticket.redeemed_at.is_some() {
                return Ok(RedeemOutcome::AlreadyUsed(ticket.clone()));
            }
            ticket.redeemed_at = Some(now);
            ticket.redeemed_by = Some(validator.clone());
            Ok(RedeemOutcome::Redeemed(ticket.clone()))
        }
    }

    /// In-memory audit log capturing appended attempts.
    #[derive(Default)]
    pub struct InMemoryAuditLog {
        attempts: Mutex<Vec<ValidationAttempt>>,
    }

    impl InMemoryAuditLog {
        /// Creates an empty audit log
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Creates an Arc-wrapped instance for sharing
        #[must_use]
        pub fn shared() -> Arc<Self> {
            Arc::new(Self::new())
        }

        /// Snapshot all appended attempts
        #[must_use]
        pub fn attempts(&self) -> Vec<ValidationAttempt> {
            lock(&self.attempts).clone()
        }

        /// Number of appended attempts
        #[must_use]
        pub fn len(&self) -> usize {
            lock(&self.attempts).len()
        }

        /// Whether no attempt has been appended
        #[must_use]
        pub fn is_empty(&self) -> bool {
            self.len() == 0
        }
    }

    #[async_trait]
    impl AuditLog for InMemoryAuditLog {
        async fn append(&self, attempt: ValidationAttempt) -> Result<(), StoreError> {
            lock(&self.attempts).push(attempt);
            Ok(())
        }
    }

    /// Audit log whose appends always fail, for verifying that logging
    /// failures never change a decided validation outcome.
    #[derive(Clone, Copy, Debug, Default)]
    pub struct FailingAuditLog;

    #[async_trait]
    impl AuditLog for FailingAuditLog {
        async fn append(&self, _attempt: ValidationAttempt) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("audit sink down".to_string()))
        }
    }
}

/// Ticket fixtures for scenario tests.
pub mod fixtures {
    use chrono::Utc;
    use gatepass_core::{PaymentState, Ticket, TicketCode, TicketId, ValidatorId};

    /// A freshly issued ticket in `Pending` payment state.
    #[must_use]
    pub fn pending_ticket(code: &str) -> Ticket {
        Ticket {
            id: TicketId::new(),
            code: TicketCode::new(code),
            security_code: None,
            payment_state: PaymentState::Pending,
            external_payment_ref: None,
            paid_at: None,
            redeemed_at: None,
            redeemed_by: None,
            buyer_name: "Maria Lopez".to_string(),
            buyer_email: "maria@example.com".to_string(),
            created_at: Utc::now(),
        }
    }

    /// An approved, unused ticket, the only redeemable phase.
    #[must_use]
    pub fn approved_ticket(code: &str) -> Ticket {
        Ticket {
            payment_state: PaymentState::Approved,
            paid_at: Some(Utc::now()),
            ..pending_ticket(code)
        }
    }

    /// An approved ticket already redeemed by the given validator.
    #[must_use]
    pub fn redeemed_ticket(code: &str, validator: &str) -> Ticket {
        Ticket {
            redeemed_at: Some(Utc::now()),
            redeemed_by: Some(ValidatorId::new(validator)),
            ..approved_ticket(code)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::fixtures;
    use super::mocks::InMemoryTicketStore;
    use gatepass_core::store::RedeemOutcome;
    use gatepass_core::{TicketStore, ValidatorId};
    use chrono::Utc;

    #[tokio::test]
    async fn in_memory_redeem_is_one_way() {
        let store = InMemoryTicketStore::new();
        let ticket = fixtures::approved_ticket("CS-000001");
        let id = ticket.id;
        store.insert(ticket);

        let validator = ValidatorId::new("Ana");
        let first = store.try_redeem(id, &validator, Utc::now()).await.unwrap();
        assert!(matches!(first, RedeemOutcome::Redeemed(_)));

        let second = store.try_redeem(id, &validator, Utc::now()).await.unwrap();
        assert!(matches!(second, RedeemOutcome::AlreadyUsed(_)));
    }
}
