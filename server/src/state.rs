//! Application state for the Gatepass HTTP server.
//!
//! Contains the shared engine components needed by HTTP handlers. The
//! engine is driven entirely through the `TicketStore`/`AuditLog` trait
//! seams, so tests wire the same state over in-memory doubles.

use gatepass_core::{PaymentReconciler, RedemptionCoordinator};
use sqlx::PgPool;
use std::sync::Arc;

/// Application state shared across all HTTP handlers.
///
/// Cloned (cheaply via Arc) for each request.
#[derive(Clone)]
pub struct AppState {
    /// Redemption coordinator driving validation attempts
    pub coordinator: Arc<RedemptionCoordinator>,

    /// Payment reconciler consuming gateway notifications
    pub reconciler: Arc<PaymentReconciler>,

    /// Database pool for readiness probing; `None` when the state is wired
    /// over in-memory doubles (tests)
    pub db: Option<PgPool>,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(
        coordinator: Arc<RedemptionCoordinator>,
        reconciler: Arc<PaymentReconciler>,
        db: Option<PgPool>,
    ) -> Self {
        Self {
            coordinator,
            reconciler,
            db,
        }
    }
}
