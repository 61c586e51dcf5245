//! Error types for the ticket store boundary.
//!
//! Business outcomes (`Validated`, `AlreadyUsed`, `NotPaid`, `NotFound`,
//! `Malformed`) are not errors; they are first-class
//! [`ValidationOutcome`](crate::types::ValidationOutcome) values. This
//! module covers only infrastructure and data-integrity failures.

use thiserror::Error;

/// Infrastructure or integrity failure from the ticket store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached or the call timed out.
    ///
    /// Retryable. A timeout on `try_redeem` means "unknown outcome": the
    /// caller must not assume the redemption did or did not happen. A blind
    /// retry is still safe because the operation is idempotent toward the
    /// ticket's state.
    #[error("ticket store unavailable: {0}")]
    Unavailable(String),

    /// A single-identity lookup matched more than one ticket, or a ticket
    /// known to exist could not be found again.
    ///
    /// Signals a data-modeling fault (duplicate codes). Must halt the
    /// request and raise an operational alert, never be silently resolved.
    #[error("ticket data integrity violation: {0}")]
    Integrity(String),
}

impl StoreError {
    /// Whether the caller may retry the operation.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}
