//! `PostgreSQL`-backed audit log for validation attempts.

use async_trait::async_trait;
use gatepass_core::{AuditLog, StoreError, ValidationAttempt};
use sqlx::PgPool;

/// Append-only `PostgreSQL` sink for [`ValidationAttempt`] records.
///
/// Rows are never updated or deleted by this engine; reporting consumes
/// the table directly.
pub struct PostgresAuditLog {
    pool: PgPool,
}

impl PostgresAuditLog {
    /// Create a new audit log with the given connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditLog for PostgresAuditLog {
    async fn append(&self, attempt: ValidationAttempt) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO validation_attempts (ticket_code, outcome, validator_id, occurred_at)
            VALUES ($1, $2, $3, $4)
            ",
        )
        .bind(&attempt.ticket_code)
        .bind(attempt.outcome.as_str())
        .bind(attempt.validator_id.as_str())
        .bind(attempt.occurred_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        metrics::counter!("ticket_store.audit.appended", "outcome" => attempt.outcome.as_str())
            .increment(1);
        Ok(())
    }
}
