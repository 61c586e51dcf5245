//! Schema bootstrap for the ticket store.

use gatepass_core::StoreError;
use sqlx::PgPool;

/// Create the ticket and audit tables if they do not exist.
///
/// Called once at startup. The issuance collaborator writes into the same
/// `tickets` table; this engine owns only the payment and redemption
/// columns.
///
/// # Errors
///
/// Returns [`StoreError::Unavailable`] if the DDL cannot be executed.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS tickets (
            id UUID PRIMARY KEY,
            code TEXT NOT NULL UNIQUE,
            security_code TEXT,
            payment_state TEXT NOT NULL DEFAULT 'pending',
            external_payment_ref TEXT,
            paid_at TIMESTAMPTZ,
            redeemed_at TIMESTAMPTZ,
            redeemed_by TEXT,
            buyer_name TEXT NOT NULL,
            buyer_email TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        ",
    )
    .execute(pool)
    .await
    .map_err(|e| StoreError::Unavailable(e.to_string()))?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_tickets_security_code
         ON tickets(security_code) WHERE security_code IS NOT NULL",
    )
    .execute(pool)
    .await
    .map_err(|e| StoreError::Unavailable(e.to_string()))?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS validation_attempts (
            id BIGINT GENERATED ALWAYS AS IDENTITY PRIMARY KEY,
            ticket_code TEXT NOT NULL,
            outcome TEXT NOT NULL,
            validator_id TEXT NOT NULL,
            occurred_at TIMESTAMPTZ NOT NULL
        )
        ",
    )
    .execute(pool)
    .await
    .map_err(|e| StoreError::Unavailable(e.to_string()))?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_validation_attempts_code
         ON validation_attempts(ticket_code)",
    )
    .execute(pool)
    .await
    .map_err(|e| StoreError::Unavailable(e.to_string()))?;

    Ok(())
}
