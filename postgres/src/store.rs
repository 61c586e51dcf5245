//! `PostgreSQL`-backed ticket store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gatepass_core::store::{PaymentApplied, PaymentTransition, RedeemOutcome};
use gatepass_core::{
    ExternalPaymentRef, PaymentState, SecurityCode, StoreError, Ticket, TicketCode, TicketId,
    TicketPredicate, TicketStore, ValidatorId,
};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, QueryBuilder, Row};

/// Ticket columns selected by every read in this store.
const TICKET_COLUMNS: &str = "id, code, security_code, payment_state, external_payment_ref, \
     paid_at, redeemed_at, redeemed_by, buyer_name, buyer_email, created_at";

/// SQL mirror of [`SecurityCode::derive_from`]: last six alphanumeric
/// characters of the code, uppercased, right-padded with `0`.
const DERIVED_SECURITY_CODE: &str =
    "rpad(right(upper(regexp_replace(code, '[^A-Za-z0-9]', '', 'g')), 6), 6, '0')";

/// `PostgreSQL` implementation of the ticket store.
///
/// All redemption mutation goes through one conditional `UPDATE`; the row
/// is never locked by the application layer, so correctness holds across
/// horizontally scaled process instances.
pub struct PostgresTicketStore {
    pool: PgPool,
}

impl PostgresTicketStore {
    /// Create a new store with the given connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a ticket row.
    ///
    /// Issuance itself is an external collaborator; this is the seam it
    /// (and the integration tests) write through.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the insert fails.
    pub async fn insert(&self, ticket: &Ticket) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO tickets (
                id, code, security_code, payment_state, external_payment_ref,
                paid_at, redeemed_at, redeemed_by, buyer_name, buyer_email, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ",
        )
        .bind(ticket.id.as_uuid())
        .bind(ticket.code.as_str())
        .bind(ticket.security_code.as_ref().map(SecurityCode::as_str))
        .bind(ticket.payment_state.as_str())
        .bind(ticket.external_payment_ref.as_ref().map(ExternalPaymentRef::as_str))
        .bind(ticket.paid_at)
        .bind(ticket.redeemed_at)
        .bind(ticket.redeemed_by.as_ref().map(ValidatorId::as_str))
        .bind(&ticket.buyer_name)
        .bind(&ticket.buyer_email)
        .bind(ticket.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(())
    }

    /// Persist the derived security code if the column is still null.
    async fn persist_security_code(&self, ticket: &mut Ticket) -> Result<(), StoreError> {
        let derived = SecurityCode::derive_from(&ticket.code);
        sqlx::query("UPDATE tickets SET security_code = $2 WHERE id = $1 AND security_code IS NULL")
            .bind(ticket.id.as_uuid())
            .bind(derived.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        ticket.security_code = Some(derived);
        Ok(())
    }
}

fn row_to_ticket(row: &PgRow) -> Result<Ticket, StoreError> {
    let get = |e: sqlx::Error| StoreError::Integrity(format!("corrupt ticket row: {e}"));
    let payment_state: String = row.try_get("payment_state").map_err(get)?;
    let payment_state = PaymentState::parse(&payment_state).ok_or_else(|| {
        StoreError::Integrity(format!("unknown payment state '{payment_state}'"))
    })?;
    Ok(Ticket {
        id: TicketId::from_uuid(row.try_get("id").map_err(get)?),
        code: TicketCode::new(row.try_get::<String, _>("code").map_err(get)?),
        security_code: row
            .try_get::<Option<String>, _>("security_code")
            .map_err(get)?
            .map(SecurityCode::new),
        payment_state,
        external_payment_ref: row
            .try_get::<Option<String>, _>("external_payment_ref")
            .map_err(get)?
            .map(ExternalPaymentRef::new),
        paid_at: row.try_get("paid_at").map_err(get)?,
        redeemed_at: row.try_get("redeemed_at").map_err(get)?,
        redeemed_by: row
            .try_get::<Option<String>, _>("redeemed_by")
            .map_err(get)?
            .map(ValidatorId::new),
        buyer_name: row.try_get("buyer_name").map_err(get)?,
        buyer_email: row.try_get("buyer_email").map_err(get)?,
        created_at: row.try_get("created_at").map_err(get)?,
    })
}

#[async_trait]
impl TicketStore for PostgresTicketStore {
    async fn find_by_predicates(
        &self,
        predicates: &[TicketPredicate],
    ) -> Result<Option<Ticket>, StoreError> {
        if predicates.is_empty() {
            return Ok(None);
        }

        let mut query: QueryBuilder<'_, sqlx::Postgres> =
            QueryBuilder::new(format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE "));
        let mut wants_security_code = false;
        for (i, predicate) in predicates.iter().enumerate() {
            if i > 0 {
                query.push(" OR ");
            }
            match predicate {
                TicketPredicate::CodeEquals(code) => {
                    query.push("code = ");
                    query.push_bind(code.as_str().to_string());
                }
                TicketPredicate::SecurityCodeEquals(sc) => {
                    // The column is derived lazily; match the stored value
                    // or, while it is still null, the derivation of the
                    // code itself.
                    wants_security_code = true;
                    query.push("(security_code = ");
                    query.push_bind(sc.as_str().to_string());
                    query.push(format!(
                        " OR (security_code IS NULL AND {DERIVED_SECURITY_CODE} = "
                    ));
                    query.push_bind(sc.as_str().to_string());
                    query.push("))");
                }
                TicketPredicate::IdEquals(id) => {
                    query.push("id = ");
                    query.push_bind(*id.as_uuid());
                }
            }
        }
        // Two rows are enough to prove the lookup is ambiguous.
        query.push(" LIMIT 2");

        let rows = query
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        match rows.as_slice() {
            [] => Ok(None),
            [row] => {
                let mut ticket = row_to_ticket(row)?;
                if wants_security_code && ticket.security_code.is_none() {
                    self.persist_security_code(&mut ticket).await?;
                }
                Ok(Some(ticket))
            }
            _ => Err(StoreError::Integrity(
                "multiple tickets matched a single-identity lookup".to_string(),
            )),
        }
    }

    async fn apply_payment_transition(
        &self,
        transition: PaymentTransition,
    ) -> Result<Option<PaymentApplied>, StoreError> {
        // One atomic statement: the CTE captures the state observed before
        // the write so replays and reversals can be told apart. Value-level
        // idempotency: external_payment_ref is set once, paid_at is set by
        // the first approved application, and a pending target never
        // un-resolves a resolved state.
        let row = sqlx::query(&format!(
            r"
            WITH target AS (
                SELECT id, payment_state AS previous_state
                FROM tickets
                WHERE code = $1
            )
            UPDATE tickets t SET
                payment_state = CASE
                    WHEN $2 = 'pending' AND t.payment_state <> 'pending' THEN t.payment_state
                    ELSE $2
                END,
                external_payment_ref = COALESCE(t.external_payment_ref, $3),
                paid_at = CASE
                    WHEN $2 = 'approved' THEN COALESCE(t.paid_at, $4)
                    ELSE t.paid_at
                END
            FROM target
            WHERE t.id = target.id
            RETURNING {TICKET_COLUMNS_QUALIFIED}, target.previous_state
            ",
            TICKET_COLUMNS_QUALIFIED = qualified_ticket_columns()
        ))
        .bind(&transition.external_reference)
        .bind(transition.new_state.as_str())
        .bind(transition.external_payment_ref.as_str())
        .bind(transition.paid_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let ticket = row_to_ticket(&row)?;
        let previous_state: String = row
            .try_get("previous_state")
            .map_err(|e| StoreError::Integrity(format!("corrupt ticket row: {e}")))?;
        let previous_state = PaymentState::parse(&previous_state).ok_or_else(|| {
            StoreError::Integrity(format!("unknown payment state '{previous_state}'"))
        })?;

        tracing::debug!(
            code = %ticket.code,
            previous_state = %previous_state,
            state = %ticket.payment_state,
            "payment transition applied"
        );

        Ok(Some(PaymentApplied {
            ticket,
            previous_state,
        }))
    }

    async fn try_redeem(
        &self,
        ticket_id: TicketId,
        validator: &ValidatorId,
        now: DateTime<Utc>,
    ) -> Result<RedeemOutcome, StoreError> {
        // The non-negotiable invariant: redemption is this one conditional
        // update, whose own success/failure decides the winner. No
        // read-then-write, no re-read of the outcome.
        let won = sqlx::query(&format!(
            r"
            UPDATE tickets SET redeemed_at = $2, redeemed_by = $3
            WHERE id = $1 AND payment_state = 'approved' AND redeemed_at IS NULL
            RETURNING {TICKET_COLUMNS}
            "
        ))
        .bind(ticket_id.as_uuid())
        .bind(now)
        .bind(validator.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        if let Some(row) = won {
            let ticket = row_to_ticket(&row)?;
            tracing::info!(code = %ticket.code, validator = %validator, "ticket redeemed");
            metrics::counter!("ticket_store.redeemed").increment(1);
            return Ok(RedeemOutcome::Redeemed(ticket));
        }

        // We lost: classify from ticket-level truth.
        let row = sqlx::query(&format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE id = $1"))
            .bind(ticket_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?
            .ok_or_else(|| {
                StoreError::Integrity(format!(
                    "ticket {ticket_id} vanished between lookup and redemption"
                ))
            })?;
        let ticket = row_to_ticket(&row)?;

        if ticket.payment_state != PaymentState::Approved {
            return Ok(RedeemOutcome::NotApproved(ticket));
        }
        // The conditional update only fails for an approved ticket when
        // another writer redeemed it first; if that writer's commit landed
        // after our snapshot the row can still read as unused here. Either
        // way the ticket-level truth is the same.
        Ok(RedeemOutcome::AlreadyUsed(ticket))
    }
}

fn qualified_ticket_columns() -> String {
    TICKET_COLUMNS
        .split(", ")
        .map(|c| format!("t.{c}"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualified_columns_prefix_every_column() {
        let qualified = qualified_ticket_columns();
        assert!(qualified.starts_with("t.id"));
        assert!(qualified.contains("t.redeemed_at"));
        assert_eq!(
            qualified.matches("t.").count(),
            TICKET_COLUMNS.split(", ").count()
        );
    }
}
