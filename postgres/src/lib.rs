//! `PostgreSQL` ticket store and audit log for the Gatepass engine.
//!
//! This crate implements the `TicketStore` and `AuditLog` traits from
//! `gatepass-core` on top of sqlx. The redemption invariant (at most one
//! successful redemption per ticket, across any number of processes) is
//! enforced by a single conditional `UPDATE` guarded by
//! `redeemed_at IS NULL`, never by a read-then-write sequence or an
//! application-level lock.
//!
//! # Example
//!
//! ```ignore
//! use gatepass_postgres::{PostgresAuditLog, PostgresTicketStore, ensure_schema};
//!
//! async fn example(pool: sqlx::PgPool) -> Result<(), Box<dyn std::error::Error>> {
//!     ensure_schema(&pool).await?;
//!     let store = PostgresTicketStore::new(pool.clone());
//!     let audit = PostgresAuditLog::new(pool);
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod audit;
mod schema;
mod store;

pub use audit::PostgresAuditLog;
pub use schema::ensure_schema;
pub use store::PostgresTicketStore;
