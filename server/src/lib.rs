//! # Gatepass Server
//!
//! Axum HTTP service exposing the Gatepass ticket lifecycle engine:
//!
//! - `POST /api/payments/notifications`: gateway webhook; always a bare
//!   acknowledgment except on store outage, so the gateway's retry loop
//!   never storms.
//! - `POST /api/validations`: validator scan/manual entry; every business
//!   outcome is a 200 with a distinguishable label and human-readable
//!   reason.
//! - `GET /health`, `GET /ready`: liveness and readiness probes.
//!
//! Prometheus metrics are served by a dedicated exporter listener; all
//! routes carry `tower-http` tracing.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod api;
pub mod config;
pub mod error;
pub mod health;
pub mod metrics;
pub mod routes;
pub mod state;

pub use config::Config;
pub use error::AppError;
pub use routes::build_router;
pub use state::AppState;
