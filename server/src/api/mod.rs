//! HTTP API endpoints for the Gatepass engine.

pub mod notifications;
pub mod validations;
