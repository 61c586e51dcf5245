//! Router configuration for the Gatepass server.
//!
//! Builds the complete Axum router with all endpoints.

use crate::api::{notifications, validations};
use crate::health::{health_check, readiness_check};
use crate::state::AppState;
use axum::{
    Router,
    routing::{get, post},
};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

/// Build the complete Axum router.
///
/// Configures health checks, the validation endpoint, and the payment
/// webhook. Every request gets an `x-request-id` and HTTP tracing.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/validations", post(validations::submit_validation))
        .route(
            "/payments/notifications",
            post(notifications::submit_notification),
        );

    Router::new()
        // Health checks (no authentication)
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        // API routes under /api prefix
        .nest("/api", api_routes)
        // Layers run bottom-up on requests: the id is set first, then
        // tracing sees it, then it propagates to the response.
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}
