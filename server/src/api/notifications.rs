//! Payment notification webhook endpoint.
//!
//! `POST /api/payments/notifications`: the gateway delivers payment
//! status changes here, at-least-once and unordered. The response is a
//! bare acknowledgment regardless of internal outcome (including an
//! unknown reference), so the gateway never enters an infinite retry
//! storm. The only exception is a store outage, which responds 503 so the
//! gateway's delivery loop retries later.

use crate::error::AppError;
use crate::state::AppState;
use axum::{Json, extract::State};
use chrono::{DateTime, Utc};
use gatepass_core::{ExternalPaymentRef, PaymentNotification};
use serde::{Deserialize, Serialize};

/// Gateway payment notification payload.
#[derive(Debug, Deserialize)]
pub struct PaymentNotificationRequest {
    /// Gateway's own transaction record id
    pub external_payment_ref: String,
    /// Correlation key linking the transaction to a ticket
    pub external_reference: String,
    /// Gateway status vocabulary (normalized server-side)
    pub status: String,
    /// Gateway-side payment timestamp, when provided
    pub paid_at: Option<DateTime<Utc>>,
}

/// Bare acknowledgment returned to the gateway.
#[derive(Debug, Serialize)]
pub struct PaymentNotificationAck {
    /// Always `true`
    pub ack: bool,
}

/// Receive one gateway notification.
///
/// # Errors
///
/// 503 when the ticket store is unavailable; the gateway retries the
/// delivery. Business mismatches (unknown reference) are acknowledged,
/// not failed.
pub async fn submit_notification(
    State(state): State<AppState>,
    Json(request): Json<PaymentNotificationRequest>,
) -> Result<Json<PaymentNotificationAck>, AppError> {
    state
        .reconciler
        .submit(PaymentNotification {
            external_payment_ref: ExternalPaymentRef::new(request.external_payment_ref),
            external_reference: request.external_reference,
            status: request.status,
            paid_at: request.paid_at,
        })
        .await?;

    Ok(Json(PaymentNotificationAck { ack: true }))
}
