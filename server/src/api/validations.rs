//! Validation API endpoint.
//!
//! `POST /api/validations`: submit a scan or manual entry for redemption.
//!
//! Every business outcome (`validated`, `already_used`, `not_paid`,
//! `not_found`, `malformed`) is a 200 response carrying a distinguishable
//! outcome label and a human-readable reason; on `validated` the response
//! also carries the ticket's public fields for on-site display. Only
//! infrastructure failures surface as HTTP errors, and those are never
//! recorded as a negative validation outcome.

use crate::error::AppError;
use crate::state::AppState;
use axum::{Json, extract::State};
use gatepass_core::{TicketSummary, ValidationOutcome, ValidationRequest, ValidatorId};
use serde::{Deserialize, Serialize};

/// Request to validate a ticket. At least one identifier field should be
/// present; the validator identity is mandatory.
#[derive(Debug, Deserialize)]
pub struct ValidateTicketRequest {
    /// Literal ticket code, if typed or pre-parsed
    pub code: Option<String>,
    /// Literal fallback security code
    pub security_code: Option<String>,
    /// Raw QR payload in any supported format
    pub qr_payload: Option<String>,
    /// Identity of the validator performing the attempt
    pub validator_id: String,
}

/// Response for a validation attempt.
#[derive(Debug, Serialize)]
pub struct ValidateTicketResponse {
    /// Outcome label
    pub outcome: ValidationOutcome,
    /// Human-readable reason for validator staff
    pub reason: String,
    /// Public ticket fields, populated only on `validated`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket: Option<TicketSummary>,
}

/// Submit a validation attempt.
///
/// # Errors
///
/// - 400 when `validator_id` is missing or blank
/// - 503 when the ticket store is unavailable (retryable; outcome unknown)
/// - 500 on a data-integrity violation (operational alert, never a normal
///   rejection)
pub async fn submit_validation(
    State(state): State<AppState>,
    Json(request): Json<ValidateTicketRequest>,
) -> Result<Json<ValidateTicketResponse>, AppError> {
    if request.validator_id.trim().is_empty() {
        return Err(AppError::bad_request("validator_id is required"));
    }

    let response = state
        .coordinator
        .submit(ValidationRequest {
            code: request.code,
            security_code: request.security_code,
            qr_payload: request.qr_payload,
            validator_id: ValidatorId::new(request.validator_id.trim()),
        })
        .await?;

    Ok(Json(ValidateTicketResponse {
        outcome: response.outcome,
        reason: response.reason.to_string(),
        ticket: response.ticket,
    }))
}
