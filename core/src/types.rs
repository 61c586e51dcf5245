//! Domain types for the ticket lifecycle engine.
//!
//! Value objects, the `Ticket` entity, and the validation audit record.
//! Tickets are created by the issuance collaborator in `Pending` payment
//! state; only the payment reconciler mutates payment fields and only the
//! redemption coordinator mutates redemption fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for a ticket
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TicketId(Uuid);

impl TicketId {
    /// Creates a new random `TicketId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `TicketId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TicketId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Human-readable unique ticket code (e.g. `CS-100001`)
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TicketCode(String);

impl TicketCode {
    /// Prefix convention for ticket codes
    pub const PREFIX: &'static str = "CS-";

    /// Creates a `TicketCode`, trimming surrounding whitespace
    #[must_use]
    pub fn new(code: impl AsRef<str>) -> Self {
        Self(code.as_ref().trim().to_string())
    }

    /// Returns the code as a string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether a raw segment follows the ticket-code prefix convention
    #[must_use]
    pub fn matches_convention(segment: &str) -> bool {
        segment.starts_with(Self::PREFIX)
    }
}

impl fmt::Display for TicketCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Short fallback code used when QR scanning is unavailable.
///
/// When not explicitly assigned at issuance it is derived from the ticket
/// code: the last [`SecurityCode::LEN`] alphanumeric characters, uppercased,
/// right-padded with `0`. The derivation is a stable pure function so the
/// value can be computed lazily and persisted on first validation use.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SecurityCode(String);

impl SecurityCode {
    /// Fixed length of a security code
    pub const LEN: usize = 6;

    /// Creates a `SecurityCode` from an explicitly assigned value
    #[must_use]
    pub fn new(code: impl AsRef<str>) -> Self {
        Self(code.as_ref().trim().to_uppercase())
    }

    /// Derive the security code from a ticket code.
    #[must_use]
    pub fn derive_from(code: &TicketCode) -> Self {
        let alnum: Vec<char> = code
            .as_str()
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .map(|c| c.to_ascii_uppercase())
            .collect();
        let start = alnum.len().saturating_sub(Self::LEN);
        let mut derived: String = alnum[start..].iter().collect();
        while derived.len() < Self::LEN {
            derived.push('0');
        }
        Self(derived)
    }

    /// Returns the security code as a string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SecurityCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of the validator (staff device/operator) performing an attempt.
///
/// Supplied by the caller; authentication is an external collaborator's
/// responsibility.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValidatorId(String);

impl ValidatorId {
    /// Creates a `ValidatorId`
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the validator identity as a string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ValidatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque identifier of the payment gateway's own transaction record.
///
/// Set on the ticket at most once meaningfully; replayed notifications
/// carry the same value (idempotency key).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExternalPaymentRef(String);

impl ExternalPaymentRef {
    /// Creates an `ExternalPaymentRef`
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the reference as a string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExternalPaymentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Payment state
// ============================================================================

/// Payment status of a ticket.
///
/// Starts at `Pending`. Monotonic in practice (once resolved it never
/// returns to `Pending`), though the reconciler tolerates out-of-order and
/// repeated gateway notifications.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentState {
    /// Awaiting gateway resolution
    Pending,
    /// Gateway approved the payment
    Approved,
    /// Gateway rejected or cancelled the payment
    Rejected,
}

impl PaymentState {
    /// Convert state to its database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    /// Parse state from its database string representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    /// Whether the gateway has resolved this payment either way
    #[must_use]
    pub const fn is_resolved(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for PaymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Ticket entity
// ============================================================================

/// A sold event-access ticket.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    /// Opaque unique identifier, assigned at creation
    pub id: TicketId,
    /// Human-readable unique ticket code
    pub code: TicketCode,
    /// Fallback code; lazily derived and persisted on first validation use
    pub security_code: Option<SecurityCode>,
    /// Current payment status
    pub payment_state: PaymentState,
    /// Gateway-side transaction record, set once
    pub external_payment_ref: Option<ExternalPaymentRef>,
    /// When the first `Approved` notification was applied
    pub paid_at: Option<DateTime<Utc>>,
    /// When the ticket was redeemed; `None` means unused
    pub redeemed_at: Option<DateTime<Utc>>,
    /// Validator that performed the redemption
    pub redeemed_by: Option<ValidatorId>,
    /// Buyer name for on-site display
    pub buyer_name: String,
    /// Buyer email for on-site display
    pub buyer_email: String,
    /// When the ticket was created
    pub created_at: DateTime<Utc>,
}

/// Redemption phase derived from ticket fields (not stored separately).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RedemptionPhase {
    /// Payment not approved; redemption cannot proceed
    Unpaid,
    /// Approved and unused, the only phase redemption succeeds from
    Redeemable,
    /// Approved and used; terminal
    Redeemed,
}

impl Ticket {
    /// Derive the conceptual redemption phase from payment and redemption
    /// fields.
    #[must_use]
    pub const fn phase(&self) -> RedemptionPhase {
        match (self.payment_state, self.redeemed_at) {
            (PaymentState::Approved, None) => RedemptionPhase::Redeemable,
            (PaymentState::Approved, Some(_)) => RedemptionPhase::Redeemed,
            _ => RedemptionPhase::Unpaid,
        }
    }

    /// Human-readable state label for on-site display
    #[must_use]
    pub const fn state_label(&self) -> &'static str {
        match self.phase() {
            RedemptionPhase::Unpaid => match self.payment_state {
                PaymentState::Rejected => "rejected",
                _ => "pending payment",
            },
            RedemptionPhase::Redeemable => "paid",
            RedemptionPhase::Redeemed => "used",
        }
    }

    /// Public projection safe for validator-facing responses.
    ///
    /// Never includes the internal id or the security code.
    #[must_use]
    pub fn summary(&self) -> TicketSummary {
        TicketSummary {
            code: self.code.clone(),
            buyer_name: self.buyer_name.clone(),
            buyer_email: self.buyer_email.clone(),
            state: self.state_label().to_string(),
            redeemed_at: self.redeemed_at,
        }
    }
}

/// Minimal public ticket fields for on-site display after a successful
/// validation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TicketSummary {
    /// Ticket code
    pub code: TicketCode,
    /// Buyer name
    pub buyer_name: String,
    /// Buyer email
    pub buyer_email: String,
    /// State label ("paid", "used", ...)
    pub state: String,
    /// Redemption timestamp, if redeemed
    pub redeemed_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Validation audit record
// ============================================================================

/// Outcome of a validation attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationOutcome {
    /// Ticket redeemed by this attempt
    Validated,
    /// Ticket was already redeemed
    AlreadyUsed,
    /// Ticket exists but payment is not approved
    NotPaid,
    /// Identifier well-formed but no matching ticket
    NotFound,
    /// No interpretable identifier in the request
    Malformed,
}

impl ValidationOutcome {
    /// Outcome label for metrics and storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Validated => "validated",
            Self::AlreadyUsed => "already_used",
            Self::NotPaid => "not_paid",
            Self::NotFound => "not_found",
            Self::Malformed => "malformed",
        }
    }

    /// Parse an outcome from its storage label.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "validated" => Some(Self::Validated),
            "already_used" => Some(Self::AlreadyUsed),
            "not_paid" => Some(Self::NotPaid),
            "not_found" => Some(Self::NotFound),
            "malformed" => Some(Self::Malformed),
            _ => None,
        }
    }

    /// Human-readable reason shown to validator staff.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::Validated => "Ticket is valid. Entry granted.",
            Self::AlreadyUsed => "Ticket was already used.",
            Self::NotPaid => "Ticket payment is not approved.",
            Self::NotFound => "No ticket matches this code.",
            Self::Malformed => "Could not read a ticket code from the request.",
        }
    }
}

impl fmt::Display for ValidationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Append-only audit record of one validation attempt.
///
/// Created on every attempt regardless of outcome; never mutated or
/// deleted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValidationAttempt {
    /// Ticket code the attempt targeted, or the raw identifier when no
    /// ticket was resolved
    pub ticket_code: String,
    /// Final outcome of the attempt
    pub outcome: ValidationOutcome,
    /// Validator that performed the attempt
    pub validator_id: ValidatorId,
    /// When the attempt was decided
    pub occurred_at: DateTime<Utc>,
}

// ============================================================================
// Gateway notification
// ============================================================================

/// A payment notification delivered by the gateway webhook.
///
/// Delivery is at-least-once and unordered; the reconciler applies these
/// idempotently.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PaymentNotification {
    /// Gateway's own transaction record id
    pub external_payment_ref: ExternalPaymentRef,
    /// Correlation key linking the gateway transaction to a ticket; carries
    /// the ticket code set at preference creation
    pub external_reference: String,
    /// Gateway status vocabulary, normalized by the reconciler
    pub status: String,
    /// Gateway-side payment timestamp, when provided
    pub paid_at: Option<DateTime<Utc>>,
}
