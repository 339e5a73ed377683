#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
//! Shared HTTP DTOs for the Temuin booking API.
//!
//! These types are used by the client core and the CLI for request/response
//! encoding so the JSON contract lives in one place. Field names follow the
//! wire format: catalogue and booking payloads are `camelCase`, auth and admin
//! payloads are `snake_case`.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Error document returned by the backend on non-success responses.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    /// Human-readable message (mock backend shape).
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    /// Short error code or message (server shape).
    pub error: Option<String>,
}

impl ErrorBody {
    /// Best available description carried by the document.
    #[must_use]
    pub fn describe(&self) -> Option<&str> {
        self.message.as_deref().or(self.error.as_deref())
    }
}

/// Generic acknowledgement (`{"status": "..."}`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusAck {
    /// Status keyword such as `ok`, `promoted` or `logged_out`.
    pub status: String,
}

/// Bookable provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Provider {
    /// Provider identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Whether the provider currently accepts bookings.
    pub available: bool,
}

/// Service offered on the platform.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    /// Service identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Duration of one appointment.
    pub duration_minutes: u32,
    /// Price in the smallest currency unit.
    pub price: u64,
}

/// Open slots for a provider on a given date.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Availability {
    /// Provider the slots belong to.
    pub provider_id: String,
    /// Calendar date the slots fall on.
    pub date: NaiveDate,
    #[serde(default)]
    /// Slot start times.
    pub slots: Vec<DateTime<Utc>>,
}

/// Payload for creating a booking.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BookingInput {
    /// Provider being booked.
    pub provider_id: String,
    /// Name recorded on the booking.
    pub customer_name: String,
    /// Chosen slot, if any.
    pub slot: Option<DateTime<Utc>>,
}

/// Booking created by the backend. Treated as immutable once received.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    /// Booking identifier.
    pub id: String,
    /// Provider the booking is for.
    pub provider_id: String,
    /// Name recorded on the booking.
    pub customer_name: String,
    #[serde(default)]
    /// Booked slot, if one was chosen.
    pub slot: Option<DateTime<Utc>>,
    /// Backend status keyword (e.g. `confirmed`).
    pub status: String,
}

/// Payload for creating a payment intent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaymentIntentRequest {
    /// Amount in the smallest currency unit.
    pub amount: u64,
    /// ISO currency code.
    pub currency: String,
}

/// Payment intent created for one booking attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaymentIntent {
    /// Intent identifier.
    pub id: String,
    /// Amount in the smallest currency unit.
    pub amount: u64,
    /// ISO currency code.
    pub currency: String,
    #[serde(rename = "client_secret", alias = "clientSecret")]
    /// Correlation token handed to the confirmation step.
    pub client_secret: String,
}

/// Payload for confirming a payment intent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfirmPaymentRequest {
    /// Secret taken from the payment intent.
    pub client_secret: String,
}

/// Outcome classification of a payment confirmation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(from = "String", into = "String")]
pub enum PaymentStatus {
    /// Payment captured.
    Succeeded,
    /// Payment declined.
    Failed,
    /// Any other status keyword; treated as a failure.
    Other(String),
}

impl PaymentStatus {
    /// Whether the payment went through.
    #[must_use]
    pub const fn is_succeeded(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

impl From<String> for PaymentStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "succeeded" => Self::Succeeded,
            "failed" => Self::Failed,
            _ => Self::Other(value),
        }
    }
}

impl From<PaymentStatus> for String {
    fn from(value: PaymentStatus) -> Self {
        match value {
            PaymentStatus::Succeeded => "succeeded".to_string(),
            PaymentStatus::Failed => "failed".to_string(),
            PaymentStatus::Other(other) => other,
        }
    }
}

/// Result of a payment confirmation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResult {
    /// Success or failure classification.
    pub status: PaymentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    /// Gateway transaction identifier on success.
    pub transaction_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    /// Failure description on decline.
    pub message: Option<String>,
}

/// Account role.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Regular customer.
    #[default]
    User,
    /// Administrator.
    Admin,
}

impl Role {
    /// Wire keyword for the role.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }
}

/// Authenticated identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    #[serde(deserialize_with = "string_or_number")]
    /// User identifier (numeric ids are normalised to strings).
    pub id: String,
    /// Account email.
    pub email: String,
    #[serde(default)]
    /// Account role.
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    /// Display name, when set.
    pub name: Option<String>,
}

/// Login payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoginRequest {
    /// Account email.
    pub email: String,
    /// Account password.
    pub password: String,
}

/// Registration payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegisterRequest {
    /// Account email.
    pub email: String,
    /// Account password.
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    /// Optional display name.
    pub name: Option<String>,
}

/// Response to login and registration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthResponse {
    /// Bearer token for subsequent calls.
    pub token: String,
    /// Identity the token belongs to.
    pub user: User,
}

/// Response to a credential refresh.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RefreshResponse {
    /// Replacement bearer token.
    pub token: String,
}

/// Response to the who-am-i call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MeResponse {
    /// Current identity.
    pub user: User,
}

/// Row of the admin user listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AdminUserRow {
    #[serde(deserialize_with = "string_or_number")]
    /// User identifier.
    pub id: String,
    /// Account email.
    pub email: String,
    #[serde(default)]
    /// Display name (empty when unset).
    pub name: String,
    #[serde(default)]
    /// Account role; the field optimistically mutated by promotion.
    pub role: Role,
}

/// Admin user listing envelope.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UsersResponse {
    #[serde(default)]
    /// All users known to the backend.
    pub users: Vec<AdminUserRow>,
}

/// Entry of the admin audit log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuditEntry {
    #[serde(deserialize_with = "string_or_number")]
    /// Entry identifier.
    pub id: String,
    /// When the action was recorded.
    pub created_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "string_or_number")]
    /// Acting administrator.
    pub actor_id: String,
    /// Action keyword (e.g. `promote_user`).
    pub action: String,
    /// Action target (e.g. `user:alice@example.com`).
    pub target: String,
    #[serde(default)]
    /// Free-form details.
    pub details: String,
}

/// Admin audit listing envelope.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuditResponse {
    #[serde(default)]
    /// Recorded audit entries.
    pub audit: Vec<AuditEntry>,
}

/// Promotion payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PromoteRequest {
    /// Email of the account to promote.
    pub email: String,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(u64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(text) => text,
        RawId::Number(number) => number.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn user_accepts_numeric_ids_and_defaults_role() {
        let user: User = serde_json::from_value(json!({"id": 7, "email": "a@x"})).unwrap();
        assert_eq!(user.id, "7");
        assert_eq!(user.role, Role::User);
        assert!(user.name.is_none());
    }

    #[test]
    fn payment_status_treats_unknown_keywords_as_failure() {
        let result: PaymentResult =
            serde_json::from_value(json!({"status": "requires_action"})).unwrap();
        assert!(!result.status.is_succeeded());
        assert_eq!(result.status, PaymentStatus::Other("requires_action".into()));

        let ok: PaymentResult =
            serde_json::from_value(json!({"status": "succeeded", "transactionId": "tx_1"}))
                .unwrap();
        assert!(ok.status.is_succeeded());
        assert_eq!(ok.transaction_id.as_deref(), Some("tx_1"));
    }

    #[test]
    fn payment_intent_reads_either_secret_spelling() {
        let snake: PaymentIntent = serde_json::from_value(json!({
            "id": "pi_1", "amount": 100, "currency": "IDR", "client_secret": "cs_a"
        }))
        .unwrap();
        let camel: PaymentIntent = serde_json::from_value(json!({
            "id": "pi_1", "amount": 100, "currency": "IDR", "clientSecret": "cs_a"
        }))
        .unwrap();
        assert_eq!(snake, camel);
        assert_eq!(
            serde_json::to_value(&snake).unwrap()["client_secret"],
            json!("cs_a")
        );
    }

    #[test]
    fn availability_parses_fixture_shape() {
        let availability: Availability = serde_json::from_value(json!({
            "providerId": "p1",
            "date": "2025-03-04",
            "slots": ["2025-03-04T09:00:00.000Z", "2025-03-04T10:00:00.000Z"]
        }))
        .unwrap();
        assert_eq!(availability.provider_id, "p1");
        assert_eq!(availability.slots.len(), 2);
    }

    #[test]
    fn booking_input_serialises_camel_case_with_null_slot() {
        let input = BookingInput {
            provider_id: "p1".into(),
            customer_name: "Demo User".into(),
            slot: None,
        };
        assert_eq!(
            serde_json::to_value(&input).unwrap(),
            json!({"providerId": "p1", "customerName": "Demo User", "slot": null})
        );
    }

    #[test]
    fn error_body_prefers_message_over_error() {
        let body: ErrorBody =
            serde_json::from_value(json!({"message": "Invalid credentials", "error": "x"}))
                .unwrap();
        assert_eq!(body.describe(), Some("Invalid credentials"));
        let server: ErrorBody = serde_json::from_value(json!({"error": "user not found"})).unwrap();
        assert_eq!(server.describe(), Some("user not found"));
    }
}
