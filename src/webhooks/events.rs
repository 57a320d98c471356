//! Payment event classification.
//!
//! Maps the provider's declared event type onto the small set of events this
//! service acts on, and extracts the normalized payment record from the
//! event's expected nested path. Unknown event types are always classified as
//! unhandled — the provider must never see an unknown-but-harmless event
//! rejected.

use serde::Deserialize;
use serde_json::Value;

/// Event types this service acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentEventType {
    /// Payment captured successfully (`payment.captured`)
    Captured,
    /// Payment attempt failed (`payment.failed`)
    Failed,
    /// Anything else; acknowledged and ignored
    Unhandled,
}

impl PaymentEventType {
    /// Total: every input maps to a variant, unknown strings to `Unhandled`.
    pub fn parse(s: &str) -> Self {
        match s {
            "payment.captured" => Self::Captured,
            "payment.failed" => Self::Failed,
            _ => Self::Unhandled,
        }
    }
}

impl std::fmt::Display for PaymentEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Captured => write!(f, "payment.captured"),
            Self::Failed => write!(f, "payment.failed"),
            Self::Unhandled => write!(f, "unhandled"),
        }
    }
}

/// Normalized payment details extracted from the webhook payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PaymentRecord {
    /// Provider-assigned payment id; the idempotency key for fulfillment.
    pub id: String,
    /// Amount in minor currency units.
    #[serde(default)]
    pub amount: i64,
    /// Customer email. Fulfillment is impossible without it.
    #[serde(default)]
    pub email: Option<String>,
    /// Payment method (card, upi, netbanking, ...).
    #[serde(default)]
    pub method: Option<String>,
    /// Provider's failure description, present on failed payments.
    #[serde(default, rename = "error_description")]
    pub failure_reason: Option<String>,
}

impl PaymentRecord {
    /// Customer email, treating an empty string as absent.
    pub fn recipient(&self) -> Option<&str> {
        self.email.as_deref().filter(|e| !e.is_empty())
    }

    /// Amount in major currency units, for logging.
    pub fn amount_major(&self) -> f64 {
        self.amount as f64 / 100.0
    }
}

/// A classified inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentEvent {
    Captured(PaymentRecord),
    Failed(PaymentRecord),
    Unhandled { event: String },
}

/// The payload does not have the structure its declared event type requires.
///
/// Surfaced to the handler, which acknowledges the request (the provider
/// retries on non-2xx, and a payload-shape bug will not self-heal) but logs
/// it as an anomaly.
#[derive(Debug, thiserror::Error)]
#[error("malformed webhook payload: {reason}")]
pub struct MalformedPayload {
    pub reason: String,
}

impl MalformedPayload {
    fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

/// Classify a parsed webhook body into a [`PaymentEvent`].
///
/// The nested `payload.payment.entity` path is only required — and only
/// validated — for the event types that actually carry a payment, so schema
/// drift on irrelevant event types can never fault.
pub fn classify(body: &Value) -> Result<PaymentEvent, MalformedPayload> {
    let event = body
        .get("event")
        .and_then(Value::as_str)
        .ok_or_else(|| MalformedPayload::new("missing or non-string `event` field"))?;

    let event_type = PaymentEventType::parse(event);
    if event_type == PaymentEventType::Unhandled {
        return Ok(PaymentEvent::Unhandled { event: event.to_string() });
    }

    let entity = body
        .pointer("/payload/payment/entity")
        .ok_or_else(|| MalformedPayload::new(format!("{event}: missing payload.payment.entity")))?;

    let record: PaymentRecord = serde_json::from_value(entity.clone())
        .map_err(|e| MalformedPayload::new(format!("{event}: invalid payment entity: {e}")))?;

    Ok(match event_type {
        PaymentEventType::Captured => PaymentEvent::Captured(record),
        PaymentEventType::Failed => PaymentEvent::Failed(record),
        PaymentEventType::Unhandled => unreachable!("handled above"),
    })
}
