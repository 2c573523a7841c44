use serde::Deserialize;

use saferide_core::payment::CorrelationMetadata;

/// Provider webhook envelope, already signature-verified when parsed.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ProviderEventKind,
    pub data: ProviderEventData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum ProviderEventKind {
    #[serde(rename = "checkout.payment_succeeded")]
    PaymentSucceeded,
    #[serde(rename = "checkout.payment_failed")]
    PaymentFailed,
    #[serde(rename = "checkout.session_expired")]
    SessionExpired,
    /// Event types this engine does not consume.
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderEventData {
    pub object: PaymentObject,
}

/// The payment object inside the envelope. `metadata` is the correlation
/// blob the engine attached at session creation, round-tripped unmodified.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentObject {
    /// Provider-side payment reference (e.g. `pay_123`).
    pub reference: String,
    #[serde(rename = "amount")]
    pub amount_cents: i64,
    pub currency: String,
    pub metadata: CorrelationMetadata,
}
