use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use saferide_shared::PaymentPurpose;

use crate::error::EngineError;

/// Round-trips through the gateway unmodified so webhook events can be
/// correlated back to the booking that paid.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CorrelationMetadata {
    pub booking_id: Uuid,
    pub guardian_id: Uuid,
    pub purpose: PaymentPurpose,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub amount_cents: i64,
    pub currency: String,
    pub description: String,
    pub metadata: CorrelationMetadata,
}

/// Redirect handle the caller forwards to the guardian's client. The booking
/// does not change state here; only a confirmed webhook does that.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_checkout_session(
        &self,
        request: CheckoutRequest,
    ) -> Result<CheckoutSession, EngineError>;
}

/// Deterministic in-process gateway for tests and dev mode.
#[derive(Default)]
pub struct MockGateway {
    counter: AtomicU64,
    requests: Mutex<Vec<CheckoutRequest>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every checkout request the gateway has seen, oldest first.
    pub fn requests(&self) -> Vec<CheckoutRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_checkout_session(
        &self,
        request: CheckoutRequest,
    ) -> Result<CheckoutSession, EngineError> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        self.requests.lock().unwrap().push(request);
        Ok(CheckoutSession {
            id: format!("cs_test_{n}"),
            url: format!("https://checkout.invalid/session/cs_test_{n}"),
        })
    }
}
