use async_trait::async_trait;
use serde::Deserialize;

use saferide_core::payment::{CheckoutRequest, CheckoutSession, PaymentGateway};
use saferide_core::EngineError;

/// Connection settings for the hosted checkout provider.
#[derive(Debug, Clone, Deserialize)]
pub struct HostedCheckoutConfig {
    pub base_url: String,
    pub api_key: String,
    pub success_url: String,
    pub cancel_url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    15_000
}

/// Gateway adapter that creates hosted checkout sessions over HTTP.
///
/// The correlation metadata is forwarded verbatim; the provider echoes it
/// back inside webhook events, which is the only way booking state advances.
pub struct HostedCheckoutGateway {
    http: reqwest::Client,
    config: HostedCheckoutConfig,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    id: String,
    url: String,
}

impl HostedCheckoutGateway {
    pub fn new(config: HostedCheckoutConfig) -> Result<Self, EngineError> {
        let http = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(std::time::Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|err| {
                EngineError::ExternalDependency(format!("gateway client build failed: {err}"))
            })?;
        Ok(Self { http, config })
    }
}

#[async_trait]
impl PaymentGateway for HostedCheckoutGateway {
    async fn create_checkout_session(
        &self,
        request: CheckoutRequest,
    ) -> Result<CheckoutSession, EngineError> {
        let body = serde_json::json!({
            "mode": "payment",
            "amount": request.amount_cents,
            "currency": request.currency,
            "description": request.description,
            "metadata": request.metadata,
            "success_url": self.config.success_url,
            "cancel_url": self.config.cancel_url,
        });

        let response = self
            .http
            .post(format!("{}/v1/checkout/sessions", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                EngineError::ExternalDependency(format!("gateway request failed: {err}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(EngineError::ExternalDependency(format!(
                "gateway returned {status}: {detail}"
            )));
        }

        let session: SessionResponse = response.json().await.map_err(|err| {
            EngineError::ExternalDependency(format!("gateway response unreadable: {err}"))
        })?;

        Ok(CheckoutSession {
            id: session.id,
            url: session.url,
        })
    }
}
