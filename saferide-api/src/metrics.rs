use axum::extract::State;
use axum::http::StatusCode;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

use crate::state::AppState;

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub bookings_created_total: IntCounter,
    pub webhook_events_total: IntCounterVec,
    pub sweeper_reminders_total: IntCounter,
    pub sweeper_expired_total: IntCounter,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let bookings_created_total = IntCounter::new(
            "bookings_created_total",
            "Bookings created since process start",
        )
        .expect("valid bookings_created_total metric");

        let webhook_events_total = IntCounterVec::new(
            Opts::new("webhook_events_total", "Webhook deliveries by outcome"),
            &["outcome"],
        )
        .expect("valid webhook_events_total metric");

        let sweeper_reminders_total = IntCounter::new(
            "sweeper_reminders_total",
            "Expiry reminders dispatched by the sweeper",
        )
        .expect("valid sweeper_reminders_total metric");

        let sweeper_expired_total = IntCounter::new(
            "sweeper_expired_total",
            "Bookings expired by the sweeper",
        )
        .expect("valid sweeper_expired_total metric");

        registry
            .register(Box::new(bookings_created_total.clone()))
            .expect("register bookings_created_total");
        registry
            .register(Box::new(webhook_events_total.clone()))
            .expect("register webhook_events_total");
        registry
            .register(Box::new(sweeper_reminders_total.clone()))
            .expect("register sweeper_reminders_total");
        registry
            .register(Box::new(sweeper_expired_total.clone()))
            .expect("register sweeper_expired_total");

        Self {
            registry,
            bookings_created_total,
            webhook_events_total,
            sweeper_reminders_total,
            sweeper_expired_total,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

pub async fn metrics_handler(
    State(state): State<AppState>,
) -> Result<([(&'static str, &'static str); 1], String), StatusCode> {
    match state.metrics.encode() {
        Ok(body) => Ok(([("content-type", "text/plain; version=0.0.4")], body)),
        Err(err) => {
            tracing::error!(error = %err, "metrics encoding failed");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
