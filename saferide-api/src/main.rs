use std::net::SocketAddr;
use std::sync::Arc;

use tokio::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use saferide_api::app_config::Config;
use saferide_api::{app, worker, AppState, AuthSettings, WebhookSettings};
use saferide_core::identity::InMemoryDirectory;
use saferide_core::notify::LoggingDispatcher;
use saferide_core::payment::{MockGateway, PaymentGateway};
use saferide_payments::gateway::HostedCheckoutGateway;
use saferide_rates::StaticRates;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "saferide_api=debug,tower_http=debug,axum::rejection=trace".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().expect("Failed to load config");
    tracing::info!("Starting SafeRide API on port {}", config.server.port);

    let gateway: Arc<dyn PaymentGateway> = match config.gateway.provider.as_str() {
        "hosted" => {
            let hosted = config
                .gateway
                .hosted
                .clone()
                .expect("gateway.hosted settings are required when provider = \"hosted\"");
            Arc::new(
                HostedCheckoutGateway::new(hosted).expect("Failed to build checkout gateway"),
            )
        }
        _ => {
            tracing::warn!("using the mock payment gateway; no real checkout sessions");
            Arc::new(MockGateway::new())
        }
    };

    let state = AppState::new(
        AuthSettings {
            secret: config.auth.jwt_secret.clone(),
        },
        WebhookSettings {
            secret: config.webhook.secret.clone(),
            tolerance_seconds: config.webhook.tolerance_seconds,
        },
        Arc::new(StaticRates::new(config.rates)),
        gateway,
        Arc::new(LoggingDispatcher),
        Arc::new(InMemoryDirectory::new()),
    );

    tokio::spawn(worker::run_expiration_sweeper(
        state.clone(),
        Duration::from_secs(config.sweeper.interval_seconds),
    ));

    let app = app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listener");
    axum::serve(listener, app).await.expect("Server error");
}
