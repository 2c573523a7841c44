use axum::{
    extract::State,
    http::Method,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod app_config;
pub mod assignments;
pub mod bookings;
pub mod error;
pub mod metrics;
pub mod middleware;
pub mod payments;
pub mod state;
pub mod webhooks;
pub mod worker;

pub use state::{AppState, AuthSettings, WebhookSettings};

/// Build the full router. The webhook, health and metrics endpoints are
/// unauthenticated; everything else sits behind the JWT middleware.
pub fn app(state: AppState) -> Router {
    // CORS Middleware
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::USER_AGENT,
        ]);

    let protected = Router::new()
        .merge(bookings::routes())
        .merge(payments::routes())
        .merge(assignments::routes())
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::auth_middleware,
        ));

    Router::new()
        .merge(protected)
        .merge(webhooks::routes())
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics::metrics_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "bookings": state.bookings.len(),
    }))
}
