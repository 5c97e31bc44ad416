//! HTTP server implementation using Axum.

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use rally_core::config::GatewayConfig;
use rally_push::Dispatcher;
use rally_store::DocStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared state for the gateway server.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<DocStore>,
    pub dispatcher: Arc<Dispatcher>,
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(store: Arc<DocStore>, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            store,
            dispatcher,
            start_time: std::time::Instant::now(),
        }
    }
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    let shared = Arc::new(state);
    Router::new()
        .route("/health", get(super::routes::health_check))
        .route("/api/v1/tokens", post(super::routes::register_token))
        .route(
            "/api/v1/notifications",
            post(super::routes::record_notification),
        )
        .route(
            "/api/v1/notifications/send",
            post(super::routes::send_notifications),
        )
        .route(
            "/api/v1/notifications/{uid}",
            get(super::routes::list_notifications),
        )
        .route("/api/v1/reminders/seed", post(super::routes::seed_reminders))
        .route(
            "/api/v1/events/{event_id}/notify-registration",
            post(super::routes::notify_registration),
        )
        .route(
            "/api/v1/events/{event_id}/notify-change",
            post(super::routes::notify_change),
        )
        .layer(
            CorsLayer::new()
                .allow_methods([
                    axum::http::Method::GET,
                    axum::http::Method::POST,
                    axum::http::Method::OPTIONS,
                ])
                .allow_headers(Any)
                .allow_origin(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(shared)
}

/// Start the HTTP server. The due-reminder runner is spawned separately by
/// the binary; this only serves the API.
pub async fn start(config: &GatewayConfig, state: AppState) -> anyhow::Result<()> {
    let app = build_router(state);
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("🌐 gateway listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}
