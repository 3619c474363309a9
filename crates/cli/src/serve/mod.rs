//! `praxis serve` -- HTTP JSON API over the workflow engine.
//!
//! Security features:
//! - CORS headers on all responses (permissive)
//! - Per-IP rate limiting (default: 60 req/min, configurable)
//! - Optional API key authentication (`PRAXIS_API_KEY` or `api_key` in praxis.toml)
//!
//! Endpoints:
//! - GET   /health                              - Server status (exempt from auth)
//! - GET   /workflows                           - Entity types, statuses, terminal sets
//! - GET   /workflows/{type}/rules              - Rule table for one type
//! - POST  /entities/{type}                     - Create an entity
//! - GET   /entities/{type}?status=             - List entities
//! - GET   /entities/{type}/{id}                - Fetch one entity
//! - PATCH /entities/{type}/{id}                - Payload patch with expected version
//! - POST  /entities/{type}/{id}/transitions    - Fire an action
//! - GET   /entities/{type}/{id}/transitions    - Transition history
//! - GET   /entities/{type}/{id}/actions        - Available actions for the caller's role
//!
//! All responses use Content-Type: application/json.

mod error;
mod handlers;
mod middleware;
mod state;

use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::http::{Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{middleware as axum_middleware, Json, Router};
use praxis_engine::storage::InMemoryStorage;
use praxis_engine::{ChannelNotifier, Notifier, TracingNotifier, Workflow, WorkflowEngine};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use self::handlers::{
    handle_actions, handle_create, handle_get, handle_health, handle_history, handle_list,
    handle_list_workflows, handle_not_found, handle_patch, handle_rules, handle_transition,
};
use self::middleware::{auth_middleware, rate_limit_middleware};
use self::state::{AppState, RateLimiter};
use crate::config::ServeSettings;

/// Maximum request body size: 1 MB.
const MAX_BODY_SIZE: usize = 1024 * 1024;

/// Rate limit window duration in seconds (1 minute).
const RATE_LIMIT_WINDOW_SECS: u64 = 60;

/// Construct a JSON error response with the given status code and message.
fn json_error(status: StatusCode, message: &str) -> impl IntoResponse {
    (status, Json(serde_json::json!({"error": message})))
}

/// Pick the notifier: a bounded queue drained into the log when
/// `notify_queue` is configured, a plain log line otherwise.
fn build_notifier(queue: Option<usize>) -> Arc<dyn Notifier> {
    let Some(capacity) = queue else {
        return Arc::new(TracingNotifier);
    };
    let (notifier, mut rx) = ChannelNotifier::channel(capacity);
    tokio::spawn(async move {
        while let Some(n) = rx.recv().await {
            if let Err(e) = TracingNotifier.notify(n).await {
                tracing::warn!(error = %e, "notification consumer failed");
            }
        }
    });
    Arc::new(notifier)
}

pub(crate) fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PATCH])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/workflows", get(handle_list_workflows))
        .route("/workflows/{type}/rules", get(handle_rules))
        .route("/entities/{type}", get(handle_list).post(handle_create))
        .route("/entities/{type}/{id}", get(handle_get).patch(handle_patch))
        .route(
            "/entities/{type}/{id}/transitions",
            get(handle_history).post(handle_transition),
        )
        .route("/entities/{type}/{id}/actions", get(handle_actions))
        .fallback(handle_not_found)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .with_state(state)
}

/// Start the HTTP server with an in-memory store.
pub async fn start_server(
    workflow: Workflow,
    settings: ServeSettings,
) -> Result<(), Box<dyn std::error::Error>> {
    let engine = WorkflowEngine::new(Arc::new(workflow), Arc::new(InMemoryStorage::new()))
        .with_notifier(build_notifier(settings.notify_queue));

    if settings.api_key.is_some() {
        tracing::info!("API key authentication enabled");
    }
    tracing::info!(
        rate_limit = settings.rate_limit,
        "rate limit: {} requests per minute per IP",
        settings.rate_limit
    );

    let state = Arc::new(AppState {
        engine,
        rate_limiter: RateLimiter::new(
            settings.rate_limit,
            Duration::from_secs(RATE_LIMIT_WINDOW_SECS),
        ),
        api_key: settings.api_key,
    });
    let app = build_router(state);

    let addr = format!("0.0.0.0:{}", settings.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("praxis listening on http://{}", addr);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("server shut down");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("received shutdown signal");
}
