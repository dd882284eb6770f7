//! HTTP route handlers for the JSON API.
//!
//! Four routes exist: the two health probes the orchestrator polls, the
//! question-answering endpoint, and a caller-identity helper. Responses are
//! never cacheable: answers depend on the index state and health probes
//! must always be fresh.
//!
//! Request tracing is enabled via middleware that generates a unique request
//! ID for each incoming request, allowing correlation of all logs within a
//! request.

pub mod ask;
pub mod health;
pub mod whoami;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use http::header::{HeaderValue, CACHE_CONTROL};
use tower_http::set_header::SetResponseHeaderLayer;

use crate::middleware::request_id_layer;
use crate::state::AppState;

/// Creates the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    // Health probes - must always be fresh for the orchestrator
    let health_routes = Router::new()
        .route("/health", get(health::live))
        .route("/health/ready", get(health::ready));

    // Q&A and diagnostics
    let api_routes = Router::new()
        .route("/ask", post(ask::ask))
        .route("/whoami", get(whoami::whoami));

    Router::new()
        .merge(health_routes)
        .merge(api_routes)
        .layer(SetResponseHeaderLayer::if_not_present(
            CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .with_state(state)
        // Request ID middleware - creates root span with request_id for correlation
        .layer(middleware::from_fn(request_id_layer))
}
