//! HTTP API layer for the alumni messaging backend.
//!
//! This crate provides the REST API and the live channel:
//!
//! - **Endpoints**: sign-up/sign-in, conversations, message ingest and history
//! - **Extractors**: Authentication
//! - **Middleware**: Bearer token authentication
//! - **Streaming**: WebSocket live channel
//!
//! Built on Axum 0.8 with Tower middleware stack.

pub mod endpoints;
pub mod extractors;
pub mod middleware;
pub mod response;
pub mod streaming;

use axum::{Router, routing::get};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub use endpoints::router;
pub use middleware::AppState;
pub use streaming::streaming_handler;

/// Assemble the HTTP application: REST API under `/api` and the live
/// channel at `/streaming`.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/streaming", get(streaming_handler))
        .nest("/api", router(state.max_body_bytes))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
