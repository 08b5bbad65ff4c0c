//! API endpoints.

mod auth;
mod conversations;

use axum::Router;

use crate::middleware::AppState;

/// Create the API router.
///
/// `max_body_bytes` caps the message-ingest body (all media parts included).
pub fn router(max_body_bytes: usize) -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::router())
        .nest("/conversations", conversations::router(max_body_bytes))
}
