//! API middleware.

#![allow(missing_docs)]

use axum::{
    body::Body,
    extract::State,
    http::{Request, header},
    middleware::Next,
    response::Response,
};
use alumni_common::Config;
use alumni_core::{ConnectionRegistry, MessagingService, UserService};

/// Multipart framing overhead allowed on top of the attachment payload.
const BODY_OVERHEAD_BYTES: usize = 1024 * 1024;

/// Application state.
#[derive(Clone)]
pub struct AppState {
    pub user_service: UserService,
    pub messaging_service: MessagingService,
    pub registry: ConnectionRegistry,
    /// Outbound queue size of one live connection.
    pub live_buffer: usize,
    /// Largest accepted request body.
    pub max_body_bytes: usize,
}

impl AppState {
    /// Build the state, deriving limits from configuration.
    #[must_use]
    pub fn new(
        user_service: UserService,
        messaging_service: MessagingService,
        registry: ConnectionRegistry,
        config: &Config,
    ) -> Self {
        let attachment_bytes = config.storage.max_attachment_size as usize;
        let max_body_bytes = attachment_bytes
            .saturating_mul(config.messaging.max_attachments.max(1))
            .saturating_add(BODY_OVERHEAD_BYTES);

        Self {
            user_service,
            messaging_service,
            registry,
            live_buffer: config.messaging.live_buffer,
            max_body_bytes,
        }
    }
}

/// Authentication middleware.
///
/// Resolves a `Bearer` token to a user and stores it in the request
/// extensions; rejecting unauthenticated requests is left to the
/// [`AuthUser`](crate::extractors::AuthUser) extractor.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    if let Some(auth_header) = req.headers().get(header::AUTHORIZATION)
        && let Ok(auth_str) = auth_header.to_str()
        && let Some(token) = auth_str.strip_prefix("Bearer ")
        && let Ok(user) = state.user_service.authenticate_by_token(token.trim()).await
    {
        req.extensions_mut().insert(user);
    }

    next.run(req).await
}
