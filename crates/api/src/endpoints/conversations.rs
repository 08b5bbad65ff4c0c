//! Conversation and message endpoints.

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    routing::{get, post},
};
use alumni_common::{AppError, AppResult, ConversationPayload, MessagePayload};
use alumni_core::{AttachmentUpload, CreateGroupInput, SendMessageInput};
use serde::Deserialize;
use tracing::debug;

use crate::{extractors::AuthUser, middleware::AppState, response::ApiResponse};

/// Create conversations router.
pub fn router(max_body_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/", get(list_conversations).post(create_group))
        .route("/direct", post(start_direct))
        .route("/{conversation_id}", get(get_conversation))
        .route(
            "/{conversation_id}/messages",
            get(get_messages)
                .post(send_message)
                .layer(DefaultBodyLimit::max(max_body_bytes)),
        )
}

/// Start direct conversation request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartDirectRequest {
    #[serde(default)]
    pub other_user_id: String,
}

/// Open the direct conversation with another user, creating it on first use.
async fn start_direct(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<StartDirectRequest>,
) -> AppResult<ApiResponse<ConversationPayload>> {
    let conversation = state
        .messaging_service
        .start_direct_conversation(&user.id, &req.other_user_id)
        .await?;

    Ok(ApiResponse::ok(conversation))
}

/// Create a named group conversation.
async fn create_group(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<CreateGroupInput>,
) -> AppResult<ApiResponse<ConversationPayload>> {
    let conversation = state
        .messaging_service
        .create_group_conversation(&user.id, req)
        .await?;

    Ok(ApiResponse::ok(conversation))
}

/// The caller's conversations, most recently active first.
async fn list_conversations(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<Vec<ConversationPayload>>> {
    let conversations = state.messaging_service.list_conversations(&user.id).await?;
    Ok(ApiResponse::ok(conversations))
}

async fn get_conversation(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> AppResult<ApiResponse<ConversationPayload>> {
    let conversation = state
        .messaging_service
        .get_conversation(&user.id, &conversation_id)
        .await?;

    Ok(ApiResponse::ok(conversation))
}

/// Full message history, oldest first.
async fn get_messages(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> AppResult<ApiResponse<Vec<MessagePayload>>> {
    let messages = state
        .messaging_service
        .get_messages(&user.id, &conversation_id)
        .await?;

    Ok(ApiResponse::ok(messages))
}

/// Post a message.
///
/// Multipart parts: an optional `content` text part and any number of
/// `media` file parts.
async fn send_message(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    mut multipart: Multipart,
) -> AppResult<ApiResponse<MessagePayload>> {
    let mut input = SendMessageInput::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();

        match name.as_str() {
            "content" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                input.content = Some(text);
            }
            "media" => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;

                input.attachments.push(AttachmentUpload {
                    file_name,
                    content_type,
                    data,
                });
            }
            _ => {
                debug!(field = %name, "Ignoring unknown multipart field");
            }
        }
    }

    let message = state
        .messaging_service
        .send_message(&user.id, &conversation_id, input)
        .await?;

    Ok(ApiResponse::ok(message))
}
