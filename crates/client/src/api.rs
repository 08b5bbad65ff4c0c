//! REST client.

use std::time::Duration;

use alumni_common::{ConversationPayload, MessagePayload};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{
    Client, RequestBuilder, Response,
    multipart::{Form, Part},
};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::json;
use tracing::debug;

use crate::{
    config::ClientConfig,
    error::{ClientError, ClientResult},
    reconnect::HistorySource,
};

/// Token and identity returned by sign-up and sign-in.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub id: String,
    pub username: String,
    pub token: String,
}

/// One media part of an outgoing message.
#[derive(Debug, Clone)]
pub struct MediaUpload {
    pub file_name: String,
    pub content_type: String,
    pub data: Bytes,
}

#[derive(Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    code: String,
    message: String,
}

fn http_client() -> ClientResult<Client> {
    Ok(Client::builder()
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(10))
        .build()?)
}

/// Create an account and return its access token.
pub async fn sign_up(base_url: &str, username: &str, password: &str) -> ClientResult<Credentials> {
    let config = ClientConfig::new(base_url, "")?;
    let request = http_client()?
        .post(config.api_url("auth/signup")?)
        .json(&json!({ "username": username, "password": password }));
    send(request).await
}

/// Exchange a username and password for the account's access token.
pub async fn sign_in(base_url: &str, username: &str, password: &str) -> ClientResult<Credentials> {
    let config = ClientConfig::new(base_url, "")?;
    let request = http_client()?
        .post(config.api_url("auth/signin")?)
        .json(&json!({ "username": username, "password": password }));
    send(request).await
}

/// Authenticated REST client.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    config: ClientConfig,
}

impl ApiClient {
    /// Create a client for the configured server and token.
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        Ok(Self {
            client: http_client()?,
            config,
        })
    }

    /// Open (or reopen) the direct conversation with another user.
    pub async fn start_direct_conversation(
        &self,
        other_user_id: &str,
    ) -> ClientResult<ConversationPayload> {
        let request = self
            .authorized(self.client.post(self.config.api_url("conversations/direct")?))
            .json(&json!({ "otherUserId": other_user_id }));
        send(request).await
    }

    /// Create a named conversation.
    pub async fn create_group_conversation(
        &self,
        name: &str,
        member_ids: &[String],
    ) -> ClientResult<ConversationPayload> {
        let request = self
            .authorized(self.client.post(self.config.api_url("conversations")?))
            .json(&json!({ "name": name, "memberIds": member_ids }));
        send(request).await
    }

    /// Conversations, most recently active first.
    pub async fn list_conversations(&self) -> ClientResult<Vec<ConversationPayload>> {
        let request = self.authorized(self.client.get(self.config.api_url("conversations")?));
        send(request).await
    }

    pub async fn get_conversation(&self, conversation_id: &str) -> ClientResult<ConversationPayload> {
        let url = self
            .config
            .api_url(&format!("conversations/{conversation_id}"))?;
        send(self.authorized(self.client.get(url))).await
    }

    /// Full history, oldest first.
    pub async fn get_messages(&self, conversation_id: &str) -> ClientResult<Vec<MessagePayload>> {
        let url = self
            .config
            .api_url(&format!("conversations/{conversation_id}/messages"))?;
        send(self.authorized(self.client.get(url))).await
    }

    /// Post a message with optional text and media.
    pub async fn send_message(
        &self,
        conversation_id: &str,
        content: Option<&str>,
        media: Vec<MediaUpload>,
    ) -> ClientResult<MessagePayload> {
        let mut form = Form::new();
        if let Some(content) = content {
            form = form.text("content", content.to_string());
        }
        for upload in media {
            let part = Part::bytes(upload.data.to_vec())
                .file_name(upload.file_name)
                .mime_str(&upload.content_type)?;
            form = form.part("media", part);
        }

        let url = self
            .config
            .api_url(&format!("conversations/{conversation_id}/messages"))?;
        send(self.authorized(self.client.post(url)).multipart(form)).await
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.bearer_auth(&self.config.token)
    }
}

#[async_trait]
impl HistorySource for ApiClient {
    async fn fetch_history(&self, conversation_id: &str) -> ClientResult<Vec<MessagePayload>> {
        self.get_messages(conversation_id).await
    }
}

async fn send<T: DeserializeOwned>(request: RequestBuilder) -> ClientResult<T> {
    let response = request.send().await?;
    decode(response).await
}

async fn decode<T: DeserializeOwned>(response: Response) -> ClientResult<T> {
    let status = response.status();
    let body = response.bytes().await?;

    if status.is_success() {
        let envelope: DataEnvelope<T> = serde_json::from_slice(&body)?;
        return Ok(envelope.data);
    }

    debug!(status = %status, "API request failed");

    let (code, message) = match serde_json::from_slice::<ErrorEnvelope>(&body) {
        Ok(envelope) => (envelope.error.code, envelope.error.message),
        Err(_) => (
            status.canonical_reason().unwrap_or("UNKNOWN").to_string(),
            String::from_utf8_lossy(&body).into_owned(),
        ),
    };

    Err(ClientError::Api {
        status: status.as_u16(),
        code,
        message,
    })
}
