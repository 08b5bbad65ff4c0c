//! API integration tests.
//!
//! These tests drive the full router against a migrated in-memory SQLite
//! database.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{path::PathBuf, sync::Arc};

use alumni_api::{AppState, app};
use alumni_common::{
    Config, LiveEvent, LocalStorage, MessagingConfig, StorageSettings,
    config::{DatabaseConfig, ServerConfig},
};
use alumni_core::{
    ConnectionRegistry, DeliveryDispatcher, EchoPolicy, MessageStore, MessagingService,
    UserService,
};
use alumni_db::{entities::user, repositories::UserRepository, test_utils::TestDatabase};
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use sea_orm::{DatabaseConnection, Set};
use serde_json::{Value, json};
use tower::ServiceExt;

const BOUNDARY: &str = "alumni-test-boundary";

struct TestApp {
    router: Router,
    registry: ConnectionRegistry,
    files: PathBuf,
}

impl Drop for TestApp {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.files);
    }
}

fn create_test_config() -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            url: "http://localhost".to_string(),
        },
        database: DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            min_connections: 1,
        },
        storage: StorageSettings {
            max_attachment_size: 16,
            ..StorageSettings::default()
        },
        messaging: MessagingConfig::default(),
    }
}

async fn insert_user(db: &Arc<DatabaseConnection>, id: &str) {
    UserRepository::new(db.clone())
        .create(user::ActiveModel {
            id: Set(id.to_string()),
            username: Set(id.to_string()),
            username_lower: Set(id.to_lowercase()),
            token: Set(Some(format!("token-{id}"))),
            password_hash: Set(None),
            name: Set(None),
            avatar_url: Set(None),
            created_at: Set(chrono::Utc::now().into()),
            updated_at: Set(None),
        })
        .await
        .unwrap();
}

async fn create_test_app() -> TestApp {
    let db = Arc::new(TestDatabase::sqlite_in_memory().await.unwrap().conn);
    for id in ["alice", "bob", "carol"] {
        insert_user(&db, id).await;
    }

    let mut config = create_test_config();
    let files = std::env::temp_dir().join(format!("alumni-api-{}", uuid::Uuid::new_v4()));
    config.storage.base_path = files.clone();

    let registry = ConnectionRegistry::new();
    let user_service = UserService::new(UserRepository::new(db.clone()));
    let mut messaging_service = MessagingService::new(
        MessageStore::from_connection(db.clone()),
        UserRepository::new(db),
        Arc::new(LocalStorage::from_settings(&config.storage)),
        &config,
    );
    messaging_service.set_event_publisher(Arc::new(DeliveryDispatcher::new(
        registry.clone(),
        EchoPolicy::ExcludeSender,
    )));

    let state = AppState::new(user_service, messaging_service, registry.clone(), &config);

    TestApp {
        router: app(state),
        registry,
        files,
    }
}

async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri).method("GET");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

fn post_json(uri: &str, token: Option<&str>, body: &Value) -> Request<Body> {
    let mut builder = Request::builder()
        .uri(uri)
        .method("POST")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn post_message(
    conversation_id: &str,
    token: &str,
    content: Option<&str>,
    media: &[(&str, &str, &[u8])],
) -> Request<Body> {
    let mut body = Vec::new();
    if let Some(content) = content {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"content\"\r\n\r\n{content}\r\n"
            )
            .as_bytes(),
        );
    }
    for (file_name, content_type, data) in media {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"media\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .uri(format!("/api/conversations/{conversation_id}/messages"))
        .method("POST")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn direct_conversation(app: &TestApp, token: &str, other: &str) -> String {
    let (status, body) = send(
        app,
        post_json(
            "/api/conversations/direct",
            Some(token),
            &json!({ "otherUserId": other }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["data"]["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_rest_requires_bearer_token() {
    let app = create_test_app().await;

    let (status, body) = send(&app, get("/api/conversations", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let (status, _) = send(&app, get("/api/conversations", Some("bogus"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(&app, get("/api/conversations", Some("token-alice"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!([]));
}

#[tokio::test]
async fn test_signup_then_signin() {
    let app = create_test_app().await;

    let (status, body) = send(
        &app,
        post_json(
            "/api/auth/signup",
            None,
            &json!({ "username": "dave", "password": "password123" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let token = body["data"]["token"].as_str().unwrap().to_string();
    assert!(!token.is_empty());

    let (status, body) = send(
        &app,
        post_json(
            "/api/auth/signin",
            None,
            &json!({ "username": "dave", "password": "password123" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["token"], token.as_str());

    let (status, _) = send(
        &app,
        post_json(
            "/api/auth/signin",
            None,
            &json!({ "username": "dave", "password": "wrong-password" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        &app,
        post_json(
            "/api/auth/signup",
            None,
            &json!({ "username": "dave", "password": "password123" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_start_direct_conversation_is_idempotent() {
    let app = create_test_app().await;

    let first = direct_conversation(&app, "token-alice", "bob").await;
    let second = direct_conversation(&app, "token-bob", "alice").await;
    assert_eq!(first, second);

    let (status, body) = send(
        &app,
        get(&format!("/api/conversations/{first}"), Some("token-bob")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["isDirect"], true);
    assert_eq!(body["data"]["members"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_start_direct_conversation_rejects_bad_recipients() {
    let app = create_test_app().await;

    for other in [json!({}), json!({ "otherUserId": "  " }), json!({ "otherUserId": "alice" })] {
        let (status, body) = send(
            &app,
            post_json("/api/conversations/direct", Some("token-alice"), &other),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{other}");
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    let (status, _) = send(
        &app,
        post_json(
            "/api/conversations/direct",
            Some("token-alice"),
            &json!({ "otherUserId": "nobody" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_send_message_and_read_history() {
    let app = create_test_app().await;
    let conversation = direct_conversation(&app, "token-alice", "bob").await;

    let (status, body) = send(
        &app,
        post_message(&conversation, "token-alice", Some("hi"), &[]),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["content"], "hi");
    assert_eq!(body["data"]["sender"]["username"], "alice");

    let (status, body) = send(
        &app,
        post_message(
            &conversation,
            "token-bob",
            None,
            &[("pic.png", "image/png", &b"\x89PNG"[..])],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["content"], Value::Null);
    assert_eq!(body["data"]["attachments"][0]["kind"], "image");
    assert_eq!(body["data"]["attachments"][0]["contentType"], "image/png");

    let (status, body) = send(
        &app,
        get(
            &format!("/api/conversations/{conversation}/messages"),
            Some("token-bob"),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let history = body["data"].as_array().unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0]["content"], "hi");
    assert_eq!(history[1]["senderId"], "bob");

    let (_, body) = send(&app, get("/api/conversations", Some("token-alice"))).await;
    assert_eq!(body["data"][0]["lastMessage"]["senderId"], "bob");
}

#[tokio::test]
async fn test_send_message_validation() {
    let app = create_test_app().await;
    let conversation = direct_conversation(&app, "token-alice", "bob").await;

    let (status, _) = send(&app, post_message(&conversation, "token-alice", None, &[])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        post_message(&conversation, "token-alice", Some("   "), &[]),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        post_message(
            &conversation,
            "token-alice",
            None,
            &[("notes.txt", "text/plain", &b"hello"[..])],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        post_message(
            &conversation,
            "token-alice",
            None,
            &[("big.png", "image/png", &[0u8; 32][..])],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_non_member_gets_not_found() {
    let app = create_test_app().await;
    let conversation = direct_conversation(&app, "token-alice", "bob").await;

    let (status, _) = send(
        &app,
        get(
            &format!("/api/conversations/{conversation}/messages"),
            Some("token-carol"),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        post_message(&conversation, "token-carol", Some("hi"), &[]),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_message_is_pushed_to_recipient_connection() {
    let app = create_test_app().await;
    let conversation = direct_conversation(&app, "token-alice", "bob").await;
    let (_bob, mut bob_rx) = app.registry.open("bob", 8).await;

    let (status, body) = send(
        &app,
        post_message(&conversation, "token-alice", Some("hi"), &[]),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let frame = bob_rx.recv().await.unwrap();
    let LiveEvent::NewMessage { message } = serde_json::from_str(&frame).unwrap();
    assert_eq!(message.id, body["data"]["id"].as_str().unwrap());
}

#[tokio::test]
async fn test_create_group_conversation() {
    let app = create_test_app().await;

    let (status, body) = send(
        &app,
        post_json(
            "/api/conversations",
            Some("token-alice"),
            &json!({ "name": "Reunion", "memberIds": ["bob", "carol"] }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "Reunion");
    assert_eq!(body["data"]["isDirect"], false);
    assert_eq!(body["data"]["members"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_streaming_refuses_missing_or_invalid_token() {
    let app = create_test_app().await;

    let (status, _) = send(&app, get("/streaming", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, get("/streaming?token=", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, get("/streaming?token=bogus", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(app.registry.connection_count().await, 0);
}

#[tokio::test]
async fn test_streaming_with_valid_token_still_requires_upgrade() {
    let app = create_test_app().await;

    let (status, _) = send(&app, get("/streaming?i=token-bob", None)).await;
    assert_ne!(status, StatusCode::UNAUTHORIZED);
    assert!(status.is_client_error());
    assert_eq!(app.registry.connection_count().await, 0);
}

#[tokio::test]
async fn test_unknown_endpoint_returns_404() {
    let app = create_test_app().await;
    let (status, _) = send(&app, get("/api/nonexistent", Some("token-alice"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
