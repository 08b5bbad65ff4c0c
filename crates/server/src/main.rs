//! Alumni messaging server entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use alumni_api::AppState;
use alumni_common::{Config, LocalStorage};
use alumni_core::{
    ConnectionRegistry, DeliveryDispatcher, EchoPolicy, MessageStore, MessagingService,
    UserService,
};
use alumni_db::repositories::UserRepository;
use tokio::signal;
use tower_http::services::ServeDir;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Waits for a shutdown signal (SIGINT or SIGTERM).
///
/// On Unix systems, this listens for both SIGINT (Ctrl+C) and SIGTERM.
/// On Windows, this only listens for Ctrl+C.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received SIGINT, initiating graceful shutdown...");
        },
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "alumni=debug,tower_http=debug".into()),
        )
        .init();

    info!("Starting alumni server...");

    // Load configuration
    let config = Config::load()?;

    // Connect to database
    let db = Arc::new(alumni_db::init(&config).await?);
    info!("Connected to database");

    // Run migrations
    info!("Running database migrations...");
    alumni_db::migrate(&db).await?;
    info!("Migrations completed");

    // Live delivery
    let registry = ConnectionRegistry::new();
    let dispatcher = DeliveryDispatcher::new(
        registry.clone(),
        EchoPolicy::from_echo_flag(config.messaging.echo_to_sender),
    );

    // Services
    let storage = Arc::new(LocalStorage::from_settings(&config.storage));
    let user_service = UserService::new(UserRepository::new(Arc::clone(&db)));
    let mut messaging_service = MessagingService::new(
        MessageStore::from_connection(Arc::clone(&db)),
        UserRepository::new(Arc::clone(&db)),
        storage,
        &config,
    );
    messaging_service.set_event_publisher(Arc::new(dispatcher));

    let state = AppState::new(user_service, messaging_service, registry, &config);

    // Build router
    let files = ServeDir::new(&config.storage.base_path);
    let files_route = format!("/{}", config.storage.base_url.trim_matches('/'));
    let app = if files_route == "/" {
        alumni_api::app(state).fallback_service(files)
    } else {
        alumni_api::app(state).nest_service(&files_route, files)
    };

    // Start server with graceful shutdown
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}
