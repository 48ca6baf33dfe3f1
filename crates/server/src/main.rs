//! Souk-rs server entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Router, middleware, routing::get};
use souk_api::{
    ChannelEventPublisher, StreamingState, middleware::AppState, router as api_router,
    streaming_handler,
};
use souk_common::Config;
use souk_core::{
    ConversationService, EventPublisherService, NotificationService, ReviewLookup,
};
use souk_db::repositories::{
    ChatMessageRepository, ConversationRepository, NotificationRepository, ReviewRepository,
    UserRepository,
};
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
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
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "souk=debug,tower_http=debug".into()),
        )
        .init();

    info!("Starting souk-rs server...");

    let config = Config::load()?;

    let db = souk_db::init(&config).await?;
    info!("Connected to database");

    info!("Running database migrations...");
    souk_db::migrate(&db).await?;
    info!("Migrations completed");

    // Initialize repositories
    let db = Arc::new(db);
    let user_repo = UserRepository::new(Arc::clone(&db));
    let conversation_repo = ConversationRepository::new(Arc::clone(&db));
    let message_repo = ChatMessageRepository::new(Arc::clone(&db));
    let notification_repo = NotificationRepository::new(Arc::clone(&db));
    let review_repo = ReviewRepository::new(Arc::clone(&db));

    // Initialize streaming fan-out before the services so both can publish.
    let streaming = StreamingState::new(config.streaming.channel_capacity);
    let publisher: EventPublisherService =
        Arc::new(ChannelEventPublisher::new(streaming.clone()));

    let mut notification_service = NotificationService::new(notification_repo);
    notification_service.set_event_publisher(publisher.clone());

    let reviews: Arc<dyn ReviewLookup> = Arc::new(review_repo);
    let mut conversation_service = ConversationService::new(
        conversation_repo,
        message_repo,
        user_repo.clone(),
        notification_service.clone(),
        reviews,
    );
    conversation_service.set_event_publisher(publisher);

    let state = AppState {
        conversation_service,
        notification_service,
        user_repo,
        streaming,
    };

    let app = Router::new()
        .route("/streaming", get(streaming_handler))
        .nest("/api", api_router())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            souk_api::middleware::auth_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}
