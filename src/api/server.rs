//! HTTP server implementation for the API

use anyhow::Result;
use axum::{
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use super::{handlers, models::ApiError};
use crate::config::Config;
use crate::processing::IngestionCoordinator;

/// Shared application context, built once at startup and handed to every
/// request
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub coordinator: Arc<IngestionCoordinator>,
}

impl AppContext {
    pub fn new(config: Config, coordinator: IngestionCoordinator) -> Self {
        Self {
            config: Arc::new(config),
            coordinator: Arc::new(coordinator),
        }
    }

    /// Validate `config` and build the coordinator it describes
    pub fn from_config(config: Config) -> crate::Result<Self> {
        config.validate()?;
        let coordinator = IngestionCoordinator::from_config(&config)?;
        Ok(Self::new(config, coordinator))
    }
}

/// Build the application router
pub fn build_router(context: AppContext) -> Router {
    let body_limit = context.config.server.max_upload_bytes();

    // Configure CORS to allow browser access
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .route("/health", get(health_handler))
        .route("/process_video", post(process_video_handler))
        .fallback(not_found_handler)
        .with_state(context)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
        )
}

/// Configure and start the HTTP server
pub async fn start_http_server(context: AppContext) -> Result<()> {
    let addr = format!("{}:{}", context.config.server.host, context.config.server.port);
    info!("🚀 Starting HTTP server on {}", addr);

    let app = build_router(context);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("🌐 API server listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("👋 API server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("🛑 Shutdown signal received");
}

/// Health check handler
async fn health_handler(State(context): State<AppContext>) -> impl IntoResponse {
    (StatusCode::OK, Json(handlers::health_check(&context.coordinator)))
}

/// Video upload handler
async fn process_video_handler(
    State(context): State<AppContext>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let report = handlers::process_video(Arc::clone(&context.coordinator), multipart?).await?;
    Ok((StatusCode::OK, Json(report)))
}

async fn not_found_handler() -> ApiError {
    ApiError::new(StatusCode::NOT_FOUND, "Not Found")
}
