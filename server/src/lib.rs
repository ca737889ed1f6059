#![warn(clippy::unwrap_in_result)]
#![warn(clippy::unwrap_used)]

use std::{path::PathBuf, sync::Arc};

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Json, Router,
};
use std::time::Duration;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::{classify::ServerErrorsFailureClass, trace::TraceLayer};
use tracing::Span;
use utoipa::OpenApi;

pub mod config;
pub mod domain;
pub mod error;
pub mod file_reply;
mod handlers;
pub mod keys;
pub mod sqlite;
pub mod sweeper;

extern crate serde;

#[cfg(test)] // <-- not needed in integration tests
extern crate rstest;

use crate::config::{Config, ConfigError};
use crate::domain::ObjectStore;
use crate::sqlite::{Mode, Sqlite, StoreError};
use std::net::SocketAddr;

use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

extern crate tokio;

const DEFAULT_LOG_FILTER: &str = "imgconv=debug,server=debug,converter=debug,tower_http=debug";

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database cannot be created: {0}")]
    Store(#[from] StoreError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// State shared by all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<PathBuf>,
    pub config: Arc<Config>,
}

impl AppState {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            db: Arc::new(config.database_path()),
            config: Arc::new(config),
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::banner,
        handlers::health,
        handlers::upload,
        handlers::convert,
        handlers::batch,
        handlers::status,
        handlers::download,
        handlers::list_files,
        handlers::delete_file,
    ),
    tags(
        (name = "health", description = "Service status"),
        (name = "files", description = "Stored objects"),
        (name = "conversion", description = "Image conversion"),
    ),
    info(description = "Image format converter backed by an object store")
)]
pub struct ApiDoc;

/// Runs the service until Ctrl+C or SIGTERM.
///
/// # Errors
///
/// Fails on invalid configuration, when the database cannot be created or
/// when the listening socket cannot be bound.
pub async fn run() -> Result<(), ServerError> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    // Start init
    let db = config.database_path();
    Sqlite::open(&db, Mode::ReadWrite)?.new_database()?;

    let socket = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(socket).await?;
    tracing::debug!("listening on {socket}");

    let state = AppState::new(config);
    let sweeper = sweeper::spawn(
        Arc::clone(&state.db),
        state.config.ttl,
        state.config.cleanup_interval,
    );

    let app = create_routes(state);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }
    Ok(())
}

pub fn create_routes(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::banner))
        .route("/api/health", get(handlers::health))
        .route(
            "/api/upload",
            // the handler enforces its own size cap so that oversized files get a 400
            post(handlers::upload).layer(DefaultBodyLimit::disable()),
        )
        .route("/api/convert", post(handlers::convert))
        .route("/api/batch", post(handlers::batch))
        .route("/api/status/:id", get(handlers::status))
        .route("/api/download/:file_key", get(handlers::download))
        .route("/api/files", get(handlers::list_files))
        .route("/api/file/:file_key", delete(handlers::delete_file))
        .route("/api-docs/openapi.json", get(openapi))
        .fallback(handlers::not_found)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http().on_failure(
                    |error: ServerErrorsFailureClass, _latency: Duration, _span: &Span| {
                        tracing::error!("Server error: {error}");
                    },
                ))
                .into_inner(),
        )
        .with_state(state)
}

async fn openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("signal received, starting graceful shutdown");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_lists_every_route() {
        // Act
        let doc = ApiDoc::openapi();

        // Assert
        let paths: Vec<&str> = doc.paths.paths.keys().map(String::as_str).collect();
        for expected in [
            "/",
            "/api/health",
            "/api/upload",
            "/api/convert",
            "/api/batch",
            "/api/status/{id}",
            "/api/download/{file_key}",
            "/api/files",
            "/api/file/{file_key}",
        ] {
            assert!(paths.contains(&expected), "{expected} missing");
        }
    }
}
