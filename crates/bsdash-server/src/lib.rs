//! bsdash-server: Axum web server with JSON API, SSE live view and the
//! embedded dashboard page.

pub mod api;
pub mod html;
pub mod state;

use axum::Router;
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::info;

use bsdash_core::DashboardEngine;

use crate::state::{AppState, IMAGE_ROUTE};

pub use state::ServerConfig;

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let images = ServeDir::new(state.qc_dir.as_ref());

    Router::new()
        // API routes
        .nest("/api", api::router())
        // Pipeline output images, straight from the QC directory
        .nest_service(IMAGE_ROUTE, images)
        // Frontend: serve embedded static files
        .fallback(api::serve_frontend)
        .with_state(state)
        .layer(cors)
}

/// Start the server and run until Ctrl-C.
pub async fn serve(config: ServerConfig) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, shutting down");
        }
        trigger.cancel();
    });
    serve_until(config, shutdown).await
}

/// Start the server and run until `shutdown` is cancelled.
pub async fn serve_until(config: ServerConfig, shutdown: CancellationToken) -> anyhow::Result<()> {
    let engine = DashboardEngine::start(config.engine_config())?;
    let app = build_router(AppState::new(engine.clone(), shutdown.clone()));

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("BrainSuite dashboard at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    engine.shutdown().await;
    Ok(())
}
