//! HTTP server setup and routing

use crate::error::{Error, Result};
use crate::playback::PlaybackEngine;
use axum::{
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub engine: Arc<PlaybackEngine>,
    pub port: u16,
}

/// Build the router with every endpoint attached
pub fn build_router(ctx: AppContext) -> Router {
    Router::new()
        .route("/health", get(super::handlers::health))
        // Playlist management
        .route(
            "/guilds/:guild_id/playlist",
            get(super::handlers::list_playlist)
                .post(super::handlers::add_track)
                .delete(super::handlers::remove_track),
        )
        // Playback control
        .route("/guilds/:guild_id/play", post(super::handlers::play))
        .route("/guilds/:guild_id/skip", post(super::handlers::skip))
        .route("/guilds/:guild_id/stop", post(super::handlers::stop))
        .route("/guilds/:guild_id/status", get(super::handlers::status))
        // SSE event stream
        .route("/events", get(super::sse::event_stream))
        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Serve the API until `shutdown` resolves
pub async fn run(ctx: AppContext, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], ctx.port));
    let app = build_router(ctx);

    info!("Starting HTTP server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Http(format!("failed to bind {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| Error::Http(e.to_string()))?;

    info!("HTTP server stopped");
    Ok(())
}
