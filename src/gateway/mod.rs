//! HTTP gateway (Axum): the SSE adapter in front of the engine.
//!
//! Transport only — every decision lives in [`crate::engine`]. This module
//! is primarily used by the `wayfarer` server binary.

pub mod error;
pub mod handler;
pub mod state;


pub use error::GatewayError;
pub use handler::{cache_metrics_handler, cached_response_handler, chat_stream_handler};
pub use state::HandlerState;

use axum::{
    Json, Router,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::provider::TextProvider;
use crate::semantic::Embedder;

pub fn create_router_with_state<P, E>(state: HandlerState<P, E>) -> Router
where
    P: TextProvider + ?Sized + 'static,
    E: Embedder + ?Sized + 'static,
{
    Router::new()
        .route("/healthz", get(health_handler))
        .route("/chat/stream", post(chat_stream_handler))
        .route("/chat/response", get(cached_response_handler))
        .route("/metrics/caches", get(cache_metrics_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(serde::Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[tracing::instrument]
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}
