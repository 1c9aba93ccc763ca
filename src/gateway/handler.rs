use axum::{
    Json,
    extract::{Query, State},
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use futures_util::StreamExt;
use serde::Deserialize;
use std::convert::Infallible;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::error::GatewayError;
use super::state::HandlerState;
use crate::domain::Location;
use crate::engine::ChatRequest;
use crate::provider::TextProvider;
use crate::semantic::Embedder;

#[derive(Debug, Deserialize)]
pub struct ChatStreamBody {
    pub message: String,
    pub user_id: Uuid,
    pub profile_id: Uuid,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub session_id: Option<Uuid>,
    #[serde(default)]
    pub device_type: Option<String>,
}

/// `POST /chat/stream` — runs one request and streams its events over SSE.
/// Each SSE `data:` line is one engine event; clients demultiplex chunks by
/// `part` and stop on `complete`/`error`.
#[instrument(skip(state, body), fields(user_id = %body.user_id))]
pub async fn chat_stream_handler<P, E>(
    State(state): State<HandlerState<P, E>>,
    Json(body): Json<ChatStreamBody>,
) -> Result<Response, GatewayError>
where
    P: TextProvider + ?Sized + 'static,
    E: Embedder + ?Sized + 'static,
{
    if body.message.trim().is_empty() {
        return Err(GatewayError::InvalidRequest("message is empty".into()));
    }

    let mut request = ChatRequest::new(body.user_id, body.profile_id, body.message);
    request.session_id = body.session_id;
    if let Some(device_type) = body.device_type {
        request.device_type = device_type;
    }
    if let (Some(latitude), Some(longitude)) = (body.latitude, body.longitude) {
        request.location = Some(Location {
            latitude,
            longitude,
        });
    }

    debug!("starting chat stream");
    let events = state.engine.handle_message(request);

    let sse_stream = events.map(|event| {
        let sse_event = match serde_json::to_string(&event) {
            Ok(json) => Event::default().data(json),
            Err(e) => Event::default().comment(format!("serialization-error: {e}")),
        };
        Ok::<_, Infallible>(sse_event)
    });

    Ok(Sse::new(sse_stream)
        .keep_alive(KeepAlive::default())
        .into_response())
}

#[derive(Debug, Deserialize)]
pub struct CachedResponseQuery {
    #[serde(rename = "cacheKey")]
    pub cache_key: String,
}

/// `GET /chat/response?cacheKey=<hex>` — replays a completed response from
/// the complete-response cache; navigation URLs point clients here.
#[instrument(skip(state))]
pub async fn cached_response_handler<P, E>(
    State(state): State<HandlerState<P, E>>,
    Query(query): Query<CachedResponseQuery>,
) -> Result<Response, GatewayError>
where
    P: TextProvider + ?Sized + 'static,
    E: Embedder + ?Sized + 'static,
{
    match state.engine.cached_response(&query.cache_key) {
        Some(response) => Ok(Json(response.as_ref().clone()).into_response()),
        None => Err(GatewayError::CacheEntryNotFound(query.cache_key)),
    }
}

#[derive(serde::Serialize)]
pub struct CacheMetricsResponse {
    pub stage: crate::cache::MetricsSnapshot,
    pub response: crate::cache::MetricsSnapshot,
    pub vector: crate::cache::MetricsSnapshot,
}

/// `GET /metrics/caches` — per-cache hit/miss/set/size counters.
pub async fn cache_metrics_handler<P, E>(
    State(state): State<HandlerState<P, E>>,
) -> Json<CacheMetricsResponse>
where
    P: TextProvider + ?Sized + 'static,
    E: Embedder + ?Sized + 'static,
{
    Json(CacheMetricsResponse {
        stage: state.caches.stage.metrics(),
        response: state.caches.response.metrics(),
        vector: state.caches.vector.metrics(),
    })
}
