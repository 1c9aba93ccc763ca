//! Per-request orchestration.
//!
//! One request runs a fixed state machine: classify → fetch profile →
//! create session → derive cache key → fan-out stage workers → fan-in
//! events → terminal event → async persistence. Workers stream onto one
//! bounded channel consumed by the HTTP writer; coordination is a
//! `JoinSet` plus the event channel's close-once terminal guard.

mod persist;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::task::JoinSet;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::cache::Caches;
use crate::classify::{self, Classification};
use crate::config::Config;
use crate::cost::CostTable;
use crate::domain::{AiCityResponse, Domain, Intent, Location, SearchPreferences, Session};
use crate::events::{
    EventChannelConfig, EventPayload, EventSender, Navigation, StagePart, StreamEvent,
    event_channel,
};
use crate::hashing;
use crate::prompts;
use crate::provider::TextProvider;
use crate::repo::Repositories;
use crate::semantic::{Embedder, VectorSearch, blend_embeddings};
use crate::worker::{self, PartBuffers, StageJob, StageOutcome};

/// Weight of the profile embedding when blending with the query embedding.
const PROFILE_BLEND_WEIGHT: f32 = 0.3;

/// Result-set size for semantic cache population and POI vector search.
const SEMANTIC_RESULT_LIMIT: usize = 10;

/// One inbound chat message.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub user_id: Uuid,
    pub profile_id: Uuid,
    pub message: String,
    pub location: Option<Location>,
    pub session_id: Option<Uuid>,
    pub device_type: String,
}

impl ChatRequest {
    pub fn new(user_id: Uuid, profile_id: Uuid, message: impl Into<String>) -> Self {
        Self {
            user_id,
            profile_id,
            message: message.into(),
            location: None,
            session_id: None,
            device_type: "web".to_string(),
        }
    }
}

/// Engine tunables derived from [`Config`].
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub request_deadline: Duration,
    pub channel: EventChannelConfig,
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            request_deadline: Duration::from_secs(config.request_deadline_secs),
            channel: EventChannelConfig {
                capacity: config.event_channel_capacity,
                send_timeout: Duration::from_millis(config.event_send_timeout_ms),
                send_retries: config.event_send_retries,
            },
        }
    }
}

/// The orchestration engine. Process-wide; per-request state (channel,
/// buffers, cancellation) is scoped to each [`Engine::handle_message`]
/// call and released on every exit path.
pub struct Engine<P: TextProvider + ?Sized, E: Embedder + ?Sized> {
    provider: Arc<P>,
    embedder: Arc<E>,
    caches: Caches,
    repos: Repositories,
    cost: CostTable,
    settings: EngineSettings,
}

impl<P: TextProvider + ?Sized, E: Embedder + ?Sized> Clone for Engine<P, E> {
    fn clone(&self) -> Self {
        Self {
            provider: self.provider.clone(),
            embedder: self.embedder.clone(),
            caches: self.caches.clone(),
            repos: self.repos.clone(),
            cost: self.cost.clone(),
            settings: self.settings.clone(),
        }
    }
}

impl<P, E> Engine<P, E>
where
    P: TextProvider + ?Sized + 'static,
    E: Embedder + ?Sized + 'static,
{
    pub fn new(
        provider: Arc<P>,
        embedder: Arc<E>,
        caches: Caches,
        repos: Repositories,
        cost: CostTable,
        settings: EngineSettings,
    ) -> Self {
        Self {
            provider,
            embedder,
            caches,
            repos,
            cost,
            settings,
        }
    }

    /// Starts one request and returns the event stream for the SSE writer.
    ///
    /// The stream always ends: with a terminal `complete`/`error` on normal
    /// paths, or by channel close alone when the request is cancelled.
    pub fn handle_message(&self, request: ChatRequest) -> ReceiverStream<StreamEvent> {
        let (sender, receiver) = event_channel(self.settings.channel);
        let engine = self.clone();

        tokio::spawn(async move {
            engine.orchestrate(request, sender).await;
        });

        ReceiverStream::new(receiver)
    }

    /// Complete-response cache lookup for navigation replays.
    pub fn cached_response(&self, context_key: &str) -> Option<Arc<AiCityResponse>> {
        self.caches.response.get(context_key)
    }

    /// Vector search over a city's stored POIs.
    pub fn search_similar_pois(
        &self,
        city_id: Uuid,
        query_embedding: &[f32],
        limit: usize,
    ) -> crate::repo::RepoResult<Vec<(crate::domain::Poi, f32)>> {
        VectorSearch::new(self.repos.pois.clone()).search_pois(city_id, query_embedding, limit)
    }

    #[instrument(skip(self, request, sender), fields(user_id = %request.user_id, message_len = request.message.len()))]
    async fn orchestrate(&self, request: ChatRequest, sender: EventSender) {
        let started = Instant::now();
        let interaction_id = Uuid::new_v4();
        let cancel = CancellationToken::new();

        // Deadline and client-disconnect watcher; cancelled workers observe
        // the token at their next suspension point.
        let watcher = {
            let cancel = cancel.clone();
            let sender = sender.clone();
            let deadline = self.settings.request_deadline;
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(deadline) => {
                        warn!("request deadline exceeded, cancelling");
                        cancel.cancel();
                    }
                    _ = sender.consumer_gone() => {
                        debug!("client went away, cancelling");
                        cancel.cancel();
                    }
                    _ = cancel.cancelled() => {}
                }
            })
        };

        let classification = classify::classify(self.provider.as_ref(), &request.message).await;
        let intent = classify::detect_intent(&request.message);
        info!(
            city = %classification.city_name,
            domain = ?classification.domain,
            intent = ?intent,
            "request classified"
        );

        let preferences = match self.repos.profiles.get_preferences(request.profile_id) {
            Ok(preferences) => preferences,
            Err(e) => {
                warn!(error = %e, "profile fetch failed, continuing without preferences");
                SearchPreferences::default()
            }
        };

        let session = self.load_or_create_session(&request, &classification);
        let context_key = hashing::context_key(
            request.user_id,
            request.profile_id,
            &classification.city_name,
            &classification.cleaned_message,
            classification.domain,
            &preferences,
        );

        sender
            .send(EventPayload::Start {
                data: serde_json::json!({
                    "session_id": session.id,
                    "city_name": classification.city_name,
                    "domain": classification.domain,
                    "cache_key": context_key,
                }),
            })
            .await;
        sender
            .send(EventPayload::IntentClassified {
                data: serde_json::json!({ "intent": intent.as_str() }),
            })
            .await;

        let mut jobs = self.stage_jobs(
            &classification,
            &request,
            &preferences,
            &context_key,
            intent,
            &session,
        );

        // Semantic short-circuit: replay a cached near-duplicate result set
        // as the POI-bearing stage's single chunk and skip its worker.
        let buffers: PartBuffers = Arc::new(Mutex::new(HashMap::new()));
        let query_embedding = self
            .query_embedding(&classification, &preferences)
            .await;
        let mut semantic_outcomes: Vec<StageOutcome> = Vec::new();

        if let Some(embedding) = query_embedding.as_deref() {
            if let Some(outcome) = self
                .semantic_replay(&classification, embedding, &jobs, &sender, &buffers)
                .await
            {
                jobs.retain(|job| job.part != outcome.part);
                semantic_outcomes.push(outcome);
            }
        }

        sender
            .send(EventPayload::Progress {
                data: serde_json::json!({
                    "phase": "generating",
                    "parts": jobs.iter().map(|j| j.part.as_str()).collect::<Vec<_>>(),
                }),
            })
            .await;

        // Fan-out. Every worker shares the sink, the buffer map, and the
        // cancellation token; nothing else crosses task boundaries.
        let mut workers = JoinSet::new();
        for job in jobs {
            workers.spawn(worker::run_stage(
                self.provider.clone(),
                self.caches.stage.clone(),
                job,
                sender.clone(),
                buffers.clone(),
                cancel.clone(),
            ));
        }

        let mut outcomes = semantic_outcomes;
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => warn!(error = %e, "stage task panicked or was aborted"),
            }
        }

        let elapsed_ms = started.elapsed().as_millis() as i64;

        // Terminal. A cancelled request closes the channel without one.
        if cancel.is_cancelled() {
            sender.close();
        } else if outcomes.iter().any(StageOutcome::is_usable) {
            let navigation = navigation_for(
                session.id,
                &classification.city_name,
                classification.domain,
                &context_key,
            );
            sender
                .send_terminal(EventPayload::Complete {
                    data: serde_json::json!({
                        "session_id": session.id,
                        "city_name": classification.city_name,
                        "domain": classification.domain,
                        "cache_key": context_key,
                        "latency_ms": elapsed_ms,
                    }),
                    navigation: navigation.clone(),
                })
                .await;
        } else {
            let reason = outcomes
                .iter()
                .filter_map(|o| o.error.as_deref())
                .next()
                .unwrap_or("no stage produced usable output");
            sender
                .send_terminal(EventPayload::Error {
                    part: None,
                    error: format!("request failed: {reason}"),
                })
                .await;
            watcher.abort();
            cancel.cancel();
            return; // Fatal request: skip persistence.
        }

        watcher.abort();

        // Persistence runs detached from the client's lifetime.
        let persist = persist::PersistJob {
            interaction_id,
            request,
            classification,
            session,
            outcomes,
            context_key,
            query_embedding,
            latency_ms: elapsed_ms,
            intent,
        };
        let engine = self.clone();
        tokio::spawn(async move {
            engine.persist_request(persist).await;
        });
    }

    fn load_or_create_session(
        &self,
        request: &ChatRequest,
        classification: &Classification,
    ) -> Session {
        if let Some(session_id) = request.session_id {
            match self.repos.sessions.get(session_id) {
                Ok(Some(session)) => {
                    if let Err(e) = self.repos.sessions.touch(session.id, chrono::Utc::now()) {
                        warn!(error = %e, "failed to refresh session expiry");
                    }
                    return session;
                }
                Ok(None) => debug!(%session_id, "unknown session id, creating fresh session"),
                Err(e) => warn!(error = %e, "session load failed, creating fresh session"),
            }
        }

        let session = Session::new(
            request.user_id,
            request.profile_id,
            classification.city_name.clone(),
        );
        if let Err(e) = self.repos.sessions.save(&session) {
            warn!(error = %e, "session save failed, continuing unsaved");
        }
        session
    }

    /// Domain → worker set, with stage sub-keys derived from the context
    /// key. Continuation intents rewrite the itinerary stage prompt.
    fn stage_jobs(
        &self,
        classification: &Classification,
        request: &ChatRequest,
        preferences: &SearchPreferences,
        context_key: &str,
        intent: Intent,
        session: &Session,
    ) -> Vec<StageJob> {
        let city = &classification.city_name;
        let message = &classification.cleaned_message;

        let parts: Vec<(StagePart, String)> = match classification.domain {
            Domain::Itinerary | Domain::General => vec![
                (StagePart::CityData, prompts::city_data(city)),
                (StagePart::GeneralPois, prompts::general_poi(city, preferences)),
                (
                    StagePart::Itinerary,
                    self.itinerary_prompt(city, message, preferences, intent, session),
                ),
            ],
            Domain::Dining => vec![(
                StagePart::Restaurants,
                prompts::dining(city, message, preferences, request.location),
            )],
            Domain::Accommodation => vec![(
                StagePart::Hotels,
                prompts::accommodation(city, message, preferences, request.location),
            )],
            Domain::Activities => vec![(
                StagePart::Activities,
                prompts::activities(city, message, preferences, request.location),
            )],
        };

        parts
            .into_iter()
            .map(|(part, prompt)| StageJob {
                part,
                prompt,
                cache_key: hashing::stage_key(context_key, part.as_str()),
            })
            .collect()
    }

    /// Continuation flows reuse the previous run's cached itinerary when
    /// the intent asks for an add/remove; everything else is a fresh plan.
    fn itinerary_prompt(
        &self,
        city: &str,
        message: &str,
        preferences: &SearchPreferences,
        intent: Intent,
        session: &Session,
    ) -> String {
        if matches!(intent, Intent::AddPoi | Intent::RemovePoi) {
            let previous = session
                .session_context
                .get("last_cache_key")
                .and_then(|v| v.as_str())
                .and_then(|key| self.caches.response.get(key))
                .and_then(|response| response.itinerary.clone());

            if let Some(itinerary) = previous {
                let itinerary_json =
                    serde_json::to_string(&itinerary).unwrap_or_else(|_| "{}".to_string());
                return match intent {
                    Intent::AddPoi => prompts::continue_add(city, message, &itinerary_json),
                    _ => prompts::continue_remove(city, message, &itinerary_json),
                };
            }
            debug!("continuation intent without a cached itinerary, planning fresh");
        }

        prompts::personalized_itinerary(city, message, preferences)
    }

    /// Blended query embedding (profile + cleaned message). Embedding
    /// failures disable the semantic path for this request only.
    async fn query_embedding(
        &self,
        classification: &Classification,
        preferences: &SearchPreferences,
    ) -> Option<Vec<f32>> {
        let query = match self.embedder.embed(&classification.cleaned_message).await {
            Ok(embedding) => embedding,
            Err(e) => {
                warn!(error = %e, "query embedding failed, skipping semantic cache");
                return None;
            }
        };

        if preferences.is_empty() {
            return Some(query);
        }

        let profile_text = hashing::canonical_json(&serde_json::json!(preferences));
        match self.embedder.embed(&profile_text).await {
            Ok(profile) => Some(blend_embeddings(&query, &profile, PROFILE_BLEND_WEIGHT)),
            Err(e) => {
                warn!(error = %e, "profile embedding failed, using query embedding alone");
                Some(query)
            }
        }
    }

    /// Vector-cache hit: replay the cached POI list as the POI-bearing
    /// stage's single chunk and report it as a cache-hit outcome.
    async fn semantic_replay(
        &self,
        classification: &Classification,
        query_embedding: &[f32],
        jobs: &[StageJob],
        sender: &EventSender,
        buffers: &PartBuffers,
    ) -> Option<StageOutcome> {
        let part = poi_bearing_part(classification.domain);
        let job = jobs.iter().find(|job| job.part == part)?;

        // Country is unknown at classification time; match any persisted
        // row under this name.
        let city = self
            .repos
            .cities
            .find_by_name(&classification.city_name)
            .ok()
            .flatten()?;
        let city_id = city.id?;

        let params = semantic_search_params(classification.domain, part);
        let results = self
            .caches
            .vector
            .lookup(query_embedding, city_id, &params)?;

        info!(part = %part, results = results.len(), "semantic cache hit, skipping worker");
        sender
            .send(EventPayload::SemanticContextGenerated {
                data: serde_json::json!({
                    "source": "vector_cache",
                    "part": part.as_str(),
                    "result_count": results.len(),
                }),
            })
            .await;

        let wrapper = match part {
            StagePart::Restaurants => "restaurants",
            StagePart::Hotels => "hotels",
            StagePart::Activities => "activities",
            _ => "points_of_interest",
        };
        let text = serde_json::json!({ wrapper: results }).to_string();

        buffers.lock().insert(part, text.clone());
        sender
            .send(EventPayload::Chunk {
                part,
                chunk: text.clone(),
            })
            .await;

        Some(StageOutcome {
            part,
            prompt: job.prompt.clone(),
            text,
            cache_hit: true,
            cancelled: false,
            usage: Default::default(),
            error: None,
        })
    }

}

/// The stage whose payload the semantic cache can stand in for.
fn poi_bearing_part(domain: Domain) -> StagePart {
    match domain {
        Domain::Dining => StagePart::Restaurants,
        Domain::Accommodation => StagePart::Hotels,
        Domain::Activities => StagePart::Activities,
        Domain::Itinerary | Domain::General => StagePart::GeneralPois,
    }
}

/// Scope object compared (as canonical JSON) on vector-cache lookups.
fn semantic_search_params(domain: Domain, part: StagePart) -> serde_json::Value {
    serde_json::json!({
        "domain": domain.as_str(),
        "part": part.as_str(),
        "limit": SEMANTIC_RESULT_LIMIT,
    })
}

/// `/<route>?sessionId=..&cityName=..&domain=<route>&cacheKey=..`
fn navigation_for(
    session_id: Uuid,
    city_name: &str,
    domain: Domain,
    cache_key: &str,
) -> Navigation {
    let route = domain.route_type();
    let url = format!(
        "/{route}?sessionId={session_id}&cityName={}&domain={route}&cacheKey={cache_key}",
        urlencoding::encode(city_name),
    );

    let query_params = HashMap::from([
        ("sessionId".to_string(), session_id.to_string()),
        ("cityName".to_string(), city_name.to_string()),
        ("domain".to_string(), route.to_string()),
        ("cacheKey".to_string(), cache_key.to_string()),
    ]);

    Navigation {
        url,
        route_type: route.to_string(),
        query_params,
    }
}

/// Receiver wrapper so gateway code can name the stream type.
pub type EventStream = ReceiverStream<StreamEvent>;
