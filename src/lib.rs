//! # Wayfarer Engine
//!
//! Personalized city-discovery engine. One free-form message in, a
//! structured multi-part streaming response out.
//!
//! ```text
//! message → classify → cache key → fan-out workers → one event channel → SSE
//!                                        │
//!                                (all workers done)
//!                                        ▼
//!                          async persistence + cache populate
//! ```
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use wayfarer::config::Config;
//!
//! # fn run() -> anyhow::Result<()> {
//! let config = Config::from_env()?;
//! println!("Listening on {}", config.socket_addr());
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature flags
//!
//! | Feature | Purpose |
//! |---------|---------|
//! | `mock` | Scripted provider + deterministic embedder for tests/offline |
//!
//! ## Modules
//!
//! - [`engine`] - Per-request orchestration (fan-out / fan-in)
//! - [`worker`] - One streaming stage worker per part
//! - [`events`] - Typed event stream + dead-letter delivery budget
//! - [`cache`] - Exact stage, complete-response, and semantic vector caches
//! - [`classify`] - City / domain / intent extraction
//! - [`parser`] - Tolerant multi-shape JSON decoding
//! - [`repo`] - Idempotent SQLite persistence
//! - [`semantic`] - Embeddings, blending, vector search
//! - [`provider`] - Generative backend adapter
//! - [`gateway`] - Axum SSE transport

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod cache;
pub mod classify;
pub mod config;
pub mod cost;
pub mod domain;
pub mod engine;
pub mod events;
pub mod gateway;
pub mod hashing;
pub mod parser;
pub mod prompts;
pub mod provider;
pub mod repo;
pub mod semantic;
pub mod worker;

pub use cache::{Caches, MetricsSnapshot, ResponseCache, StageCache, VectorCache, VectorCacheEntry};
pub use classify::{Classification, classify, detect_domain, detect_intent};
pub use config::{Config, ConfigError, ModelRates};
pub use cost::CostTable;
pub use domain::{
    Activity, AiCityResponse, City, ConversationMessage, Domain, Hotel, Intent, Interaction,
    Itinerary, Location, Poi, Restaurant, SearchPreferences, Session, SessionStatus,
};
pub use engine::{ChatRequest, Engine, EngineSettings, EventStream};
pub use events::{
    DeadLetterQueue, EventChannelConfig, EventPayload, EventSender, Navigation, StagePart,
    StreamEvent, event_channel,
};
pub use hashing::{canonical_json, context_key, prompt_sha256, stage_key};
pub use parser::{
    parse_activities, parse_city_data, parse_hotels, parse_itinerary, parse_pois,
    parse_restaurants, strip_code_fences,
};
pub use provider::{
    ChunkStream, GeminiProvider, GenerateChunk, Generation, GenerationConfig, ProviderError,
    TextProvider, TokenUsage,
};
#[cfg(any(test, feature = "mock"))]
pub use provider::{MockBehavior, MockProvider};
pub use repo::{
    CityRepo, Db, FavoriteRepo, InteractionRepo, PoiRepo, ProfileRepo, RepoError, Repositories,
    SessionRepo,
};
#[cfg(any(test, feature = "mock"))]
pub use semantic::MockEmbedder;
pub use semantic::{
    Embedder, EmbedderError, HttpEmbedder, VectorSearch, blend_embeddings, cosine_similarity,
};
pub use worker::{PartBuffers, StageJob, StageOutcome, run_stage};
