//! Shared fixtures for integration tests: a fully-wired engine over the
//! scripted provider, the deterministic embedder, and an in-memory store.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use wayfarer::cache::Caches;
use wayfarer::config::Config;
use wayfarer::cost::CostTable;
use wayfarer::engine::{ChatRequest, Engine, EngineSettings};
use wayfarer::events::{EventPayload, StreamEvent};
use wayfarer::provider::MockProvider;
use wayfarer::repo::{Db, Repositories};
use wayfarer::semantic::MockEmbedder;

pub struct TestHarness {
    pub engine: Engine<MockProvider, MockEmbedder>,
    pub provider: Arc<MockProvider>,
    pub repos: Repositories,
    pub caches: Caches,
}

pub fn harness(provider: MockProvider) -> TestHarness {
    harness_with_settings(provider, EngineSettings::from_config(&Config::default()))
}

pub fn harness_with_settings(provider: MockProvider, settings: EngineSettings) -> TestHarness {
    let db = Arc::new(Db::open_in_memory().expect("in-memory db opens"));
    let repos = Repositories::new(db);
    let caches = Caches::from_config(&Config::default());
    let provider = Arc::new(provider);

    let engine = Engine::new(
        provider.clone(),
        Arc::new(MockEmbedder::default()),
        caches.clone(),
        repos.clone(),
        CostTable::new(Config::default_cost_table()),
        settings,
    );

    TestHarness {
        engine,
        provider,
        repos,
        caches,
    }
}

/// Scripts the classifier's first pass to a fixed extraction.
pub fn script_city_extraction(provider: MockProvider, city: &str, cleaned: &str) -> MockProvider {
    provider.script_chunks(
        "Extract the city",
        &[&format!(
            r#"{{"city": "{city}", "cleaned_message": "{cleaned}"}}"#
        )],
    )
}

/// Collects every event of one request's stream.
pub async fn collect_events(
    mut stream: impl futures_util::Stream<Item = StreamEvent> + Unpin,
) -> Vec<StreamEvent> {
    let mut events = Vec::new();
    while let Some(event) = stream.next().await {
        events.push(event);
    }
    events
}

/// Chunks for one part, concatenated in arrival order.
pub fn concat_chunks(events: &[StreamEvent], part: wayfarer::events::StagePart) -> String {
    events
        .iter()
        .filter_map(|e| match &e.payload {
            EventPayload::Chunk { part: p, chunk } if *p == part => Some(chunk.as_str()),
            _ => None,
        })
        .collect()
}

pub fn terminal_events(events: &[StreamEvent]) -> Vec<&StreamEvent> {
    events
        .iter()
        .filter(|e| e.payload.is_terminal())
        .collect()
}

/// Polls until `condition` holds or two seconds elapse.
pub async fn wait_for(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within 2s");
}

pub fn basic_request(message: &str) -> ChatRequest {
    ChatRequest::new(uuid::Uuid::new_v4(), uuid::Uuid::new_v4(), message)
}
