use super::*;
use std::time::Duration;

use crate::events::{EventChannelConfig, StreamEvent, event_channel};
use crate::provider::{MockBehavior, MockProvider};

fn harness() -> (
    Arc<StageCache>,
    EventSender,
    tokio::sync::mpsc::Receiver<StreamEvent>,
    PartBuffers,
) {
    let cache = Arc::new(StageCache::new(Duration::from_secs(60)));
    let (sender, rx) = event_channel(EventChannelConfig::default());
    let buffers: PartBuffers = Arc::new(Mutex::new(HashMap::new()));
    (cache, sender, rx, buffers)
}

fn job(part: StagePart, prompt: &str) -> StageJob {
    StageJob {
        part,
        prompt: prompt.to_string(),
        cache_key: format!("ctx_{part}"),
    }
}

async fn drain(rx: &mut tokio::sync::mpsc::Receiver<StreamEvent>) -> Vec<StreamEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn chunks_arrive_in_model_order_and_accumulate() {
    let (cache, sender, mut rx, buffers) = harness();
    let provider = Arc::new(MockProvider::new().script_chunks("restaurants", &["{\"a\"", ":1", "}"]));

    let outcome = run_stage(
        provider,
        cache.clone(),
        job(StagePart::Restaurants, "restaurants in Tokyo"),
        sender,
        buffers.clone(),
        CancellationToken::new(),
    )
    .await;

    assert_eq!(outcome.text, "{\"a\":1}");
    assert!(outcome.error.is_none());
    assert!(!outcome.cache_hit);

    // Concatenating chunk events reproduces the upstream stream exactly.
    let events = drain(&mut rx).await;
    let concatenated: String = events
        .iter()
        .filter_map(|e| match &e.payload {
            EventPayload::Chunk { part, chunk } if *part == StagePart::Restaurants => {
                Some(chunk.as_str())
            }
            _ => None,
        })
        .collect();
    assert_eq!(concatenated, "{\"a\":1}");

    // Buffer matches, and the stage cache was written back.
    assert_eq!(buffers.lock()[&StagePart::Restaurants], "{\"a\":1}");
    assert_eq!(cache.get("ctx_restaurants").as_deref(), Some("{\"a\":1}"));
}

#[tokio::test]
async fn usage_metadata_is_captured_from_final_chunk() {
    let (cache, sender, _rx, buffers) = harness();
    let provider = Arc::new(MockProvider::new().script_chunks("itinerary", &["abcdefgh"]));

    let outcome = run_stage(
        provider,
        cache,
        job(StagePart::Itinerary, "itinerary please"),
        sender,
        buffers,
        CancellationToken::new(),
    )
    .await;

    assert!(outcome.usage.completion_tokens > 0);
    assert!(outcome.usage.prompt_tokens > 0);
}

#[tokio::test]
async fn cache_hit_emits_single_chunk_and_skips_provider() {
    let (cache, sender, mut rx, buffers) = harness();
    cache.set("ctx_city_data", "{\"city\":\"Lisbon\"}");
    let provider = Arc::new(MockProvider::new());

    let outcome = run_stage(
        provider.clone(),
        cache,
        job(StagePart::CityData, "city data for Lisbon"),
        sender,
        buffers.clone(),
        CancellationToken::new(),
    )
    .await;

    assert!(outcome.cache_hit);
    assert_eq!(outcome.text, "{\"city\":\"Lisbon\"}");
    assert_eq!(provider.call_count(), 0);

    let events = drain(&mut rx).await;
    assert_eq!(events.len(), 1);
    assert!(matches!(
        &events[0].payload,
        EventPayload::Chunk { part: StagePart::CityData, chunk } if chunk == "{\"city\":\"Lisbon\"}"
    ));
    assert_eq!(buffers.lock()[&StagePart::CityData], "{\"city\":\"Lisbon\"}");
}

#[tokio::test]
async fn stream_error_emits_stage_error_and_keeps_partial_buffer() {
    let (cache, sender, mut rx, buffers) = harness();
    let provider = Arc::new(MockProvider::new().script(
        "hotels",
        MockBehavior::ErrorAfter {
            chunks: vec!["partial".to_string()],
            message: "upstream 500".to_string(),
        },
    ));

    let outcome = run_stage(
        provider,
        cache.clone(),
        job(StagePart::Hotels, "hotels in Barcelona"),
        sender,
        buffers.clone(),
        CancellationToken::new(),
    )
    .await;

    assert_eq!(outcome.error.as_deref(), Some("provider stream error: upstream 500"));
    assert_eq!(outcome.text, "partial");

    let events = drain(&mut rx).await;
    assert!(events.iter().any(|e| matches!(
        &e.payload,
        EventPayload::Error { part: Some(StagePart::Hotels), .. }
    )));

    // A failed stage must not poison the warm path.
    assert!(cache.get("ctx_hotels").is_none());
}

#[tokio::test]
async fn open_failure_emits_stage_error() {
    let (cache, sender, mut rx, buffers) = harness();
    let provider = Arc::new(MockProvider::new().script(
        "hotels",
        MockBehavior::Error {
            message: "boom".to_string(),
        },
    ));

    let outcome = run_stage(
        provider,
        cache,
        job(StagePart::Hotels, "hotels in Barcelona"),
        sender,
        buffers,
        CancellationToken::new(),
    )
    .await;

    assert!(outcome.error.is_some());
    assert!(!outcome.is_usable());

    let events = drain(&mut rx).await;
    assert_eq!(events.len(), 1);
}

#[tokio::test]
async fn cancellation_stops_the_stage_quickly_without_events() {
    let (cache, sender, mut rx, buffers) = harness();
    let provider = Arc::new(MockProvider::new().script(
        "slow",
        MockBehavior::Stream {
            chunks: vec!["a".to_string(), "b".to_string(), "c".to_string()],
            chunk_delay: Duration::from_millis(200),
        },
    ));

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(run_stage(
        provider,
        cache,
        job(StagePart::GeneralPois, "slow stream"),
        sender,
        buffers,
        cancel.clone(),
    ));

    tokio::time::sleep(Duration::from_millis(50)).await;
    cancel.cancel();

    let outcome = tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("worker must return within a second of cancellation")
        .unwrap();

    assert!(outcome.cancelled);

    let events = drain(&mut rx).await;
    // No chunk had been produced yet and none may follow cancellation.
    assert!(events.is_empty());
}
