//! Client-disconnect and deadline behavior.

mod common;

use std::time::Duration;

use common::fixtures::*;
use futures_util::StreamExt;
use wayfarer::config::Config;
use wayfarer::engine::EngineSettings;
use wayfarer::provider::{MockBehavior, MockProvider};

fn slow_lisbon_provider() -> MockProvider {
    let slow = |chunks: &[&str]| MockBehavior::Stream {
        chunks: chunks.iter().map(|c| c.to_string()).collect(),
        chunk_delay: Duration::from_millis(100),
    };

    let provider = MockProvider::new()
        .script("Provide core data for the city", slow(&["{\"city\"", ": \"Lisbon\"}"]))
        .script(
            "most interesting points of interest",
            slow(&["{\"points_of_interest\"", ": []}", "", ""]),
        )
        .script(
            "Build a personalized itinerary",
            slow(&["{\"itinerary_name\"", ": \"x\",", "\"points_of_interest\": []}"]),
        );
    script_city_extraction(provider, "Lisbon", "3 days with kids")
}

#[tokio::test]
async fn s5_client_disconnect_cancels_workers_and_still_persists() {
    let harness = harness(slow_lisbon_provider());

    let mut stream = harness
        .engine
        .handle_message(basic_request("3 days in Lisbon with kids"));

    // Consume the stream for ~250 ms with at least two workers mid-flight,
    // then drop it to simulate the client going away.
    let consume = async {
        while let Some(_event) = stream.next().await {}
    };
    let _ = tokio::time::timeout(Duration::from_millis(250), consume).await;
    drop(stream);

    // Workers observe cancellation and the detached persistence step still
    // writes whatever buffers completed, well within a second.
    let started = std::time::Instant::now();
    wait_for(|| harness.repos.interactions.count().unwrap() == 1).await;
    assert!(started.elapsed() < Duration::from_secs(1));

    let interaction = harness.repos.interactions.latest().unwrap().unwrap();
    // Buffers were partial; whatever arrived was recorded.
    assert!(!interaction.response_text.is_empty());
}

#[tokio::test]
async fn deadline_closes_the_stream_without_a_terminal_event() {
    let settings = EngineSettings {
        request_deadline: Duration::from_millis(150),
        ..EngineSettings::from_config(&Config::default())
    };
    let harness = harness_with_settings(slow_lisbon_provider(), settings);

    let events = collect_events(
        harness
            .engine
            .handle_message(basic_request("3 days in Lisbon with kids")),
    )
    .await;

    // The channel closed (stream ended) without complete/error.
    assert!(terminal_events(&events).is_empty());
    assert!(!events.is_empty(), "start and early chunks were delivered");
}
