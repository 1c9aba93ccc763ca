//! End-to-end streaming scenarios over the scripted provider.

mod common;

use common::fixtures::*;

use wayfarer::events::{EventPayload, StagePart};
use wayfarer::hashing;
use wayfarer::provider::{MockBehavior, MockProvider};
use wayfarer::domain::SearchPreferences;

const LISBON_CITY_DATA: &str = r#"{"city": "Lisbon", "country": "Portugal",
    "center_latitude": 38.7223, "center_longitude": -9.1393,
    "description": "Hilly coastal capital of Portugal."}"#;

const LISBON_POIS: &str = r#"{"points_of_interest": [
    {"name": "Pasteis de Belém", "latitude": 38.6975, "longitude": -9.2035, "category": "bakery"},
    {"name": "Castelo de São Jorge", "latitude": 38.7139, "longitude": -9.1335, "category": "castle"}
]}"#;

const LISBON_ITINERARY: &str = r#"{"itinerary_name": "Lisbon with kids",
    "overall_description": "Three relaxed family days.",
    "points_of_interest": [
        {"name": "Oceanário de Lisboa", "latitude": 38.7633, "longitude": -9.0950, "category": "aquarium"}
    ]}"#;

fn lisbon_provider() -> MockProvider {
    let provider = MockProvider::new()
        .script_chunks("Provide core data for the city", &[LISBON_CITY_DATA])
        // POIs stream in three chunks to exercise per-part ordering.
        .script_chunks(
            "most interesting points of interest",
            &[
                r#"{"points_of_interest": ["#,
                r#"{"name": "Pasteis de Belém", "latitude": 38.6975, "longitude": -9.2035, "category": "bakery"},"#,
                r#"{"name": "Castelo de São Jorge", "latitude": 38.7139, "longitude": -9.1335, "category": "castle"}]}"#,
            ],
        )
        .script_chunks("Build a personalized itinerary", &[LISBON_ITINERARY]);
    script_city_extraction(provider, "Lisbon", "3 days with kids")
}

#[tokio::test]
async fn s1_lisbon_itinerary_cold_path() {
    let harness = harness(lisbon_provider());
    let request = basic_request("3 days in Lisbon with kids");
    let user_id = request.user_id;
    let profile_id = request.profile_id;

    let events = collect_events(harness.engine.handle_message(request)).await;

    // Exactly one start, before everything else.
    assert!(matches!(events[0].payload, EventPayload::Start { .. }));
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e.payload, EventPayload::Start { .. }))
            .count(),
        1
    );

    // Interleaved chunks for the three itinerary-domain parts.
    for part in [StagePart::CityData, StagePart::GeneralPois, StagePart::Itinerary] {
        assert!(
            !concat_chunks(&events, part).is_empty(),
            "no chunks for {part}"
        );
    }

    // Per-part ordering: concatenation reproduces the upstream payload.
    assert!(concat_chunks(&events, StagePart::GeneralPois).contains("Castelo de São Jorge"));

    // Exactly one terminal event, last on the stream, with the navigation
    // contract.
    let terminals = terminal_events(&events);
    assert_eq!(terminals.len(), 1);
    assert!(events.last().unwrap().payload.is_terminal());
    let EventPayload::Complete { navigation, .. } = &terminals[0].payload else {
        panic!("terminal must be complete");
    };
    assert_eq!(navigation.route_type, "itinerary");
    assert!(navigation.url.starts_with("/itinerary?sessionId="));
    assert!(navigation.url.contains("&cityName=Lisbon&domain=itinerary&cacheKey="));

    // Async persistence: city row, interaction row.
    wait_for(|| harness.repos.interactions.count().unwrap() == 1).await;
    let city = harness
        .repos
        .cities
        .get_by_name("Lisbon", "Portugal")
        .unwrap();
    assert!(city.is_some(), "Lisbon city row persisted");

    let interaction = harness.repos.interactions.latest().unwrap().unwrap();
    assert_eq!(interaction.status_code, 200);
    assert!(!interaction.cache_hit);
    assert_eq!(interaction.search_type, "itinerary");
    assert!(interaction.total_tokens > 0);

    // The exact-stage cache holds every part under the derived key.
    let context_key = hashing::context_key(
        user_id,
        profile_id,
        "Lisbon",
        "3 days with kids",
        wayfarer::domain::Domain::Itinerary,
        &SearchPreferences::default(),
    );
    for part in ["city_data", "general_pois", "itinerary"] {
        assert!(
            harness
                .caches
                .stage
                .contains(&hashing::stage_key(&context_key, part)),
            "stage cache missing {part}"
        );
    }
}

#[tokio::test]
async fn s2_warm_path_serves_every_stage_from_cache() {
    let harness = harness(lisbon_provider());
    let request = basic_request("3 days in Lisbon with kids");

    let first = collect_events(harness.engine.handle_message(request.clone())).await;
    assert!(matches!(
        first.last().unwrap().payload,
        EventPayload::Complete { .. }
    ));
    wait_for(|| harness.repos.interactions.count().unwrap() == 1).await;

    let calls_after_cold = harness.provider.call_count();

    let second = collect_events(harness.engine.handle_message(request)).await;
    wait_for(|| harness.repos.interactions.count().unwrap() == 2).await;

    // Only the classifier's first pass touched the provider; every stage
    // buffer came from cache.
    assert_eq!(harness.provider.call_count(), calls_after_cold + 1);

    // Same terminal shape as the cold run.
    let EventPayload::Complete { navigation, .. } = &second.last().unwrap().payload else {
        panic!("warm run must complete");
    };
    assert_eq!(navigation.route_type, "itinerary");

    let interaction = harness.repos.interactions.latest().unwrap().unwrap();
    assert!(interaction.cache_hit);
}

#[tokio::test]
async fn s3_dining_runs_a_single_worker() {
    let provider = MockProvider::new().script_chunks(
        "You are a restaurant guide",
        &[r#"{"restaurants": [
            {"name": "Sushi Dai", "latitude": 35.6654, "longitude": 139.7707,
             "cuisine_type": "sushi", "price_range": "$"}
        ]}"#],
    );
    let provider = script_city_extraction(provider, "Tokyo", "cheap sushi near me");
    let harness = harness(provider);

    let mut request = basic_request("cheap sushi in Tokyo near me");
    request.location = Some(wayfarer::domain::Location {
        latitude: 35.6895,
        longitude: 139.6917,
    });

    let events = collect_events(harness.engine.handle_message(request)).await;

    // Only the restaurants part streams.
    assert!(!concat_chunks(&events, StagePart::Restaurants).is_empty());
    for part in [
        StagePart::CityData,
        StagePart::GeneralPois,
        StagePart::Itinerary,
        StagePart::Hotels,
        StagePart::Activities,
    ] {
        assert!(concat_chunks(&events, part).is_empty(), "unexpected {part}");
    }

    let EventPayload::Complete { navigation, .. } = &events.last().unwrap().payload else {
        panic!("dining run must complete");
    };
    assert_eq!(navigation.route_type, "restaurants");

    wait_for(|| harness.repos.pois.count("restaurants").unwrap() == 1).await;
    let interaction_count = harness.repos.interactions.count().unwrap();
    assert_eq!(interaction_count, 1);
}

#[tokio::test]
async fn s4_partial_failure_still_completes() {
    let provider = MockProvider::new().script(
        "You are a hotel guide",
        MockBehavior::ErrorAfter {
            chunks: vec![r#"{"hot"#.to_string()],
            message: "upstream 500".to_string(),
        },
    );
    let provider = script_city_extraction(provider, "Barcelona", "hotels beachfront");
    let harness = harness(provider);

    let events = collect_events(harness.engine.handle_message(basic_request(
        "Barcelona hotels beachfront",
    )))
    .await;

    // start, stage error carrying part=hotels, then a terminal complete.
    assert!(matches!(events[0].payload, EventPayload::Start { .. }));
    assert!(events.iter().any(|e| matches!(
        &e.payload,
        EventPayload::Error { part: Some(StagePart::Hotels), .. }
    )));
    assert!(matches!(
        events.last().unwrap().payload,
        EventPayload::Complete { .. }
    ));

    // No hotels persisted; interaction records the failure.
    wait_for(|| harness.repos.interactions.count().unwrap() == 1).await;
    assert_eq!(harness.repos.pois.count("hotels").unwrap(), 0);

    let interaction = harness.repos.interactions.latest().unwrap().unwrap();
    assert_eq!(interaction.status_code, 500);
    assert!(interaction.error_message.unwrap().contains("upstream 500"));
}

#[tokio::test]
async fn total_failure_emits_terminal_error_and_skips_persistence() {
    let provider = MockProvider::new().script(
        "You are a hotel guide",
        MockBehavior::Error {
            message: "backend unavailable".to_string(),
        },
    );
    let provider = script_city_extraction(provider, "Barcelona", "hotels beachfront");
    let harness = harness(provider);

    let events = collect_events(harness.engine.handle_message(basic_request(
        "Barcelona hotels beachfront",
    )))
    .await;

    let terminals = terminal_events(&events);
    assert_eq!(terminals.len(), 1);
    assert!(matches!(
        terminals[0].payload,
        EventPayload::Error { part: None, .. }
    ));

    // Fatal requests persist nothing.
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert_eq!(harness.repos.interactions.count().unwrap(), 0);
}

#[tokio::test]
async fn classifier_failure_degrades_to_general_domain() {
    // No extraction script: the classifier's model pass returns "{}",
    // which parses to an empty city; rules find no capitalized city.
    let provider = MockProvider::new();
    let harness = harness(provider);

    let events = collect_events(
        harness
            .engine
            .handle_message(basic_request("somewhere sunny please")),
    )
    .await;

    // General domain fans out the itinerary worker set.
    let EventPayload::Start { data } = &events[0].payload else {
        panic!("first event must be start");
    };
    assert_eq!(data["domain"], "general");
    assert_eq!(data["city_name"], "");
    assert!(matches!(
        events.last().unwrap().payload,
        EventPayload::Complete { .. }
    ));
}
