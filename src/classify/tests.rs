use super::*;
use crate::provider::{MockBehavior, MockProvider};

#[test]
fn domain_priority_order_first_match_wins() {
    // "hotel restaurant" matches both sets; accommodation has priority.
    assert_eq!(detect_domain("hotel with a restaurant"), Domain::Accommodation);
    // Dining beats activities.
    assert_eq!(detect_domain("food tour"), Domain::Dining);
    // Activities beat itinerary.
    assert_eq!(detect_domain("museum visit"), Domain::Activities);
}

#[test]
fn domain_detection_scenarios() {
    assert_eq!(detect_domain("3 days in Lisbon with kids"), Domain::Itinerary);
    assert_eq!(detect_domain("cheap sushi in Tokyo near me"), Domain::Dining);
    assert_eq!(detect_domain("Barcelona hotels beachfront"), Domain::Accommodation);
    assert_eq!(detect_domain("weekend food in Lisbon"), Domain::Dining);
    assert_eq!(detect_domain("hello there"), Domain::General);
}

#[test]
fn domain_matching_is_case_insensitive() {
    assert_eq!(detect_domain("BEST HOTELS IN PARIS"), Domain::Accommodation);
}

#[test]
fn intent_detection() {
    assert_eq!(detect_intent("add the aquarium to my plan"), Intent::AddPoi);
    assert_eq!(detect_intent("remove the castle please"), Intent::RemovePoi);
    assert_eq!(detect_intent("swap day 2 and day 3"), Intent::ModifyItinerary);
    assert_eq!(detect_intent("what time does it open?"), Intent::AskQuestion);
}

#[test]
fn remove_beats_add_when_both_appear() {
    // "remove X and add Y" is handled by the remove flow first.
    assert_eq!(detect_intent("remove the museum and add the park"), Intent::RemovePoi);
}

#[test]
fn rule_extraction_after_preposition() {
    let (city, cleaned) = extract_city_rules("3 days in Lisbon with kids").unwrap();
    assert_eq!(city, "Lisbon");
    assert_eq!(cleaned, "3 days with kids");
}

#[test]
fn rule_extraction_multi_word_city() {
    let (city, _) = extract_city_rules("best food in New York this weekend").unwrap();
    assert_eq!(city, "New York");
}

#[test]
fn rule_extraction_leading_city() {
    let (city, cleaned) = extract_city_rules("Barcelona hotels beachfront").unwrap();
    assert_eq!(city, "Barcelona");
    assert_eq!(cleaned, "hotels beachfront");
}

#[test]
fn rule_extraction_rejects_sentence_starters() {
    assert!(extract_city_rules("Where should we go?").is_none());
    assert!(extract_city_rules("Show me something fun").is_none());
}

#[tokio::test]
async fn classify_uses_model_pass_when_it_parses() {
    let provider = MockProvider::new().script_chunks(
        "Extract the city",
        &[r#"{"city": "Lisbon", "cleaned_message": "3 days with kids"}"#],
    );

    let result = classify(&provider, "3 days in Lisbon with kids").await;
    assert_eq!(result.city_name, "Lisbon");
    assert_eq!(result.cleaned_message, "3 days with kids");
    assert_eq!(result.domain, Domain::Itinerary);
}

#[tokio::test]
async fn classify_strips_fences_from_model_reply() {
    let provider = MockProvider::new().script_chunks(
        "Extract the city",
        &["```json\n{\"city\": \"Tokyo\", \"cleaned_message\": \"cheap sushi near me\"}\n```"],
    );

    let result = classify(&provider, "cheap sushi in Tokyo near me").await;
    assert_eq!(result.city_name, "Tokyo");
    assert_eq!(result.domain, Domain::Dining);
}

#[tokio::test]
async fn classify_falls_back_to_rules_on_provider_error() {
    let provider = MockProvider::new().script(
        "Extract the city",
        MockBehavior::Error {
            message: "backend down".into(),
        },
    );

    let result = classify(&provider, "weekend food in Lisbon").await;
    assert_eq!(result.city_name, "Lisbon");
    assert_eq!(result.domain, Domain::Dining);
}

#[tokio::test]
async fn classify_falls_back_to_rules_on_garbage_json() {
    let provider = MockProvider::new().script_chunks("Extract the city", &["not json at all"]);

    let result = classify(&provider, "cheap sushi in Tokyo near me").await;
    assert_eq!(result.city_name, "Tokyo");
}

#[tokio::test]
async fn classify_degrades_to_empty_city_and_general() {
    let provider = MockProvider::new().script_chunks("Extract the city", &[r#"{"city": ""}"#]);

    let result = classify(&provider, "somewhere warm please").await;
    assert_eq!(result.city_name, "");
    assert_eq!(result.cleaned_message, "somewhere warm please");
    assert_eq!(result.domain, Domain::General);
}
