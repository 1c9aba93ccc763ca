//! Prompt builders, one per stage.
//!
//! Pure functions from `(city, preferences, location)` to prompt text. The
//! JSON wrapper names each prompt demands (`points_of_interest`,
//! `restaurants`, `hotels`, `activities`, ...) are an external contract:
//! the parser keys its decoding strategies on them.

use std::fmt::Write;

use crate::domain::{Location, SearchPreferences};

fn preferences_section(prefs: &SearchPreferences) -> String {
    if prefs.is_empty() {
        return String::new();
    }

    let mut out = String::from("\nTraveler preferences:\n");
    if !prefs.interests.is_empty() {
        let _ = writeln!(out, "- Interests: {}", prefs.interests.join(", "));
    }
    if !prefs.budget_level.is_empty() {
        let _ = writeln!(out, "- Budget: {}", prefs.budget_level);
    }
    if !prefs.travel_style.is_empty() {
        let _ = writeln!(out, "- Travel style: {}", prefs.travel_style);
    }
    if !prefs.dietary_restrictions.is_empty() {
        let _ = writeln!(
            out,
            "- Dietary restrictions: {}",
            prefs.dietary_restrictions.join(", ")
        );
    }
    if !prefs.accessibility_needs.is_empty() {
        let _ = writeln!(
            out,
            "- Accessibility needs: {}",
            prefs.accessibility_needs.join(", ")
        );
    }
    out
}

fn location_section(location: Option<Location>) -> String {
    match location {
        Some(loc) => format!(
            "\nThe traveler is currently at latitude {:.4}, longitude {:.4}; prefer options nearby.\n",
            loc.latitude, loc.longitude
        ),
        None => String::new(),
    }
}

const POI_FIELDS: &str = "\"name\", \"latitude\", \"longitude\", \"category\", \"description\", \
\"address\", \"website\", \"phone_number\", \"opening_hours\", \"price_level\", \"rating\", \
\"tags\", \"time_to_spend\", \"budget\", \"priority\"";

/// City facts and geography.
pub fn city_data(city: &str) -> String {
    format!(
        "You are a travel data service. Return strict JSON only, no prose, no markdown fences.\n\
         Provide core data for the city \"{city}\" as a single JSON object with fields: \
         \"city\", \"country\", \"state_province\", \"center_latitude\", \"center_longitude\", \
         \"description\". The description is 2-3 sentences for a first-time visitor."
    )
}

/// Broad points of interest for the city.
pub fn general_poi(city: &str, prefs: &SearchPreferences) -> String {
    format!(
        "You are a travel data service. Return strict JSON only, no prose, no markdown fences.\n\
         List the 10 most interesting points of interest in \"{city}\".{}\
         Respond as {{\"points_of_interest\": [...]}} where each item has fields: {POI_FIELDS}.",
        preferences_section(prefs)
    )
}

/// Personalized multi-day itinerary.
pub fn personalized_itinerary(city: &str, message: &str, prefs: &SearchPreferences) -> String {
    format!(
        "You are a personal travel planner. Return strict JSON only, no prose, no markdown fences.\n\
         The traveler asked: \"{message}\" about \"{city}\".{}\
         Build a personalized itinerary as {{\"itinerary_name\": string, \
         \"overall_description\": string, \"points_of_interest\": [...]}} where each point has \
         fields: {POI_FIELDS}. Order points in visiting order.",
        preferences_section(prefs)
    )
}

/// Restaurants for a dining request.
pub fn dining(city: &str, message: &str, prefs: &SearchPreferences, location: Option<Location>) -> String {
    format!(
        "You are a restaurant guide. Return strict JSON only, no prose, no markdown fences.\n\
         The traveler asked: \"{message}\" about \"{city}\".{}{}\
         Respond as {{\"restaurants\": [...]}} where each item has fields: {POI_FIELDS}, \
         \"cuisine_type\", \"price_range\".",
        preferences_section(prefs),
        location_section(location)
    )
}

/// Hotels for an accommodation request.
pub fn accommodation(
    city: &str,
    message: &str,
    prefs: &SearchPreferences,
    location: Option<Location>,
) -> String {
    format!(
        "You are a hotel guide. Return strict JSON only, no prose, no markdown fences.\n\
         The traveler asked: \"{message}\" about \"{city}\".{}{}\
         Respond as {{\"hotels\": [...]}} where each item has fields: {POI_FIELDS}, \
         \"star_rating\", \"price_range\".",
        preferences_section(prefs),
        location_section(location)
    )
}

/// Activities and tours.
pub fn activities(
    city: &str,
    message: &str,
    prefs: &SearchPreferences,
    location: Option<Location>,
) -> String {
    format!(
        "You are an activities guide. Return strict JSON only, no prose, no markdown fences.\n\
         The traveler asked: \"{message}\" about \"{city}\".{}{}\
         Respond as {{\"activities\": [...]}} where each item has fields: {POI_FIELDS}, \
         \"duration\".",
        preferences_section(prefs),
        location_section(location)
    )
}

/// Continuation: add a place to an existing itinerary.
pub fn continue_add(city: &str, message: &str, itinerary_json: &str) -> String {
    format!(
        "You are a personal travel planner updating an existing plan for \"{city}\". \
         Return strict JSON only, no prose, no markdown fences.\n\
         Current itinerary JSON:\n{itinerary_json}\n\
         The traveler asked: \"{message}\". Add the requested place(s). \
         Respond with the full updated itinerary as {{\"itinerary_name\": string, \
         \"overall_description\": string, \"points_of_interest\": [...]}}."
    )
}

/// Continuation: remove a place from an existing itinerary.
pub fn continue_remove(city: &str, message: &str, itinerary_json: &str) -> String {
    format!(
        "You are a personal travel planner updating an existing plan for \"{city}\". \
         Return strict JSON only, no prose, no markdown fences.\n\
         Current itinerary JSON:\n{itinerary_json}\n\
         The traveler asked: \"{message}\". Remove the requested place(s). \
         Respond with the full updated itinerary as {{\"itinerary_name\": string, \
         \"overall_description\": string, \"points_of_interest\": [...]}}."
    )
}

/// Classifier first pass: extract the city and clean the message.
pub fn extract_city(message: &str) -> String {
    format!(
        "Extract the city a traveler is asking about. Return strict JSON only: \
         {{\"city\": string, \"cleaned_message\": string}}. \
         \"cleaned_message\" is the message with the city mention removed. \
         If no city can be determined, return {{\"city\": \"\", \"cleaned_message\": \"\"}}.\n\
         Message: \"{message}\""
    )
}
