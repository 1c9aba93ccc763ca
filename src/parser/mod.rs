//! Tolerant decoding of model responses.
//!
//! Providers emit the same payload in several equivalent shapes: the named
//! wrapper the prompt asked for, a bare array, or a `{"data": ...}`
//! envelope, any of which may be wrapped in Markdown code fences. Each
//! decoder tries the shapes in order and treats total failure as an empty
//! part, never a request failure.

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use crate::domain::{Activity, City, Hotel, Itinerary, Poi, Restaurant};

/// Removes a surrounding Markdown code fence (``` or ```json) and trims.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();

    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    // Drop the info string ("json", "JSON", ...) up to the first newline.
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };

    body.strip_suffix("```").unwrap_or(body).trim()
}

fn decode_value(raw: &str) -> Option<Value> {
    let cleaned = strip_code_fences(raw);
    if cleaned.is_empty() {
        return None;
    }

    match serde_json::from_str(cleaned) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(error = %e, len = cleaned.len(), "response is not valid JSON");
            None
        }
    }
}

/// Decodes a list payload: `{wrapper: [...]}` → `[...]` → `{"data": [...]}`.
fn decode_list<T: DeserializeOwned>(raw: &str, wrapper: &str) -> Vec<T> {
    let Some(value) = decode_value(raw) else {
        return Vec::new();
    };

    let array = match &value {
        Value::Object(map) => map
            .get(wrapper)
            .or_else(|| map.get("data"))
            .and_then(Value::as_array),
        Value::Array(items) => Some(items),
        _ => None,
    };

    let Some(items) = array else {
        warn!(wrapper, "no recognized list shape in response");
        return Vec::new();
    };

    // Skip malformed elements rather than dropping the whole list.
    items
        .iter()
        .filter_map(|item| match serde_json::from_value(item.clone()) {
            Ok(typed) => Some(typed),
            Err(e) => {
                warn!(wrapper, error = %e, "skipping undecodable list element");
                None
            }
        })
        .collect()
}

/// Decodes an object payload, unwrapping a `{"data": ...}` envelope.
fn decode_object<T: DeserializeOwned>(raw: &str, what: &str) -> Option<T> {
    let value = decode_value(raw)?;

    let inner = match &value {
        Value::Object(map) if map.contains_key("data") => map.get("data").cloned()?,
        other => other.clone(),
    };

    match serde_json::from_value(inner) {
        Ok(typed) => Some(typed),
        Err(e) => {
            warn!(what, error = %e, "object shape did not decode");
            None
        }
    }
}

/// General or itinerary POIs.
pub fn parse_pois(raw: &str) -> Vec<Poi> {
    decode_list(raw, "points_of_interest")
}

pub fn parse_restaurants(raw: &str) -> Vec<Restaurant> {
    decode_list(raw, "restaurants")
}

pub fn parse_hotels(raw: &str) -> Vec<Hotel> {
    decode_list(raw, "hotels")
}

pub fn parse_activities(raw: &str) -> Vec<Activity> {
    decode_list(raw, "activities")
}

/// Single city object, possibly `{"data": {...}}`-wrapped.
pub fn parse_city_data(raw: &str) -> Option<City> {
    let city: City = decode_object(raw, "city_data")?;
    if city.name.is_empty() {
        warn!("city_data decoded without a name, treating as empty");
        return None;
    }
    Some(city)
}

/// Itinerary object, possibly `{"data": {...}}`-wrapped.
pub fn parse_itinerary(raw: &str) -> Option<Itinerary> {
    decode_object(raw, "itinerary")
}

/// Backfills `city` on POIs the model left blank.
pub fn propagate_city(city_name: &str, pois: &mut [Poi]) {
    if city_name.is_empty() {
        return;
    }
    for poi in pois.iter_mut() {
        if poi.city.is_empty() {
            poi.city = city_name.to_string();
        }
    }
}
