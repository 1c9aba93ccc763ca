//! Cache-key and prompt hashing.
//!
//! The context key is a wire contract: MD5 over a canonical (sorted-key)
//! JSON object of the request context, hex-encoded. Any implementation
//! producing the same canonical bytes must produce the same key, so replays
//! and navigation URLs stay valid across processes.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::domain::{Domain, SearchPreferences};

/// Serializes a JSON value with object keys sorted at every level.
///
/// This is the canonical form hashed by [`context_key`] and the equality
/// form used for vector-cache search-params comparison.
pub fn canonical_json(value: &Value) -> String {
    fn sort(value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let mut sorted = Map::new();
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                for key in keys {
                    sorted.insert(key.clone(), sort(&map[key]));
                }
                Value::Object(sorted)
            }
            Value::Array(items) => Value::Array(items.iter().map(sort).collect()),
            other => other.clone(),
        }
    }

    // serde_json keeps Map insertion order, so the sorted map serializes
    // with sorted keys.
    sort(value).to_string()
}

/// MD5 hex of the canonical request context.
pub fn context_key(
    user_id: Uuid,
    profile_id: Uuid,
    city: &str,
    message: &str,
    domain: Domain,
    preferences: &SearchPreferences,
) -> String {
    let context = serde_json::json!({
        "user_id": user_id.to_string(),
        "profile_id": profile_id.to_string(),
        "city": city,
        "message": message,
        "domain": domain.as_str(),
        "preferences": preferences,
    });

    let canonical = canonical_json(&context);
    format!("{:x}", md5::compute(canonical.as_bytes()))
}

/// Stage sub-key: parent context key plus `"_" + part`.
#[inline]
pub fn stage_key(context_key: &str, part: &str) -> String {
    format!("{context_key}_{part}")
}

/// SHA-256 hex of a prompt, persisted on interaction rows.
#[inline]
pub fn prompt_sha256(prompt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn prefs() -> SearchPreferences {
        SearchPreferences {
            interests: vec!["food".into(), "history".into()],
            budget_level: "medium".into(),
            ..Default::default()
        }
    }

    #[test]
    fn canonical_json_sorts_keys_at_every_level() {
        let value = serde_json::json!({
            "b": {"z": 1, "a": 2},
            "a": [{"y": 1, "x": 2}],
        });
        assert_eq!(
            canonical_json(&value),
            r#"{"a":[{"x":2,"y":1}],"b":{"a":2,"z":1}}"#
        );
    }

    #[test]
    fn canonical_json_is_stable_under_key_order() {
        let a: Value = serde_json::from_str(r#"{"x":1,"y":{"b":2,"a":3}}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"y":{"a":3,"b":2},"x":1}"#).unwrap();
        assert_eq!(canonical_json(&a), canonical_json(&b));
    }

    #[test]
    fn context_key_determinism() {
        let user = Uuid::new_v4();
        let profile = Uuid::new_v4();

        let k1 = context_key(user, profile, "Lisbon", "3 days", Domain::Itinerary, &prefs());
        let k2 = context_key(user, profile, "Lisbon", "3 days", Domain::Itinerary, &prefs());

        assert_eq!(k1, k2);
    }

    #[test]
    fn context_key_is_lowercase_hex_md5() {
        let key = context_key(
            Uuid::nil(),
            Uuid::nil(),
            "Lisbon",
            "food",
            Domain::Dining,
            &SearchPreferences::default(),
        );
        assert_eq!(key.len(), 32);
        assert!(
            key.chars()
                .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
        );
    }

    #[test]
    fn context_key_sensitivity() {
        let user = Uuid::new_v4();
        let profile = Uuid::new_v4();
        let base = context_key(user, profile, "Lisbon", "food", Domain::Dining, &prefs());

        let keys = [
            context_key(Uuid::new_v4(), profile, "Lisbon", "food", Domain::Dining, &prefs()),
            context_key(user, Uuid::new_v4(), "Lisbon", "food", Domain::Dining, &prefs()),
            context_key(user, profile, "Porto", "food", Domain::Dining, &prefs()),
            context_key(user, profile, "Lisbon", "drinks", Domain::Dining, &prefs()),
            context_key(user, profile, "Lisbon", "food", Domain::General, &prefs()),
            context_key(
                user,
                profile,
                "Lisbon",
                "food",
                Domain::Dining,
                &SearchPreferences::default(),
            ),
        ];

        let mut unique: HashSet<String> = keys.iter().cloned().collect();
        unique.insert(base.clone());
        assert_eq!(unique.len(), keys.len() + 1);
        assert!(!keys.contains(&base));
    }

    #[test]
    fn stage_key_appends_part() {
        assert_eq!(stage_key("abc123", "restaurants"), "abc123_restaurants");
    }

    #[test]
    fn prompt_sha256_known_vector() {
        // SHA-256 of the empty string is a fixed constant.
        assert_eq!(
            prompt_sha256(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(prompt_sha256("hello").len(), 64);
    }
}
