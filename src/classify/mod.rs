//! Request classification: city, cleaned message, semantic domain, intent.
//!
//! City extraction runs a first-pass model call at temperature 0.1; on any
//! provider or parse failure it degrades to a rule-based extractor and then
//! to an empty city. Classification never fails a request.

use std::sync::LazyLock;

use regex::{Regex, RegexSet};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::domain::{Domain, Intent};
use crate::parser::strip_code_fences;
use crate::prompts;
use crate::provider::{GenerationConfig, TextProvider};

/// Result of classifying one message.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub city_name: String,
    pub cleaned_message: String,
    pub domain: Domain,
}

static ACCOMMODATION: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"\bhotels?\b",
        r"\bhostels?\b",
        r"\baccommodations?\b",
        r"\bplace to stay\b",
        r"\bstay(ing)? in\b",
        r"\bairbnb\b",
        r"\bbed and breakfast\b",
        r"\bmotels?\b",
        r"\bresorts?\b",
        r"\bwhere to sleep\b",
    ])
    .expect("accommodation regex set is valid")
});

static DINING: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"\brestaurants?\b",
        r"\bfood\b",
        r"\beat(ing|ery|eries)?\b",
        r"\bdining\b",
        r"\bdinner\b",
        r"\blunch\b",
        r"\bbreakfast\b",
        r"\bbrunch\b",
        r"\bsushi\b",
        r"\bpizza\b",
        r"\bcaf(e|é)s?\b",
        r"\bcoffee\b",
        r"\bbars?\b",
        r"\bdrinks?\b",
        r"\bcuisine\b",
        r"\bhungry\b",
    ])
    .expect("dining regex set is valid")
});

static ACTIVITIES: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"\bactivit(y|ies)\b",
        r"\bthings to do\b",
        r"\btours?\b",
        r"\bmuseums?\b",
        r"\bhik(e|es|ing)\b",
        r"\badventures?\b",
        r"\bexperiences?\b",
        r"\boutdoors?\b",
        r"\bconcerts?\b",
        r"\bshows?\b",
        r"\bnightlife\b",
    ])
    .expect("activities regex set is valid")
});

static ITINERARY: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"\bitinerar(y|ies)\b",
        r"\bday trips?\b",
        r"\bdays? in\b",
        r"\bweekend\b",
        r"\btrip\b",
        r"\bplan(ning)?\b",
        r"\bvisit(ing)?\b",
        r"\bschedule\b",
        r"\broute\b",
    ])
    .expect("itinerary regex set is valid")
});

static INTENT_ADD: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([r"\badd\b", r"\binclude\b", r"\balso (visit|see|go)\b", r"\bput .* on\b"])
        .expect("add-intent regex set is valid")
});

static INTENT_REMOVE: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([r"\bremove\b", r"\bdelete\b", r"\bdrop\b", r"\btake .* (out|off)\b", r"\bskip\b"])
        .expect("remove-intent regex set is valid")
});

static INTENT_MODIFY: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"\bchange\b",
        r"\bswap\b",
        r"\breorder\b",
        r"\breplace\b",
        r"\binstead\b",
        r"\bmodify\b",
        r"\bmake it\b",
        r"\brearrange\b",
    ])
    .expect("modify-intent regex set is valid")
});

/// `in/to/near/... <Capitalized Name>` inside the message.
static CITY_AFTER_PREPOSITION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:in|to|near|at|around|about)\s+([A-Z][\w'’\-]*(?:\s+[A-Z][\w'’\-]*)*)",
    )
    .expect("city preposition regex is valid")
});

/// Leading capitalized run, e.g. "Barcelona hotels beachfront".
static CITY_AT_START: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Z][\w'’\-]*(?:\s+[A-Z][\w'’\-]*)*)").expect("city start regex is valid")
});

/// Capitalized words that start sentences, not city names.
const CITY_STOPWORDS: &[&str] = &[
    "I", "What", "Where", "When", "How", "Show", "Find", "Give", "Tell", "Plan", "Best", "Cheap",
    "Top", "My", "The", "A", "An", "Please", "Can", "Could", "We", "Our",
];

/// Lowercase keyword match against the domain regex sets, in priority
/// order. First match wins; no match is General.
pub fn detect_domain(message: &str) -> Domain {
    let lowered = message.to_lowercase();

    if ACCOMMODATION.is_match(&lowered) {
        Domain::Accommodation
    } else if DINING.is_match(&lowered) {
        Domain::Dining
    } else if ACTIVITIES.is_match(&lowered) {
        Domain::Activities
    } else if ITINERARY.is_match(&lowered) {
        Domain::Itinerary
    } else {
        Domain::General
    }
}

/// Continuation intent, same keyword strategy. Defaults to a question.
pub fn detect_intent(message: &str) -> Intent {
    let lowered = message.to_lowercase();

    if INTENT_REMOVE.is_match(&lowered) {
        Intent::RemovePoi
    } else if INTENT_ADD.is_match(&lowered) {
        Intent::AddPoi
    } else if INTENT_MODIFY.is_match(&lowered) {
        Intent::ModifyItinerary
    } else {
        Intent::AskQuestion
    }
}

/// Rule-based extractor used when the model first pass is unavailable.
/// Returns `(city, cleaned_message)`.
pub fn extract_city_rules(message: &str) -> Option<(String, String)> {
    // The preposition is removed with the city; a leading city stands alone.
    let (removed, candidate) = if let Some(caps) = CITY_AFTER_PREPOSITION.captures(message) {
        (caps.get(0)?, caps.get(1)?)
    } else {
        let m = CITY_AT_START.captures(message)?.get(1)?;
        (m, m)
    };

    let city = candidate.as_str().trim().to_string();
    let first_word = city.split_whitespace().next()?;
    if CITY_STOPWORDS.contains(&first_word) {
        return None;
    }

    let mut cleaned = String::with_capacity(message.len());
    cleaned.push_str(&message[..removed.start()]);
    cleaned.push_str(&message[removed.end()..]);
    let cleaned = cleaned
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .trim_end_matches(|c| matches!(c, ',' | '.' | '?' | '!'))
        .to_string();

    Some((city, cleaned))
}

#[derive(Debug, Deserialize)]
struct CityExtraction {
    #[serde(default)]
    city: String,
    #[serde(default)]
    cleaned_message: String,
}

/// Full classification. Never fails: provider and parse errors degrade to
/// the rule-based extractor, then to `("", message, detected domain)`.
pub async fn classify<P: TextProvider + ?Sized>(provider: &P, message: &str) -> Classification {
    let domain = detect_domain(message);

    match llm_city_pass(provider, message).await {
        Some((city, cleaned)) if !city.is_empty() => {
            debug!(%city, ?domain, "classifier model pass succeeded");
            return Classification {
                city_name: city,
                cleaned_message: cleaned,
                domain,
            };
        }
        _ => {}
    }

    if let Some((city, cleaned)) = extract_city_rules(message) {
        debug!(%city, ?domain, "classifier rule extraction succeeded");
        return Classification {
            city_name: city,
            cleaned_message: if cleaned.is_empty() {
                message.to_string()
            } else {
                cleaned
            },
            domain,
        };
    }

    Classification {
        city_name: String::new(),
        cleaned_message: message.to_string(),
        domain,
    }
}

async fn llm_city_pass<P: TextProvider + ?Sized>(
    provider: &P,
    message: &str,
) -> Option<(String, String)> {
    let prompt = prompts::extract_city(message);

    let generation = match provider
        .generate(&prompt, &GenerationConfig::deterministic())
        .await
    {
        Ok(generation) => generation,
        Err(e) => {
            warn!(error = %e, "city extraction call failed, falling back to rules");
            return None;
        }
    };

    let cleaned_text = strip_code_fences(&generation.text);
    match serde_json::from_str::<CityExtraction>(cleaned_text) {
        Ok(extraction) => {
            let cleaned = if extraction.cleaned_message.trim().is_empty() {
                message.to_string()
            } else {
                extraction.cleaned_message.trim().to_string()
            };
            Some((extraction.city.trim().to_string(), cleaned))
        }
        Err(e) => {
            warn!(error = %e, "city extraction returned unparseable JSON");
            None
        }
    }
}

#[cfg(test)]
mod tests;
