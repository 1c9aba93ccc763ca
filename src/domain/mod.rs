//! Core entities shared across the engine.
//!
//! Wire-facing structs are deliberately tolerant: every field the model may
//! omit carries `#[serde(default)]`, and fields the provider emits under
//! more than one name carry aliases.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Semantic domain extracted from a user message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    /// Multi-day plans, day trips, "what to do in X".
    Itinerary,
    /// Restaurants, food, drink.
    Dining,
    /// Hotels, hostels, places to stay.
    Accommodation,
    /// Tours, museums, outdoor activities.
    Activities,
    /// Anything else; served like an itinerary request.
    General,
}

impl Domain {
    /// Route segment used in navigation URLs and results pages.
    pub fn route_type(&self) -> &'static str {
        match self {
            Domain::Itinerary | Domain::General => "itinerary",
            Domain::Dining => "restaurants",
            Domain::Accommodation => "hotels",
            Domain::Activities => "activities",
        }
    }

    /// Canonical lowercase name, used in cache keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Itinerary => "itinerary",
            Domain::Dining => "dining",
            Domain::Accommodation => "accommodation",
            Domain::Activities => "activities",
            Domain::General => "general",
        }
    }
}

/// Continuation intent for follow-up messages within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// "add X to my itinerary"
    AddPoi,
    /// "remove X"
    RemovePoi,
    /// Plain question about the city or plan.
    AskQuestion,
    /// "swap day 2 and 3", "make it cheaper"
    ModifyItinerary,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::AddPoi => "add_poi",
            Intent::RemovePoi => "remove_poi",
            Intent::AskQuestion => "ask_question",
            Intent::ModifyItinerary => "modify_itinerary",
        }
    }
}

/// Per-profile search preferences injected into prompts and blended into
/// query embeddings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchPreferences {
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(default)]
    pub budget_level: String,
    #[serde(default)]
    pub travel_style: String,
    #[serde(default)]
    pub dietary_restrictions: Vec<String>,
    #[serde(default)]
    pub accessibility_needs: Vec<String>,
}

impl SearchPreferences {
    /// True when nothing is set; prompt builders skip the preferences
    /// section entirely in that case.
    pub fn is_empty(&self) -> bool {
        self.interests.is_empty()
            && self.budget_level.is_empty()
            && self.travel_style.is_empty()
            && self.dietary_restrictions.is_empty()
            && self.accessibility_needs.is_empty()
    }
}

/// Optional client location attached to a request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

/// City record. Unique by `(name, country)`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct City {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(alias = "city", default)]
    pub name: String,
    #[serde(default)]
    pub country: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_province: Option<String>,
    #[serde(alias = "latitude", default)]
    pub center_latitude: f64,
    #[serde(alias = "longitude", default)]
    pub center_longitude: f64,
    #[serde(default)]
    pub description: String,
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
}

/// Point of interest. Unique by `(name, latitude, longitude)` within a city.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Poi {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(default)]
    pub name: String,
    #[serde(alias = "lat", default)]
    pub latitude: f64,
    #[serde(alias = "lon", alias = "lng", default)]
    pub longitude: f64,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub website: String,
    #[serde(default)]
    pub phone_number: String,
    #[serde(default)]
    pub opening_hours: String,
    #[serde(default)]
    pub price_level: String,
    #[serde(default)]
    pub rating: f64,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub images: Vec<String>,
    /// City name as emitted by the model; backfilled by the parser when
    /// empty.
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub time_to_spend: String,
    #[serde(default)]
    pub budget: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
}

/// Restaurant: POI-shaped with dining-specific fields. Stored in its own
/// container, same uniqueness rule as [`Poi`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Restaurant {
    #[serde(flatten)]
    pub poi: Poi,
    #[serde(alias = "cuisine", default)]
    pub cuisine_type: String,
    #[serde(default)]
    pub price_range: String,
}

/// Hotel: POI-shaped with accommodation-specific fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Hotel {
    #[serde(flatten)]
    pub poi: Poi,
    #[serde(alias = "stars", default)]
    pub star_rating: f64,
    #[serde(default)]
    pub price_range: String,
}

/// Activity: POI-shaped, its own container.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    #[serde(flatten)]
    pub poi: Poi,
    #[serde(default)]
    pub duration: String,
}

/// Personalized itinerary as emitted by the model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Itinerary {
    #[serde(alias = "name", default)]
    pub itinerary_name: String,
    #[serde(alias = "description", default)]
    pub overall_description: String,
    #[serde(default)]
    pub points_of_interest: Vec<Poi>,
}

/// Complete assembled response for one request. Cached whole under the
/// request's context key and replayed by navigation requests.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AiCityResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city_data: Option<City>,
    #[serde(default)]
    pub points_of_interest: Vec<Poi>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub itinerary: Option<Itinerary>,
    #[serde(default)]
    pub restaurants: Vec<Restaurant>,
    #[serde(default)]
    pub hotels: Vec<Hotel>,
    #[serde(default)]
    pub activities: Vec<Activity>,
    #[serde(default)]
    pub session_id: Uuid,
}

/// One entry of a session's conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Expired,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Expired => "expired",
        }
    }
}

/// Multi-turn conversation identity. History is append-only and
/// chronologically ordered; a session expires 24 h after its last activity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub profile_id: Uuid,
    pub city_name: String,
    #[serde(default)]
    pub conversation_history: Vec<ConversationMessage>,
    #[serde(default)]
    pub session_context: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: SessionStatus,
}

impl Session {
    /// Hours of inactivity after which a session expires.
    pub const EXPIRY_HOURS: i64 = 24;

    /// Creates a fresh active session for one conversation.
    pub fn new(user_id: Uuid, profile_id: Uuid, city_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            profile_id,
            city_name: city_name.into(),
            conversation_history: Vec::new(),
            session_context: serde_json::Value::Null,
            created_at: now,
            updated_at: now,
            expires_at: now + chrono::Duration::hours(Self::EXPIRY_HOURS),
            status: SessionStatus::Active,
        }
    }
}

/// Immutable record of one model call (all stages of one request summed).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    pub id: Uuid,
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub profile_id: Uuid,
    pub city_name: String,
    /// Full text sent, all stage prompts concatenated.
    pub prompt: String,
    /// Full text received, all stage buffers concatenated.
    pub response_text: String,
    pub model_name: String,
    pub latency_ms: i64,
    pub created_at: DateTime<Utc>,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens: i64,
    pub status_code: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub intent: String,
    pub search_type: String,
    pub device_type: String,
    pub cost_estimate: f64,
    pub cache_hit: bool,
    /// SHA-256 of `prompt`, hex-encoded.
    pub prompt_hash: String,
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
}
