//! Asynchronous post-stream persistence.
//!
//! Runs detached from the client, which has already received its events.
//! Every failure here is log-and-continue: a persistence error never
//! reaches the stream, and one bad POI never blocks its siblings.

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{ChatRequest, Engine, poi_bearing_part, semantic_search_params};
use crate::cache::VectorCacheEntry;
use crate::classify::Classification;
use crate::domain::{AiCityResponse, City, Interaction, Poi, Session};
use crate::events::StagePart;
use crate::hashing;
use crate::parser;
use crate::provider::{TextProvider, TokenUsage};
use crate::semantic::Embedder;
use crate::worker::StageOutcome;

pub(super) struct PersistJob {
    pub interaction_id: Uuid,
    pub request: ChatRequest,
    pub classification: Classification,
    pub session: Session,
    pub outcomes: Vec<StageOutcome>,
    pub context_key: String,
    pub query_embedding: Option<Vec<f32>>,
    pub latency_ms: i64,
    pub intent: crate::domain::Intent,
}

impl<P, E> Engine<P, E>
where
    P: TextProvider + ?Sized + 'static,
    E: Embedder + ?Sized + 'static,
{
    pub(super) async fn persist_request(&self, job: PersistJob) {
        let parsed = ParsedParts::from_outcomes(&job.outcomes, &job.classification.city_name);

        let city_id = self.persist_city(&parsed, &job.classification);
        let poi_ids = self
            .persist_pois(&parsed, city_id, job.interaction_id)
            .await;
        self.persist_specialized(&parsed, city_id, job.interaction_id);

        let response = parsed.into_response(job.session.id);
        self.populate_caches(&job, &response, city_id);
        self.persist_session_trail(&job, &response);
        self.persist_interaction(&job);

        info!(
            interaction_id = %job.interaction_id,
            city_id = ?city_id,
            pois = poi_ids.len(),
            "persistence complete"
        );
    }

    fn persist_city(&self, parsed: &ParsedParts, classification: &Classification) -> Option<Uuid> {
        let city = match (&parsed.city_data, classification.city_name.is_empty()) {
            (Some(city), _) => city.clone(),
            (None, false) => City {
                name: classification.city_name.clone(),
                ..Default::default()
            },
            (None, true) => return None,
        };

        match self.repos.cities.save(&city) {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(error = %e, city = %city.name, "city save failed");
                None
            }
        }
    }

    /// Saves general + itinerary POIs; duplicate saves reuse the stored
    /// row's id. Embeddings are attached best-effort for vector search.
    async fn persist_pois(
        &self,
        parsed: &ParsedParts,
        city_id: Option<Uuid>,
        interaction_id: Uuid,
    ) -> Vec<Uuid> {
        let mut ids = Vec::new();

        let itinerary_pois = parsed
            .itinerary
            .iter()
            .flat_map(|i| i.points_of_interest.iter());

        for poi in parsed.general_pois.iter().chain(itinerary_pois) {
            let id = match self.repos.pois.save(poi, city_id, Some(interaction_id)) {
                Ok(id) => id,
                Err(e) => {
                    warn!(error = %e, poi = %poi.name, "poi save failed, skipping");
                    continue;
                }
            };
            ids.push(id);

            if poi.embedding.is_none() {
                let text = format!("{} {} {}", poi.name, poi.category, poi.description);
                match self.embedder.embed(&text).await {
                    Ok(embedding) => {
                        if let Err(e) = self.repos.pois.set_embedding(id, &embedding) {
                            warn!(error = %e, poi = %poi.name, "poi embedding store failed");
                        }
                    }
                    Err(e) => debug!(error = %e, poi = %poi.name, "poi embedding skipped"),
                }
            }
        }

        ids
    }

    fn persist_specialized(
        &self,
        parsed: &ParsedParts,
        city_id: Option<Uuid>,
        interaction_id: Uuid,
    ) {
        for restaurant in &parsed.restaurants {
            if let Err(e) = self
                .repos
                .pois
                .save_restaurant(restaurant, city_id, Some(interaction_id))
            {
                warn!(error = %e, name = %restaurant.poi.name, "restaurant save failed");
            }
        }
        for hotel in &parsed.hotels {
            if let Err(e) = self.repos.pois.save_hotel(hotel, city_id, Some(interaction_id)) {
                warn!(error = %e, name = %hotel.poi.name, "hotel save failed");
            }
        }
        for activity in &parsed.activities {
            if let Err(e) = self
                .repos
                .pois
                .save_activity(activity, city_id, Some(interaction_id))
            {
                warn!(error = %e, name = %activity.poi.name, "activity save failed");
            }
        }
    }

    fn populate_caches(&self, job: &PersistJob, response: &AiCityResponse, city_id: Option<Uuid>) {
        self.caches
            .response
            .set(job.context_key.clone(), response.clone());

        let (Some(embedding), Some(city_id)) = (job.query_embedding.as_ref(), city_id) else {
            return;
        };

        let part = poi_bearing_part(job.classification.domain);
        let results: Vec<Poi> = match part {
            StagePart::Restaurants => response.restaurants.iter().map(|r| r.poi.clone()).collect(),
            StagePart::Hotels => response.hotels.iter().map(|h| h.poi.clone()).collect(),
            StagePart::Activities => response.activities.iter().map(|a| a.poi.clone()).collect(),
            _ => response.points_of_interest.clone(),
        };
        if results.is_empty() {
            return;
        }

        self.caches.vector.insert(VectorCacheEntry {
            query_text: job.classification.cleaned_message.clone(),
            embedding: embedding.clone(),
            results,
            city_id,
            search_params: semantic_search_params(job.classification.domain, part),
        });
    }

    fn persist_session_trail(&self, job: &PersistJob, response: &AiCityResponse) {
        let sessions = &self.repos.sessions;
        let now = Utc::now();

        if let Err(e) = sessions.append_message(job.session.id, "user", &job.request.message, now) {
            warn!(error = %e, "user message append failed");
        }

        let assistant_text = job
            .outcomes
            .iter()
            .filter(|o| !o.text.is_empty())
            .map(|o| o.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        if let Err(e) = sessions.append_message(
            job.session.id,
            "assistant",
            &assistant_text,
            now + chrono::Duration::milliseconds(1),
        ) {
            warn!(error = %e, "assistant message append failed");
        }

        let context = serde_json::json!({
            "last_cache_key": job.context_key,
            "last_domain": job.classification.domain,
            "poi_count": response.points_of_interest.len(),
        });
        if let Err(e) = sessions.set_context(job.session.id, &context) {
            warn!(error = %e, "session context update failed");
        }
    }

    fn persist_interaction(&self, job: &PersistJob) {
        let mut usage = TokenUsage::default();
        for outcome in &job.outcomes {
            usage.add(outcome.usage);
        }

        let prompt = job
            .outcomes
            .iter()
            .map(|o| o.prompt.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let response_text = job
            .outcomes
            .iter()
            .map(|o| o.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let errors: Vec<&str> = job
            .outcomes
            .iter()
            .filter_map(|o| o.error.as_deref())
            .collect();
        let cache_hit = !job.outcomes.is_empty() && job.outcomes.iter().all(|o| o.cache_hit);
        let model_name = self.provider.model_name().to_string();
        let cost_estimate =
            self.cost
                .estimate(&model_name, usage.prompt_tokens, usage.completion_tokens);

        let interaction = Interaction {
            id: job.interaction_id,
            session_id: job.session.id,
            user_id: job.request.user_id,
            profile_id: job.request.profile_id,
            city_name: job.classification.city_name.clone(),
            prompt_hash: hashing::prompt_sha256(&prompt),
            prompt,
            response_text,
            model_name,
            latency_ms: job.latency_ms,
            created_at: Utc::now(),
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total(),
            status_code: if errors.is_empty() { 200 } else { 500 },
            error_message: if errors.is_empty() {
                None
            } else {
                Some(errors.join("; "))
            },
            intent: job.intent.as_str().to_string(),
            search_type: job.classification.domain.as_str().to_string(),
            device_type: job.request.device_type.clone(),
            cost_estimate,
            cache_hit,
            embedding: job.query_embedding.clone(),
        };

        if let Err(e) = self.repos.interactions.save(&interaction) {
            warn!(error = %e, "interaction save failed");
        }
    }
}

/// Typed view of the captured stage buffers.
struct ParsedParts {
    city_data: Option<City>,
    general_pois: Vec<Poi>,
    itinerary: Option<crate::domain::Itinerary>,
    restaurants: Vec<crate::domain::Restaurant>,
    hotels: Vec<crate::domain::Hotel>,
    activities: Vec<crate::domain::Activity>,
}

impl ParsedParts {
    fn from_outcomes(outcomes: &[StageOutcome], city_name: &str) -> Self {
        let mut parts = Self {
            city_data: None,
            general_pois: Vec::new(),
            itinerary: None,
            restaurants: Vec::new(),
            hotels: Vec::new(),
            activities: Vec::new(),
        };

        for outcome in outcomes {
            if outcome.text.is_empty() {
                continue;
            }
            match outcome.part {
                StagePart::CityData => parts.city_data = parser::parse_city_data(&outcome.text),
                StagePart::GeneralPois => parts.general_pois = parser::parse_pois(&outcome.text),
                StagePart::Itinerary => parts.itinerary = parser::parse_itinerary(&outcome.text),
                StagePart::Restaurants => {
                    parts.restaurants = parser::parse_restaurants(&outcome.text)
                }
                StagePart::Hotels => parts.hotels = parser::parse_hotels(&outcome.text),
                StagePart::Activities => parts.activities = parser::parse_activities(&outcome.text),
            }
        }

        let effective_city = parts
            .city_data
            .as_ref()
            .map(|c| c.name.clone())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| city_name.to_string());

        parser::propagate_city(&effective_city, &mut parts.general_pois);
        if let Some(itinerary) = parts.itinerary.as_mut() {
            parser::propagate_city(&effective_city, &mut itinerary.points_of_interest);
        }
        for restaurant in parts.restaurants.iter_mut() {
            if restaurant.poi.city.is_empty() {
                restaurant.poi.city = effective_city.clone();
            }
        }
        for hotel in parts.hotels.iter_mut() {
            if hotel.poi.city.is_empty() {
                hotel.poi.city = effective_city.clone();
            }
        }
        for activity in parts.activities.iter_mut() {
            if activity.poi.city.is_empty() {
                activity.poi.city = effective_city.clone();
            }
        }

        parts
    }

    fn into_response(self, session_id: Uuid) -> AiCityResponse {
        AiCityResponse {
            city_data: self.city_data,
            points_of_interest: self.general_pois,
            itinerary: self.itinerary,
            restaurants: self.restaurants,
            hotels: self.hotels,
            activities: self.activities,
            session_id,
        }
    }
}
