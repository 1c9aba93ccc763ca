//! Vector search over stored POIs.

use tracing::debug;
use uuid::Uuid;

use super::cosine_similarity;
use crate::domain::Poi;
use crate::repo::{PoiRepo, RepoResult};

/// Ranks a city's embedded POIs against a query embedding.
#[derive(Debug, Clone)]
pub struct VectorSearch {
    pois: PoiRepo,
}

impl VectorSearch {
    pub fn new(pois: PoiRepo) -> Self {
        Self { pois }
    }

    /// Top-`limit` POIs of a city by cosine similarity, descending. POIs
    /// without embeddings never appear.
    pub fn search_pois(
        &self,
        city_id: Uuid,
        query_embedding: &[f32],
        limit: usize,
    ) -> RepoResult<Vec<(Poi, f32)>> {
        let candidates = self.pois.pois_with_embeddings(city_id)?;
        let candidate_count = candidates.len();

        let mut scored: Vec<(Poi, f32)> = candidates
            .into_iter()
            .map(|poi| {
                let score = poi
                    .embedding
                    .as_deref()
                    .map(|e| cosine_similarity(query_embedding, e))
                    .unwrap_or(0.0);
                (poi, score)
            })
            .collect();

        scored.sort_by(|(_, a), (_, b)| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);

        debug!(
            candidates = candidate_count,
            returned = scored.len(),
            "vector search over stored POIs"
        );
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::City;
    use crate::repo::{CityRepo, Db};
    use std::sync::Arc;

    #[test]
    fn ranks_by_cosine_descending() {
        let db = Arc::new(Db::open_in_memory().unwrap());
        let cities = CityRepo::new(db.clone());
        let pois = PoiRepo::new(db);

        let city_id = cities
            .save(&City {
                name: "Lisbon".into(),
                country: "Portugal".into(),
                ..Default::default()
            })
            .unwrap();

        for (name, embedding) in [
            ("exact", vec![1.0f32, 0.0]),
            ("close", vec![0.9, 0.1]),
            ("far", vec![0.0, 1.0]),
        ] {
            let poi = Poi {
                name: name.into(),
                latitude: embedding[0] as f64,
                longitude: embedding[1] as f64,
                embedding: Some(embedding),
                ..Default::default()
            };
            pois.save(&poi, Some(city_id), None).unwrap();
        }

        let search = VectorSearch::new(pois);
        let results = search.search_pois(city_id, &[1.0, 0.0], 2).unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0.name, "exact");
        assert_eq!(results[1].0.name, "close");
        assert!(results[0].1 > results[1].1);
    }
}
