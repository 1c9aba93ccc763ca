//! POI-family upserts and the favorites table that depends on them.
//!
//! The upsert rule is load-bearing: a duplicate `(name, latitude,
//! longitude)` never creates a second row and always returns the existing
//! id, so favorite/bookmark foreign keys stay satisfiable. A save never
//! returns a nil id; failure to obtain one aborts that row only.

use std::sync::Arc;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use super::error::RepoResult;
use super::{Db, blob_to_embedding, embedding_to_blob, parse_uuid};
use crate::domain::{Activity, Hotel, Poi, Restaurant};

#[derive(Debug, Clone)]
pub struct PoiRepo {
    db: Arc<Db>,
}

struct PoiRow {
    id: String,
    city_id: Option<String>,
    tags: String,
    images: String,
    embedding: Option<Vec<u8>>,
    source_interaction_id: Option<String>,
    created_at: String,
}

impl PoiRow {
    fn build(
        poi: &Poi,
        city_id: Option<Uuid>,
        source_interaction_id: Option<Uuid>,
    ) -> RepoResult<Self> {
        Ok(Self {
            id: poi.id.unwrap_or_else(Uuid::new_v4).to_string(),
            city_id: city_id.map(|id| id.to_string()),
            tags: serde_json::to_string(&poi.tags)?,
            images: serde_json::to_string(&poi.images)?,
            embedding: poi.embedding.as_deref().map(embedding_to_blob),
            source_interaction_id: source_interaction_id.map(|id| id.to_string()),
            created_at: Utc::now().to_rfc3339(),
        })
    }
}

fn select_existing(conn: &Connection, table: &str, poi: &Poi) -> RepoResult<Uuid> {
    let raw: String = conn.query_row(
        &format!("SELECT id FROM {table} WHERE name = ?1 AND latitude = ?2 AND longitude = ?3"),
        params![poi.name, poi.latitude, poi.longitude],
        |row| row.get(0),
    )?;
    parse_uuid(&raw)
}

impl PoiRepo {
    pub fn new(db: Arc<Db>) -> Self {
        Self { db }
    }

    /// Insert-or-reuse into `pois`. Returns the stable id either way.
    pub fn save(
        &self,
        poi: &Poi,
        city_id: Option<Uuid>,
        source_interaction_id: Option<Uuid>,
    ) -> RepoResult<Uuid> {
        let row = PoiRow::build(poi, city_id, source_interaction_id)?;

        self.db.with_conn(|conn| {
            let inserted: Option<String> = conn
                .query_row(
                    "INSERT INTO pois (id, city_id, name, latitude, longitude, category,
                        description, address, website, phone_number, opening_hours, price_level,
                        rating, tags, images, embedding, time_to_spend, budget, priority,
                        source_interaction_id, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                        ?16, ?17, ?18, ?19, ?20, ?21)
                     ON CONFLICT(name, latitude, longitude) DO NOTHING
                     RETURNING id",
                    params![
                        row.id,
                        row.city_id,
                        poi.name,
                        poi.latitude,
                        poi.longitude,
                        poi.category,
                        poi.description,
                        poi.address,
                        poi.website,
                        poi.phone_number,
                        poi.opening_hours,
                        poi.price_level,
                        poi.rating,
                        row.tags,
                        row.images,
                        row.embedding,
                        poi.time_to_spend,
                        poi.budget,
                        poi.priority,
                        row.source_interaction_id,
                        row.created_at,
                    ],
                    |r| r.get(0),
                )
                .optional()?;

            match inserted {
                Some(raw) => parse_uuid(&raw),
                None => select_existing(conn, "pois", poi),
            }
        })
    }

    /// Insert-or-reuse into `restaurants`.
    pub fn save_restaurant(
        &self,
        restaurant: &Restaurant,
        city_id: Option<Uuid>,
        source_interaction_id: Option<Uuid>,
    ) -> RepoResult<Uuid> {
        let poi = &restaurant.poi;
        let row = PoiRow::build(poi, city_id, source_interaction_id)?;

        self.db.with_conn(|conn| {
            let inserted: Option<String> = conn
                .query_row(
                    "INSERT INTO restaurants (id, city_id, name, latitude, longitude, category,
                        description, address, website, phone_number, opening_hours, price_level,
                        rating, tags, images, embedding, time_to_spend, budget, priority,
                        source_interaction_id, created_at, cuisine_type, price_range)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                        ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23)
                     ON CONFLICT(name, latitude, longitude) DO NOTHING
                     RETURNING id",
                    params![
                        row.id,
                        row.city_id,
                        poi.name,
                        poi.latitude,
                        poi.longitude,
                        poi.category,
                        poi.description,
                        poi.address,
                        poi.website,
                        poi.phone_number,
                        poi.opening_hours,
                        poi.price_level,
                        poi.rating,
                        row.tags,
                        row.images,
                        row.embedding,
                        poi.time_to_spend,
                        poi.budget,
                        poi.priority,
                        row.source_interaction_id,
                        row.created_at,
                        restaurant.cuisine_type,
                        restaurant.price_range,
                    ],
                    |r| r.get(0),
                )
                .optional()?;

            match inserted {
                Some(raw) => parse_uuid(&raw),
                None => select_existing(conn, "restaurants", poi),
            }
        })
    }

    /// Insert-or-reuse into `hotels`.
    pub fn save_hotel(
        &self,
        hotel: &Hotel,
        city_id: Option<Uuid>,
        source_interaction_id: Option<Uuid>,
    ) -> RepoResult<Uuid> {
        let poi = &hotel.poi;
        let row = PoiRow::build(poi, city_id, source_interaction_id)?;

        self.db.with_conn(|conn| {
            let inserted: Option<String> = conn
                .query_row(
                    "INSERT INTO hotels (id, city_id, name, latitude, longitude, category,
                        description, address, website, phone_number, opening_hours, price_level,
                        rating, tags, images, embedding, time_to_spend, budget, priority,
                        source_interaction_id, created_at, star_rating, price_range)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                        ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23)
                     ON CONFLICT(name, latitude, longitude) DO NOTHING
                     RETURNING id",
                    params![
                        row.id,
                        row.city_id,
                        poi.name,
                        poi.latitude,
                        poi.longitude,
                        poi.category,
                        poi.description,
                        poi.address,
                        poi.website,
                        poi.phone_number,
                        poi.opening_hours,
                        poi.price_level,
                        poi.rating,
                        row.tags,
                        row.images,
                        row.embedding,
                        poi.time_to_spend,
                        poi.budget,
                        poi.priority,
                        row.source_interaction_id,
                        row.created_at,
                        hotel.star_rating,
                        hotel.price_range,
                    ],
                    |r| r.get(0),
                )
                .optional()?;

            match inserted {
                Some(raw) => parse_uuid(&raw),
                None => select_existing(conn, "hotels", poi),
            }
        })
    }

    /// Insert-or-reuse into `activities`.
    pub fn save_activity(
        &self,
        activity: &Activity,
        city_id: Option<Uuid>,
        source_interaction_id: Option<Uuid>,
    ) -> RepoResult<Uuid> {
        let poi = &activity.poi;
        let row = PoiRow::build(poi, city_id, source_interaction_id)?;

        self.db.with_conn(|conn| {
            let inserted: Option<String> = conn
                .query_row(
                    "INSERT INTO activities (id, city_id, name, latitude, longitude, category,
                        description, address, website, phone_number, opening_hours, price_level,
                        rating, tags, images, embedding, time_to_spend, budget, priority,
                        source_interaction_id, created_at, duration)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                        ?16, ?17, ?18, ?19, ?20, ?21, ?22)
                     ON CONFLICT(name, latitude, longitude) DO NOTHING
                     RETURNING id",
                    params![
                        row.id,
                        row.city_id,
                        poi.name,
                        poi.latitude,
                        poi.longitude,
                        poi.category,
                        poi.description,
                        poi.address,
                        poi.website,
                        poi.phone_number,
                        poi.opening_hours,
                        poi.price_level,
                        poi.rating,
                        row.tags,
                        row.images,
                        row.embedding,
                        poi.time_to_spend,
                        poi.budget,
                        poi.priority,
                        row.source_interaction_id,
                        row.created_at,
                        activity.duration,
                    ],
                    |r| r.get(0),
                )
                .optional()?;

            match inserted {
                Some(raw) => parse_uuid(&raw),
                None => select_existing(conn, "activities", poi),
            }
        })
    }

    pub fn get(&self, id: Uuid) -> RepoResult<Option<Poi>> {
        self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT id, name, latitude, longitude, category, description, address, website,
                        phone_number, opening_hours, price_level, rating, tags, images, embedding,
                        time_to_spend, budget, priority
                 FROM pois WHERE id = ?1",
                params![id.to_string()],
                Self::row_to_poi,
            )
            .optional()
            .map_err(Into::into)
        })
    }

    /// POIs of a city that carry an embedding, for vector search.
    pub fn pois_with_embeddings(&self, city_id: Uuid) -> RepoResult<Vec<Poi>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, latitude, longitude, category, description, address, website,
                        phone_number, opening_hours, price_level, rating, tags, images, embedding,
                        time_to_spend, budget, priority
                 FROM pois WHERE city_id = ?1 AND embedding IS NOT NULL",
            )?;
            let rows = stmt.query_map(params![city_id.to_string()], Self::row_to_poi)?;
            let mut pois = Vec::new();
            for row in rows {
                pois.push(row?);
            }
            Ok(pois)
        })
    }

    /// Attaches an embedding to an existing POI.
    pub fn set_embedding(&self, id: Uuid, embedding: &[f32]) -> RepoResult<()> {
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE pois SET embedding = ?1 WHERE id = ?2",
                params![embedding_to_blob(embedding), id.to_string()],
            )?;
            Ok(())
        })
    }

    pub fn count(&self, table: &str) -> RepoResult<i64> {
        debug_assert!(matches!(table, "pois" | "restaurants" | "hotels" | "activities"));
        self.db.with_conn(|conn| {
            conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
                .map_err(Into::into)
        })
    }

    fn row_to_poi(row: &rusqlite::Row<'_>) -> rusqlite::Result<Poi> {
        let raw_id: String = row.get(0)?;
        let tags: String = row.get(12)?;
        let images: String = row.get(13)?;
        let embedding: Option<Vec<u8>> = row.get(14)?;
        Ok(Poi {
            id: Uuid::parse_str(&raw_id).ok(),
            name: row.get(1)?,
            latitude: row.get(2)?,
            longitude: row.get(3)?,
            category: row.get(4)?,
            description: row.get(5)?,
            address: row.get(6)?,
            website: row.get(7)?,
            phone_number: row.get(8)?,
            opening_hours: row.get(9)?,
            price_level: row.get(10)?,
            rating: row.get(11)?,
            tags: serde_json::from_str(&tags).unwrap_or_default(),
            images: serde_json::from_str(&images).unwrap_or_default(),
            city: String::new(),
            time_to_spend: row.get(15)?,
            budget: row.get(16)?,
            priority: row.get(17)?,
            embedding: embedding.map(|blob| blob_to_embedding(&blob)),
        })
    }
}

/// Favorites reference `pois(id)`; the POI upsert rule guarantees those
/// foreign keys resolve.
#[derive(Debug, Clone)]
pub struct FavoriteRepo {
    db: Arc<Db>,
}

impl FavoriteRepo {
    pub fn new(db: Arc<Db>) -> Self {
        Self { db }
    }

    /// Idempotent per `(user_id, poi_id)`.
    pub fn save(&self, user_id: Uuid, poi_id: Uuid) -> RepoResult<Uuid> {
        self.db.with_conn(|conn| {
            let inserted: Option<String> = conn
                .query_row(
                    "INSERT INTO favorites (id, user_id, poi_id, created_at)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(user_id, poi_id) DO NOTHING
                     RETURNING id",
                    params![
                        Uuid::new_v4().to_string(),
                        user_id.to_string(),
                        poi_id.to_string(),
                        Utc::now().to_rfc3339(),
                    ],
                    |row| row.get(0),
                )
                .optional()?;

            match inserted {
                Some(raw) => parse_uuid(&raw),
                None => {
                    let raw: String = conn.query_row(
                        "SELECT id FROM favorites WHERE user_id = ?1 AND poi_id = ?2",
                        params![user_id.to_string(), poi_id.to_string()],
                        |row| row.get(0),
                    )?;
                    parse_uuid(&raw)
                }
            }
        })
    }

    pub fn count_for_user(&self, user_id: Uuid) -> RepoResult<i64> {
        self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM favorites WHERE user_id = ?1",
                params![user_id.to_string()],
                |row| row.get(0),
            )
            .map_err(Into::into)
        })
    }
}
