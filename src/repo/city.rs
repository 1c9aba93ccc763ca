//! City upsert and lookup.

use std::sync::Arc;

use chrono::Utc;
use rusqlite::{OptionalExtension, params};
use uuid::Uuid;

use super::error::RepoResult;
use super::{Db, blob_to_embedding, embedding_to_blob, parse_uuid};
use crate::domain::City;

#[derive(Debug, Clone)]
pub struct CityRepo {
    db: Arc<Db>,
}

impl CityRepo {
    pub fn new(db: Arc<Db>) -> Self {
        Self { db }
    }

    /// Idempotent save keyed by `(name, country)`. A duplicate save returns
    /// the existing row's id; no second row is ever created.
    pub fn save(&self, city: &City) -> RepoResult<Uuid> {
        let id = city.id.unwrap_or_else(Uuid::new_v4);
        let embedding_blob = city.embedding.as_deref().map(embedding_to_blob);

        self.db.with_conn(|conn| {
            let inserted: Option<String> = conn
                .query_row(
                    "INSERT INTO cities (id, name, country, state_province, center_latitude,
                        center_longitude, description, embedding, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                     ON CONFLICT(name, country) DO NOTHING
                     RETURNING id",
                    params![
                        id.to_string(),
                        city.name,
                        city.country,
                        city.state_province,
                        city.center_latitude,
                        city.center_longitude,
                        city.description,
                        embedding_blob,
                        Utc::now().to_rfc3339(),
                    ],
                    |row| row.get(0),
                )
                .optional()?;

            match inserted {
                Some(raw) => parse_uuid(&raw),
                None => {
                    let raw: String = conn.query_row(
                        "SELECT id FROM cities WHERE name = ?1 AND country = ?2",
                        params![city.name, city.country],
                        |row| row.get(0),
                    )?;
                    parse_uuid(&raw)
                }
            }
        })
    }

    pub fn get(&self, id: Uuid) -> RepoResult<Option<City>> {
        self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT id, name, country, state_province, center_latitude, center_longitude,
                        description, embedding
                 FROM cities WHERE id = ?1",
                params![id.to_string()],
                Self::row_to_city,
            )
            .optional()
            .map_err(Into::into)
        })
    }

    pub fn get_by_name(&self, name: &str, country: &str) -> RepoResult<Option<City>> {
        self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT id, name, country, state_province, center_latitude, center_longitude,
                        description, embedding
                 FROM cities WHERE name = ?1 AND country = ?2",
                params![name, country],
                Self::row_to_city,
            )
            .optional()
            .map_err(Into::into)
        })
    }

    /// First row under this name, any country. Classification knows the
    /// city name before a country is available.
    pub fn find_by_name(&self, name: &str) -> RepoResult<Option<City>> {
        self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT id, name, country, state_province, center_latitude, center_longitude,
                        description, embedding
                 FROM cities WHERE name = ?1 ORDER BY country LIMIT 1",
                params![name],
                Self::row_to_city,
            )
            .optional()
            .map_err(Into::into)
        })
    }

    pub fn count(&self) -> RepoResult<i64> {
        self.db.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM cities", [], |row| row.get(0))
                .map_err(Into::into)
        })
    }

    fn row_to_city(row: &rusqlite::Row<'_>) -> rusqlite::Result<City> {
        let raw_id: String = row.get(0)?;
        let embedding: Option<Vec<u8>> = row.get(7)?;
        Ok(City {
            id: Uuid::parse_str(&raw_id).ok(),
            name: row.get(1)?,
            country: row.get(2)?,
            state_province: row.get(3)?,
            center_latitude: row.get(4)?,
            center_longitude: row.get(5)?,
            description: row.get(6)?,
            embedding: embedding.map(|blob| blob_to_embedding(&blob)),
        })
    }
}
