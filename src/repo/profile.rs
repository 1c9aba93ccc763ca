//! Profile store: search preferences per profile id.

use std::sync::Arc;

use chrono::Utc;
use rusqlite::{OptionalExtension, params};
use uuid::Uuid;

use super::error::RepoResult;
use super::Db;
use crate::domain::SearchPreferences;

#[derive(Debug, Clone)]
pub struct ProfileRepo {
    db: Arc<Db>,
}

impl ProfileRepo {
    pub fn new(db: Arc<Db>) -> Self {
        Self { db }
    }

    /// Preferences for a profile; a missing or undecodable row yields
    /// defaults (profile errors are non-fatal to a request).
    pub fn get_preferences(&self, profile_id: Uuid) -> RepoResult<SearchPreferences> {
        let raw: Option<String> = self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT preferences FROM profiles WHERE id = ?1",
                params![profile_id.to_string()],
                |row| row.get(0),
            )
            .optional()
            .map_err(Into::into)
        })?;

        Ok(raw
            .and_then(|json| serde_json::from_str(&json).ok())
            .unwrap_or_default())
    }

    pub fn upsert(
        &self,
        profile_id: Uuid,
        user_id: Uuid,
        preferences: &SearchPreferences,
    ) -> RepoResult<()> {
        let now = Utc::now().to_rfc3339();
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO profiles (id, user_id, preferences, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)
                 ON CONFLICT(id) DO UPDATE SET preferences = ?3, updated_at = ?4",
                params![
                    profile_id.to_string(),
                    user_id.to_string(),
                    serde_json::to_string(preferences)?,
                    now,
                ],
            )?;
            Ok(())
        })
    }
}
