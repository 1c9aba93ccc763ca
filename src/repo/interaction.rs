//! Interaction rows: one per model-call record, append-only.

use std::sync::Arc;

use rusqlite::types::Type;
use rusqlite::{OptionalExtension, params};
use uuid::Uuid;

use super::error::RepoResult;
use super::{Db, blob_to_embedding, embedding_to_blob};
use crate::domain::Interaction;

#[derive(Debug, Clone)]
pub struct InteractionRepo {
    db: Arc<Db>,
}

fn uuid_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn timestamp_column(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> rusqlite::Result<chrono::DateTime<chrono::Utc>> {
    let raw: String = row.get(idx)?;
    chrono::DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

impl InteractionRepo {
    pub fn new(db: Arc<Db>) -> Self {
        Self { db }
    }

    /// Always inserts; interaction rows are immutable after write.
    pub fn save(&self, interaction: &Interaction) -> RepoResult<()> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO interactions (id, session_id, user_id, profile_id, city_name,
                    prompt, response_text, model_name, latency_ms, created_at, prompt_tokens,
                    completion_tokens, total_tokens, status_code, error_message, intent,
                    search_type, device_type, cost_estimate, cache_hit, prompt_hash, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                    ?17, ?18, ?19, ?20, ?21, ?22)",
                params![
                    interaction.id.to_string(),
                    interaction.session_id.to_string(),
                    interaction.user_id.to_string(),
                    interaction.profile_id.to_string(),
                    interaction.city_name,
                    interaction.prompt,
                    interaction.response_text,
                    interaction.model_name,
                    interaction.latency_ms,
                    interaction.created_at.to_rfc3339(),
                    interaction.prompt_tokens,
                    interaction.completion_tokens,
                    interaction.total_tokens,
                    interaction.status_code,
                    interaction.error_message,
                    interaction.intent,
                    interaction.search_type,
                    interaction.device_type,
                    interaction.cost_estimate,
                    interaction.cache_hit,
                    interaction.prompt_hash,
                    interaction.embedding.as_deref().map(embedding_to_blob),
                ],
            )?;
            Ok(())
        })
    }

    pub fn get(&self, id: Uuid) -> RepoResult<Option<Interaction>> {
        self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT id, session_id, user_id, profile_id, city_name, prompt, response_text,
                        model_name, latency_ms, created_at, prompt_tokens, completion_tokens,
                        total_tokens, status_code, error_message, intent, search_type,
                        device_type, cost_estimate, cache_hit, prompt_hash, embedding
                 FROM interactions WHERE id = ?1",
                params![id.to_string()],
                Self::row_to_interaction,
            )
            .optional()
            .map_err(Into::into)
        })
    }

    pub fn count(&self) -> RepoResult<i64> {
        self.db.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM interactions", [], |row| row.get(0))
                .map_err(Into::into)
        })
    }

    /// Most recently inserted row, by insertion order.
    pub fn latest(&self) -> RepoResult<Option<Interaction>> {
        self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT id, session_id, user_id, profile_id, city_name, prompt, response_text,
                        model_name, latency_ms, created_at, prompt_tokens, completion_tokens,
                        total_tokens, status_code, error_message, intent, search_type,
                        device_type, cost_estimate, cache_hit, prompt_hash, embedding
                 FROM interactions ORDER BY rowid DESC LIMIT 1",
                [],
                Self::row_to_interaction,
            )
            .optional()
            .map_err(Into::into)
        })
    }

    fn row_to_interaction(row: &rusqlite::Row<'_>) -> rusqlite::Result<Interaction> {
        let embedding: Option<Vec<u8>> = row.get(21)?;
        Ok(Interaction {
            id: uuid_column(row, 0)?,
            session_id: uuid_column(row, 1)?,
            user_id: uuid_column(row, 2)?,
            profile_id: uuid_column(row, 3)?,
            city_name: row.get(4)?,
            prompt: row.get(5)?,
            response_text: row.get(6)?,
            model_name: row.get(7)?,
            latency_ms: row.get(8)?,
            created_at: timestamp_column(row, 9)?,
            prompt_tokens: row.get(10)?,
            completion_tokens: row.get(11)?,
            total_tokens: row.get(12)?,
            status_code: row.get(13)?,
            error_message: row.get(14)?,
            intent: row.get(15)?,
            search_type: row.get(16)?,
            device_type: row.get(17)?,
            cost_estimate: row.get(18)?,
            cache_hit: row.get(19)?,
            prompt_hash: row.get(20)?,
            embedding: embedding.map(|blob| blob_to_embedding(&blob)),
        })
    }
}
