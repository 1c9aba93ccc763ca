//! Sessions and their append-only conversation history.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, params};
use uuid::Uuid;

use super::error::RepoResult;
use super::{Db, parse_timestamp, parse_uuid};
use crate::domain::{ConversationMessage, Session, SessionStatus};

#[derive(Debug, Clone)]
pub struct SessionRepo {
    db: Arc<Db>,
}

impl SessionRepo {
    pub fn new(db: Arc<Db>) -> Self {
        Self { db }
    }

    /// Idempotent: upserting an existing session id is a no-op.
    pub fn save(&self, session: &Session) -> RepoResult<()> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sessions (id, user_id, profile_id, city_name, session_context,
                    created_at, updated_at, expires_at, status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(id) DO NOTHING",
                params![
                    session.id.to_string(),
                    session.user_id.to_string(),
                    session.profile_id.to_string(),
                    session.city_name,
                    serde_json::to_string(&session.session_context)?,
                    session.created_at.to_rfc3339(),
                    session.updated_at.to_rfc3339(),
                    session.expires_at.to_rfc3339(),
                    session.status.as_str(),
                ],
            )?;
            Ok(())
        })
    }

    /// Loads a session with its ordered history, if present.
    pub fn get(&self, id: Uuid) -> RepoResult<Option<Session>> {
        let session = self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT id, user_id, profile_id, city_name, session_context, created_at,
                        updated_at, expires_at, status
                 FROM sessions WHERE id = ?1",
                params![id.to_string()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, String>(6)?,
                        row.get::<_, String>(7)?,
                        row.get::<_, String>(8)?,
                    ))
                },
            )
            .optional()
            .map_err(super::RepoError::from)
        })?;

        let Some((id, user_id, profile_id, city_name, context, created, updated, expires, status)) =
            session
        else {
            return Ok(None);
        };

        let id = parse_uuid(&id)?;
        let history = self.history(id)?;

        Ok(Some(Session {
            id,
            user_id: parse_uuid(&user_id)?,
            profile_id: parse_uuid(&profile_id)?,
            city_name,
            conversation_history: history,
            session_context: serde_json::from_str(&context).unwrap_or(serde_json::Value::Null),
            created_at: parse_timestamp(&created)?,
            updated_at: parse_timestamp(&updated)?,
            expires_at: parse_timestamp(&expires)?,
            status: if status == "expired" {
                SessionStatus::Expired
            } else {
                SessionStatus::Active
            },
        }))
    }

    /// Appends one message; history is insert-only.
    pub fn append_message(
        &self,
        session_id: Uuid,
        role: &str,
        content: &str,
        timestamp: DateTime<Utc>,
    ) -> RepoResult<()> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO session_messages (id, session_id, role, content, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    Uuid::new_v4().to_string(),
                    session_id.to_string(),
                    role,
                    content,
                    timestamp.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }

    /// Ordered conversation history for a session.
    pub fn history(&self, session_id: Uuid) -> RepoResult<Vec<ConversationMessage>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT role, content, timestamp FROM session_messages
                 WHERE session_id = ?1 ORDER BY timestamp ASC",
            )?;
            let rows = stmt.query_map(params![session_id.to_string()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?;

            let mut messages = Vec::new();
            for row in rows {
                let (role, content, timestamp) = row?;
                messages.push(ConversationMessage {
                    role,
                    content,
                    timestamp: parse_timestamp(&timestamp)?,
                });
            }
            Ok(messages)
        })
    }

    /// Replaces the session's context blob (e.g. the last cache key used
    /// by continuation flows).
    pub fn set_context(&self, session_id: Uuid, context: &serde_json::Value) -> RepoResult<()> {
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE sessions SET session_context = ?1, updated_at = ?2 WHERE id = ?3",
                params![
                    serde_json::to_string(context)?,
                    Utc::now().to_rfc3339(),
                    session_id.to_string(),
                ],
            )?;
            Ok(())
        })
    }

    /// Pushes the inactivity expiry forward after new activity.
    pub fn touch(&self, session_id: Uuid, now: DateTime<Utc>) -> RepoResult<()> {
        let expires = now + chrono::Duration::hours(Session::EXPIRY_HOURS);
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE sessions SET updated_at = ?1, expires_at = ?2 WHERE id = ?3",
                params![now.to_rfc3339(), expires.to_rfc3339(), session_id.to_string()],
            )?;
            Ok(())
        })
    }

    /// Marks sessions past their expiry as expired; returns how many.
    pub fn expire_stale(&self, now: DateTime<Utc>) -> RepoResult<usize> {
        self.db.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE sessions SET status = 'expired'
                 WHERE status = 'active' AND expires_at < ?1",
                params![now.to_rfc3339()],
            )?;
            Ok(changed)
        })
    }
}
