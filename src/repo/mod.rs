//! SQLite persistence adapters.
//!
//! Repositories are concurrency-safe: they serialize on one connection
//! mutex, and every call is its own short transaction. Saves are
//! idempotent where the data model demands it (cities, POIs, sessions) so
//! downstream foreign keys always resolve.

pub mod city;
pub mod error;
pub mod interaction;
pub mod poi;
pub mod profile;
pub mod session;

pub use city::CityRepo;
pub use error::{RepoError, RepoResult};
pub use interaction::InteractionRepo;
pub use poi::{FavoriteRepo, PoiRepo};
pub use profile::ProfileRepo;
pub use session::SessionRepo;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::Connection;
use uuid::Uuid;

/// Shared SQLite handle. WAL and foreign-key enforcement are always on;
/// migrations run idempotently at open.
pub struct Db {
    conn: Mutex<Connection>,
}

impl Db {
    pub fn open(path: &str) -> RepoResult<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    /// Private in-memory database, used by tests.
    pub fn open_in_memory() -> RepoResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> RepoResult<Self> {
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub(crate) fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> RepoResult<T>,
    ) -> RepoResult<T> {
        let conn = self.conn.lock();
        f(&conn)
    }
}

impl std::fmt::Debug for Db {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Db").finish_non_exhaustive()
    }
}

/// Every repository, sharing one [`Db`].
#[derive(Debug, Clone)]
pub struct Repositories {
    pub cities: CityRepo,
    pub pois: PoiRepo,
    pub interactions: InteractionRepo,
    pub sessions: SessionRepo,
    pub profiles: ProfileRepo,
    pub favorites: FavoriteRepo,
}

impl Repositories {
    pub fn new(db: Arc<Db>) -> Self {
        Self {
            cities: CityRepo::new(db.clone()),
            pois: PoiRepo::new(db.clone()),
            interactions: InteractionRepo::new(db.clone()),
            sessions: SessionRepo::new(db.clone()),
            profiles: ProfileRepo::new(db.clone()),
            favorites: FavoriteRepo::new(db),
        }
    }
}

fn poi_table_ddl(table: &str, extra_columns: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            id TEXT PRIMARY KEY,
            city_id TEXT REFERENCES cities(id),
            name TEXT NOT NULL,
            latitude REAL NOT NULL,
            longitude REAL NOT NULL,
            category TEXT NOT NULL DEFAULT '',
            description TEXT NOT NULL DEFAULT '',
            address TEXT NOT NULL DEFAULT '',
            website TEXT NOT NULL DEFAULT '',
            phone_number TEXT NOT NULL DEFAULT '',
            opening_hours TEXT NOT NULL DEFAULT '',
            price_level TEXT NOT NULL DEFAULT '',
            rating REAL NOT NULL DEFAULT 0,
            tags TEXT NOT NULL DEFAULT '[]',
            images TEXT NOT NULL DEFAULT '[]',
            embedding BLOB,
            time_to_spend TEXT NOT NULL DEFAULT '',
            budget TEXT NOT NULL DEFAULT '',
            priority INTEGER NOT NULL DEFAULT 0,
            source_interaction_id TEXT,
            created_at TEXT NOT NULL,
            {extra_columns}
            UNIQUE(name, latitude, longitude)
        );
        CREATE INDEX IF NOT EXISTS idx_{table}_city ON {table}(city_id);"
    )
}

fn migrate(conn: &Connection) -> RepoResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS cities (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            country TEXT NOT NULL DEFAULT '',
            state_province TEXT,
            center_latitude REAL NOT NULL DEFAULT 0,
            center_longitude REAL NOT NULL DEFAULT 0,
            description TEXT NOT NULL DEFAULT '',
            embedding BLOB,
            created_at TEXT NOT NULL,
            UNIQUE(name, country)
        );",
    )?;

    conn.execute_batch(&poi_table_ddl("pois", ""))?;
    conn.execute_batch(&poi_table_ddl(
        "restaurants",
        "cuisine_type TEXT NOT NULL DEFAULT '',
         price_range TEXT NOT NULL DEFAULT '',",
    ))?;
    conn.execute_batch(&poi_table_ddl(
        "hotels",
        "star_rating REAL NOT NULL DEFAULT 0,
         price_range TEXT NOT NULL DEFAULT '',",
    ))?;
    conn.execute_batch(&poi_table_ddl(
        "activities",
        "duration TEXT NOT NULL DEFAULT '',",
    ))?;

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS interactions (
            id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            profile_id TEXT NOT NULL,
            city_name TEXT NOT NULL DEFAULT '',
            prompt TEXT NOT NULL DEFAULT '',
            response_text TEXT NOT NULL DEFAULT '',
            model_name TEXT NOT NULL DEFAULT '',
            latency_ms INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            prompt_tokens INTEGER NOT NULL DEFAULT 0,
            completion_tokens INTEGER NOT NULL DEFAULT 0,
            total_tokens INTEGER NOT NULL DEFAULT 0,
            status_code INTEGER NOT NULL DEFAULT 200,
            error_message TEXT,
            intent TEXT NOT NULL DEFAULT '',
            search_type TEXT NOT NULL DEFAULT '',
            device_type TEXT NOT NULL DEFAULT '',
            cost_estimate REAL NOT NULL DEFAULT 0,
            cache_hit INTEGER NOT NULL DEFAULT 0,
            prompt_hash TEXT NOT NULL DEFAULT '',
            embedding BLOB
        );
        CREATE INDEX IF NOT EXISTS idx_interactions_session ON interactions(session_id);
        CREATE INDEX IF NOT EXISTS idx_interactions_user ON interactions(user_id);

        CREATE TABLE IF NOT EXISTS sessions (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            profile_id TEXT NOT NULL,
            city_name TEXT NOT NULL DEFAULT '',
            session_context TEXT NOT NULL DEFAULT 'null',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            expires_at TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'active'
        );

        CREATE TABLE IF NOT EXISTS session_messages (
            id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
            role TEXT NOT NULL,
            content TEXT NOT NULL,
            timestamp TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_session_messages_session
            ON session_messages(session_id, timestamp);

        CREATE TABLE IF NOT EXISTS profiles (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL DEFAULT '',
            preferences TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS favorites (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            poi_id TEXT NOT NULL REFERENCES pois(id),
            created_at TEXT NOT NULL,
            UNIQUE(user_id, poi_id)
        );",
    )?;

    Ok(())
}

pub(crate) fn parse_uuid(raw: &str) -> RepoResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| RepoError::InvalidId(raw.to_string()))
}

pub(crate) fn parse_timestamp(raw: &str) -> RepoResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| RepoError::InvalidTimestamp(raw.to_string()))
}

/// f32 embedding ↔ little-endian blob column.
pub(crate) fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub(crate) fn blob_to_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
