//! Environment configuration.
//!
//! Every tunable named in the external contract (similarity threshold,
//! request deadline, event-channel sizing, cache TTLs, cost table) lives
//! here; nothing is hard-coded at call sites.

pub mod error;


pub use error::ConfigError;

use std::collections::HashMap;
use std::env;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// Per-model USD-per-token rates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelRates {
    /// USD per input token.
    pub input: f64,
    /// USD per output token.
    pub output: f64,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,

    pub bind_addr: IpAddr,

    /// SQLite database file, created on first open.
    pub database_path: String,

    /// Generative backend base URL.
    pub provider_base_url: String,

    /// Generative backend API key. Empty is allowed only with the `mock`
    /// provider.
    pub provider_api_key: String,

    /// Generation model name.
    pub model_name: String,

    /// Embedding model name.
    pub embed_model_name: String,

    /// Minimum cosine similarity for a semantic-cache hit.
    pub semantic_threshold: f32,

    /// Overall per-request deadline, seconds.
    pub request_deadline_secs: u64,

    /// Per-send timeout on the event channel, milliseconds.
    pub event_send_timeout_ms: u64,

    /// Retries before an event is routed to the dead-letter queue.
    pub event_send_retries: u32,

    /// Event channel buffer size.
    pub event_channel_capacity: usize,

    /// Exact stage cache TTL, seconds.
    pub stage_cache_ttl_secs: u64,

    /// Complete-response cache TTL, seconds.
    pub response_cache_ttl_secs: u64,

    /// Vector cache TTL, seconds.
    pub vector_cache_ttl_secs: u64,

    /// USD-per-token rates keyed by model name.
    pub cost_table: HashMap<String, ModelRates>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            bind_addr: IpAddr::V4(std::net::Ipv4Addr::new(127, 0, 0, 1)),
            database_path: "./wayfarer.db".to_string(),
            provider_base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            provider_api_key: String::new(),
            model_name: "gemini-2.0-flash".to_string(),
            embed_model_name: "text-embedding-004".to_string(),
            semantic_threshold: 0.95,
            request_deadline_secs: 120,
            event_send_timeout_ms: 2_000,
            event_send_retries: 3,
            event_channel_capacity: 200,
            stage_cache_ttl_secs: 300,
            response_cache_ttl_secs: 1_800,
            vector_cache_ttl_secs: 1_800,
            cost_table: Self::default_cost_table(),
        }
    }
}

impl Config {
    const ENV_PORT: &'static str = "WAYFARER_PORT";
    const ENV_BIND_ADDR: &'static str = "WAYFARER_BIND_ADDR";
    const ENV_DATABASE_PATH: &'static str = "WAYFARER_DATABASE_PATH";
    const ENV_PROVIDER_BASE_URL: &'static str = "WAYFARER_PROVIDER_BASE_URL";
    const ENV_PROVIDER_API_KEY: &'static str = "WAYFARER_PROVIDER_API_KEY";
    const ENV_MODEL_NAME: &'static str = "WAYFARER_MODEL_NAME";
    const ENV_EMBED_MODEL_NAME: &'static str = "WAYFARER_EMBED_MODEL_NAME";
    const ENV_SEMANTIC_THRESHOLD: &'static str = "WAYFARER_SEMANTIC_THRESHOLD";
    const ENV_REQUEST_DEADLINE_SECS: &'static str = "WAYFARER_REQUEST_DEADLINE_SECS";
    const ENV_EVENT_SEND_TIMEOUT_MS: &'static str = "WAYFARER_EVENT_SEND_TIMEOUT_MS";
    const ENV_EVENT_SEND_RETRIES: &'static str = "WAYFARER_EVENT_SEND_RETRIES";
    const ENV_EVENT_CHANNEL_CAPACITY: &'static str = "WAYFARER_EVENT_CHANNEL_CAPACITY";
    const ENV_STAGE_CACHE_TTL_SECS: &'static str = "WAYFARER_STAGE_CACHE_TTL_SECS";
    const ENV_RESPONSE_CACHE_TTL_SECS: &'static str = "WAYFARER_RESPONSE_CACHE_TTL_SECS";
    const ENV_VECTOR_CACHE_TTL_SECS: &'static str = "WAYFARER_VECTOR_CACHE_TTL_SECS";
    const ENV_COST_TABLE: &'static str = "WAYFARER_COST_TABLE";

    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let port = Self::parse_port_from_env(defaults.port)?;
        let bind_addr = Self::parse_bind_addr_from_env(defaults.bind_addr)?;
        let database_path =
            Self::parse_string_from_env(Self::ENV_DATABASE_PATH, defaults.database_path);
        let provider_base_url =
            Self::parse_string_from_env(Self::ENV_PROVIDER_BASE_URL, defaults.provider_base_url);
        let provider_api_key =
            Self::parse_string_from_env(Self::ENV_PROVIDER_API_KEY, defaults.provider_api_key);
        let model_name = Self::parse_string_from_env(Self::ENV_MODEL_NAME, defaults.model_name);
        let embed_model_name =
            Self::parse_string_from_env(Self::ENV_EMBED_MODEL_NAME, defaults.embed_model_name);

        let semantic_threshold = Self::parse_f32_from_env(
            Self::ENV_SEMANTIC_THRESHOLD,
            defaults.semantic_threshold,
        )?;
        let request_deadline_secs = Self::parse_u64_from_env(
            Self::ENV_REQUEST_DEADLINE_SECS,
            defaults.request_deadline_secs,
        )?;
        let event_send_timeout_ms = Self::parse_u64_from_env(
            Self::ENV_EVENT_SEND_TIMEOUT_MS,
            defaults.event_send_timeout_ms,
        )?;
        let event_send_retries = Self::parse_u64_from_env(
            Self::ENV_EVENT_SEND_RETRIES,
            defaults.event_send_retries as u64,
        )? as u32;
        let event_channel_capacity = Self::parse_u64_from_env(
            Self::ENV_EVENT_CHANNEL_CAPACITY,
            defaults.event_channel_capacity as u64,
        )? as usize;
        let stage_cache_ttl_secs = Self::parse_u64_from_env(
            Self::ENV_STAGE_CACHE_TTL_SECS,
            defaults.stage_cache_ttl_secs,
        )?;
        let response_cache_ttl_secs = Self::parse_u64_from_env(
            Self::ENV_RESPONSE_CACHE_TTL_SECS,
            defaults.response_cache_ttl_secs,
        )?;
        let vector_cache_ttl_secs = Self::parse_u64_from_env(
            Self::ENV_VECTOR_CACHE_TTL_SECS,
            defaults.vector_cache_ttl_secs,
        )?;

        let cost_table = Self::parse_cost_table_from_env(defaults.cost_table)?;

        Ok(Self {
            port,
            bind_addr,
            database_path,
            provider_base_url,
            provider_api_key,
            model_name,
            embed_model_name,
            semantic_threshold,
            request_deadline_secs,
            event_send_timeout_ms,
            event_send_retries,
            event_channel_capacity,
            stage_cache_ttl_secs,
            response_cache_ttl_secs,
            vector_cache_ttl_secs,
            cost_table,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.semantic_threshold) {
            return Err(ConfigError::InvalidThreshold {
                value: self.semantic_threshold,
            });
        }

        Ok(())
    }

    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }

    /// Built-in USD-per-token rates. Override wholesale with
    /// `WAYFARER_COST_TABLE` (JSON object `{model: {input, output}}`).
    pub fn default_cost_table() -> HashMap<String, ModelRates> {
        HashMap::from([
            (
                "gemini-2.0-flash".to_string(),
                ModelRates {
                    input: 0.10 / 1e6,
                    output: 0.40 / 1e6,
                },
            ),
            (
                "gemini-2.0-flash-lite".to_string(),
                ModelRates {
                    input: 0.075 / 1e6,
                    output: 0.30 / 1e6,
                },
            ),
            (
                "gemini-1.5-pro".to_string(),
                ModelRates {
                    input: 1.25 / 1e6,
                    output: 5.00 / 1e6,
                },
            ),
        ])
    }

    fn parse_port_from_env(default: u16) -> Result<u16, ConfigError> {
        match env::var(Self::ENV_PORT) {
            Ok(value) => {
                let port: u16 = value.parse().map_err(|e| ConfigError::PortParseError {
                    value: value.clone(),
                    source: e,
                })?;

                if port == 0 {
                    return Err(ConfigError::InvalidPort { value });
                }

                Ok(port)
            }
            Err(_) => Ok(default),
        }
    }

    fn parse_bind_addr_from_env(default: IpAddr) -> Result<IpAddr, ConfigError> {
        match env::var(Self::ENV_BIND_ADDR) {
            Ok(value) => value
                .parse()
                .map_err(|e| ConfigError::InvalidBindAddr { value, source: e }),
            Err(_) => Ok(default),
        }
    }

    fn parse_string_from_env(var_name: &str, default: String) -> String {
        env::var(var_name)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or(default)
    }

    fn parse_u64_from_env(var_name: &'static str, default: u64) -> Result<u64, ConfigError> {
        match env::var(var_name) {
            Ok(value) => value.parse().map_err(|_| ConfigError::InvalidNumber {
                name: var_name,
                value,
            }),
            Err(_) => Ok(default),
        }
    }

    fn parse_f32_from_env(var_name: &'static str, default: f32) -> Result<f32, ConfigError> {
        match env::var(var_name) {
            Ok(value) => value.parse().map_err(|_| ConfigError::InvalidNumber {
                name: var_name,
                value,
            }),
            Err(_) => Ok(default),
        }
    }

    fn parse_cost_table_from_env(
        default: HashMap<String, ModelRates>,
    ) -> Result<HashMap<String, ModelRates>, ConfigError> {
        match env::var(Self::ENV_COST_TABLE) {
            Ok(value) => serde_json::from_str(&value)
                .map_err(|e| ConfigError::InvalidCostTable { source: e }),
            Err(_) => Ok(default),
        }
    }
}
