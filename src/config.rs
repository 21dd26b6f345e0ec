use std::env;
use std::path::PathBuf;

use thiserror::Error;

const DEFAULT_DATABASE_NAME: &str = "catalog";
const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:8080";
const DEFAULT_STORAGE_DIR: &str = "storage";
const DEFAULT_PUBLIC_STORAGE_URL: &str = "/storage";
const DEFAULT_TOKEN_TTL_MINUTES: i64 = 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} has an invalid value `{value}`")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    /// MongoDB at the given connection string.
    Mongo(String),
    Memory,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub backend: StoreBackend,
    pub database_name: String,
    pub jwt_secret: String,
    pub token_ttl_minutes: i64,
    pub bind_address: String,
    pub storage_dir: PathBuf,
    pub public_storage_url: String,
}

impl Settings {
    /// Reads the process environment. Call `dotenv::dotenv()` first to pick
    /// up a `.env` file.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let backend = match lookup("STORE_BACKEND").as_deref() {
            None | Some("mongo") => StoreBackend::Mongo(
                lookup("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?,
            ),
            Some("memory") => StoreBackend::Memory,
            Some(other) => {
                return Err(ConfigError::Invalid { name: "STORE_BACKEND", value: other.to_string() })
            }
        };

        let token_ttl_minutes = match lookup("TOKEN_TTL_MINUTES") {
            Some(value) => match value.parse::<i64>() {
                Ok(minutes) if minutes > 0 => minutes,
                _ => return Err(ConfigError::Invalid { name: "TOKEN_TTL_MINUTES", value }),
            },
            None => DEFAULT_TOKEN_TTL_MINUTES,
        };

        Ok(Settings {
            backend,
            database_name: lookup("DATABASE_NAME").unwrap_or_else(|| DEFAULT_DATABASE_NAME.into()),
            jwt_secret: lookup("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?,
            token_ttl_minutes,
            bind_address: lookup("BIND_ADDRESS").unwrap_or_else(|| DEFAULT_BIND_ADDRESS.into()),
            storage_dir: lookup("STORAGE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STORAGE_DIR)),
            public_storage_url: lookup("PUBLIC_STORAGE_URL")
                .unwrap_or_else(|| DEFAULT_PUBLIC_STORAGE_URL.into()),
        })
    }
}
