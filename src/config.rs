use anyhow::{Context, anyhow};
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;
use tracing::Level;

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub server_addr: String,
    pub api_prefix: String,

    // Rate limiting
    pub rate_protected_per_min: u32,

    pub db_max_connections: u32,

    // Logging
    pub log_dir: String,
    pub log_level: Level,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup, applying defaults for optional keys.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| lookup(key).ok_or_else(|| anyhow!("{key} must be set"));
        let or_default = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            jwt_secret: required("JWT_SECRET")?,
            server_addr: or_default("SERVER_ADDR", "127.0.0.1:8080"),
            api_prefix: or_default("API_PREFIX", "/api"),
            rate_protected_per_min: parse(
                "RATE_PROTECTED_PER_MIN",
                &or_default("RATE_PROTECTED_PER_MIN", "1000"),
            )?,
            db_max_connections: parse(
                "DB_MAX_CONNECTIONS",
                &or_default("DB_MAX_CONNECTIONS", "10"),
            )?,
            log_dir: or_default("LOG_DIR", "logs"),
            log_level: parse("LOG_LEVEL", &or_default("LOG_LEVEL", "debug"))?,
        })
    }
}

fn parse<T>(key: &str, raw: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse()
        .with_context(|| format!("{key} has an invalid value: {raw}"))
}
