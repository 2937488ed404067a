use anyhow::{Context, Result, bail};
use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use strum_macros::{Display, EnumString};

/// Where request documents and settings live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Mysql,
}

#[derive(Clone)]
pub struct Config {
    pub server_addr: String,
    pub jwt_secret: String,
    pub app_id: String,
    pub access_token_ttl: usize,

    pub store_backend: StoreBackend,
    pub database_url: Option<String>,
    pub seed_file: Option<PathBuf>,
    pub store_poll_interval: Duration,

    /// Written to `decisionBy` on approve/reject.
    pub admin_name: String,
    pub session_idle: Duration,

    // Rate limiting
    pub rate_signin_per_min: u32,
    pub rate_protected_per_min: u32,

    pub api_prefix: String,
}

fn required(key: &str) -> Result<String> {
    let value = env::var(key).with_context(|| format!("{key} must be set"))?;
    if value.trim().is_empty() {
        bail!("{key} must not be empty");
    }
    Ok(value)
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} has an invalid value {raw:?}")),
        None => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let store_backend = parsed("STORE_BACKEND", StoreBackend::Memory)?;
        let database_url = optional("DATABASE_URL");
        if store_backend == StoreBackend::Mysql && database_url.is_none() {
            bail!("DATABASE_URL must be set when STORE_BACKEND=mysql");
        }

        Ok(Self {
            server_addr: required("SERVER_ADDR")?,
            jwt_secret: required("JWT_SECRET")?,
            app_id: required("APP_ID")?,
            access_token_ttl: parsed("ACCESS_TOKEN_TTL", 43_200)?, // 12h

            store_backend,
            database_url,
            seed_file: optional("SEED_FILE").map(PathBuf::from),
            store_poll_interval: Duration::from_millis(parsed("STORE_POLL_INTERVAL_MS", 2_000)?),

            admin_name: optional("ADMIN_NAME").unwrap_or_else(|| "Admin".to_string()),
            session_idle: Duration::from_secs(parsed("SESSION_IDLE_SECS", 3_600)?),

            rate_signin_per_min: parsed("RATE_SIGNIN_PER_MIN", 30)?,
            rate_protected_per_min: parsed("RATE_PROTECTED_PER_MIN", 1_000)?,

            api_prefix: optional("API_PREFIX").unwrap_or_else(|| "/api".to_string()),
        })
    }
}

#[cfg(test)]
impl Config {
    /// In-memory configuration for handler tests.
    pub fn for_tests() -> Self {
        Self {
            server_addr: "127.0.0.1:0".into(),
            jwt_secret: "test-secret".into(),
            app_id: "test".into(),
            access_token_ttl: 600,
            store_backend: StoreBackend::Memory,
            database_url: None,
            seed_file: None,
            store_poll_interval: Duration::from_millis(50),
            admin_name: "Admin Daro".into(),
            session_idle: Duration::from_secs(60),
            rate_signin_per_min: 1_000,
            rate_protected_per_min: 10_000,
            api_prefix: "/api".into(),
        }
    }
}
