use anyhow::{anyhow, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use std::net::SocketAddr;
use std::str::FromStr;
use url::Url;

/// Uncompressed P-256 point: 0x04 || X || Y.
const VAPID_PUBLIC_KEY_LEN: usize = 65;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreMode {
    Postgres,
    Memory,
}

impl FromStr for StoreMode {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "postgres" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            other => Err(anyhow!("unknown store mode: {}", other)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub http_addr: String,
    pub store_mode: StoreMode,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub db_connect_timeout_seconds: u64,
    pub db_idle_timeout_seconds: u64,
    pub db_max_lifetime_seconds: u64,
    pub admin_token: Option<String>,
    pub agent_scope_url: Url,
    pub agent_activation_timeout_seconds: u64,
    pub vapid_public_key: Option<String>,
    pub history_window_days: u32,
    pub prompt_delay_ms: u64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let http_addr = env_or("HTTP_ADDR", "0.0.0.0:8080");
        let _parsed_http_addr = SocketAddr::from_str(&http_addr)
            .map_err(|err| anyhow!("invalid HTTP_ADDR: {}", err))?;

        let store_mode: StoreMode = env_or_parse("STORE_MODE", "postgres")?;
        let database_url = std::env::var("DATABASE_URL").ok();
        if store_mode == StoreMode::Postgres && database_url.is_none() {
            return Err(anyhow!("missing required env var: DATABASE_URL"));
        }

        let history_window_days: u32 = env_or_parse("HISTORY_WINDOW_DAYS", "30")?;
        if history_window_days == 0 {
            return Err(anyhow!("invalid HISTORY_WINDOW_DAYS: must be at least 1"));
        }

        let vapid_public_key = std::env::var("VAPID_PUBLIC_KEY").ok();
        if let Some(key) = vapid_public_key.as_deref() {
            validate_vapid_key(key)?;
        }

        Ok(Self {
            http_addr,
            store_mode,
            database_url,
            db_max_connections: env_or_parse("DB_MAX_CONNECTIONS", "25")?,
            db_connect_timeout_seconds: env_or_parse("DB_CONNECT_TIMEOUT_SECONDS", "5")?,
            db_idle_timeout_seconds: env_or_parse("DB_IDLE_TIMEOUT_SECONDS", "300")?,
            db_max_lifetime_seconds: env_or_parse("DB_MAX_LIFETIME_SECONDS", "1800")?,
            admin_token: std::env::var("ADMIN_TOKEN").ok(),
            agent_scope_url: env_or_parse(
                "AGENT_SCOPE_URL",
                "https://localhost/firebase-messaging-sw.js",
            )?,
            agent_activation_timeout_seconds: env_or_parse(
                "AGENT_ACTIVATION_TIMEOUT_SECONDS",
                "15",
            )?,
            vapid_public_key,
            history_window_days,
            prompt_delay_ms: env_or_parse("PROMPT_DELAY_MS", "2000")?,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_or_parse<T>(key: &str, default: &str) -> Result<T>
where
    T: FromStr,
    <T as FromStr>::Err: std::fmt::Display,
{
    let value = std::env::var(key).unwrap_or_else(|_| default.to_string());
    value
        .parse::<T>()
        .map_err(|err| anyhow!("invalid {}: {}", key, err))
}

pub fn validate_vapid_key(value: &str) -> Result<()> {
    let decoded = URL_SAFE_NO_PAD
        .decode(value.trim_end_matches('=').as_bytes())
        .map_err(|err| anyhow!("invalid VAPID_PUBLIC_KEY: {}", err))?;
    if decoded.len() != VAPID_PUBLIC_KEY_LEN {
        return Err(anyhow!(
            "invalid VAPID_PUBLIC_KEY: expected {} bytes",
            VAPID_PUBLIC_KEY_LEN
        ));
    }
    Ok(())
}
