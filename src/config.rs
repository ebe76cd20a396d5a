//! Environment-driven service configuration.
//!
//! Values are read once at startup (after `.env` is loaded). Only the upstream
//! API key is optional: without it the service still runs, but only the mock
//! and caller-supplied paths can be used.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_MODEL: &str = "deepseek/deepseek-chat";
const DEFAULT_DATABASE_PATH: &str = "db/app.db";
const DEFAULT_TIMEOUT_SECS: u64 = 120;
const DEFAULT_BODY_LIMIT: usize = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    /// Model used when a request does not name one.
    pub model: String,
    pub openrouter_api_key: Option<String>,
    pub upstream_timeout: Duration,
    pub database_path: PathBuf,
    pub body_limit_bytes: usize,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup. Blank values count as unset and
    /// unparseable numbers fall back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().trim_matches('"').trim_matches('\'').to_string())
                .filter(|v| !v.is_empty())
        };

        let host = get("BIND_HOST")
            .and_then(|v| v.parse::<IpAddr>().ok())
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        let port = get("PORT")
            .and_then(|v| v.parse::<u16>().ok())
            .unwrap_or(DEFAULT_PORT);

        let upstream_timeout = get("OPENROUTER_TIMEOUT_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS));

        let body_limit_bytes = get("BODY_LIMIT_BYTES")
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(DEFAULT_BODY_LIMIT);

        Self {
            bind_addr: SocketAddr::new(host, port),
            model: get("MODEL_ID").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            openrouter_api_key: get("OPENROUTER_API_KEY"),
            upstream_timeout,
            database_path: PathBuf::from(
                get("DATABASE_PATH").unwrap_or_else(|| DEFAULT_DATABASE_PATH.to_string()),
            ),
            body_limit_bytes,
        }
    }
}
