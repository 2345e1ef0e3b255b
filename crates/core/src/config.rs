// crates/core/src/config.rs
//! Monitor configuration: one backend origin, from which both the REST base
//! and the stream endpoint are derived.

use std::time::Duration;

use url::Url;

use crate::connection::DEFAULT_RECONNECT_DELAY;
use crate::error::ConfigError;

pub const DEFAULT_BACKEND: &str = "http://localhost:8000";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub const ENV_BACKEND: &str = "CROWDWATCH_BACKEND";
pub const ENV_STREAM_URL: &str = "CROWDWATCH_STREAM_URL";
pub const ENV_RECONNECT_SECS: &str = "CROWDWATCH_RECONNECT_SECS";
pub const ENV_POLL_SECS: &str = "CROWDWATCH_POLL_SECS";
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "CROWDWATCH_REQUEST_TIMEOUT_SECS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    pub backend: Url,
    pub stream_url: Url,
    pub reconnect_delay: Duration,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
}

impl MonitorConfig {
    /// Config for `origin` with every other setting at its default.
    pub fn for_backend(origin: &str) -> Result<Self, ConfigError> {
        let backend = parse_origin(origin)?;
        let stream_url = derive_stream_url(&backend)?;
        Ok(Self {
            backend,
            stream_url,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            poll_interval: DEFAULT_POLL_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    /// Read `CROWDWATCH_*` from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let origin = lookup(ENV_BACKEND)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BACKEND.to_string());
        let mut config = Self::for_backend(origin.trim())?;

        if let Some(raw) = lookup(ENV_STREAM_URL).filter(|v| !v.trim().is_empty()) {
            config.stream_url = parse_stream_url(raw.trim())?;
        }
        if let Some(d) = seconds(&lookup, ENV_RECONNECT_SECS)? {
            config.reconnect_delay = d;
        }
        if let Some(d) = seconds(&lookup, ENV_POLL_SECS)? {
            config.poll_interval = d;
        }
        if let Some(d) = seconds(&lookup, ENV_REQUEST_TIMEOUT_SECS)? {
            config.request_timeout = d;
        }
        Ok(config)
    }

    /// Point at a different origin, re-deriving the stream endpoint.
    pub fn with_backend(mut self, origin: &str) -> Result<Self, ConfigError> {
        self.backend = parse_origin(origin)?;
        self.stream_url = derive_stream_url(&self.backend)?;
        Ok(self)
    }
}

fn parse_origin(origin: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(origin).map_err(|source| ConfigError::InvalidOrigin {
        value: origin.to_string(),
        source,
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::UnsupportedScheme {
            scheme: other.to_string(),
        }),
    }
}

fn parse_stream_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|source| ConfigError::InvalidStreamUrl {
        value: raw.to_string(),
        source,
    })?;
    match url.scheme() {
        "ws" | "wss" => Ok(url),
        other => Err(ConfigError::UnsupportedScheme {
            scheme: other.to_string(),
        }),
    }
}

/// `http://host:port/...` → `ws://host:port/ws`, `https` → `wss`.
pub fn derive_stream_url(origin: &Url) -> Result<Url, ConfigError> {
    let scheme = match origin.scheme() {
        "http" => "ws",
        "https" => "wss",
        other => {
            return Err(ConfigError::UnsupportedScheme {
                scheme: other.to_string(),
            })
        }
    };
    let host = origin.host_str().unwrap_or("localhost");
    let raw = match origin.port() {
        Some(port) => format!("{scheme}://{host}:{port}/ws"),
        None => format!("{scheme}://{host}/ws"),
    };
    Url::parse(&raw).map_err(|source| ConfigError::InvalidStreamUrl { value: raw, source })
}

fn seconds<F>(lookup: &F, var: &'static str) -> Result<Option<Duration>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(var) else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse::<f64>()
        .ok()
        .filter(|secs| *secs > 0.0)
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .map(Some)
        .ok_or(ConfigError::InvalidSeconds { var, value: raw })
}
