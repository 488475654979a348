//! Client configuration and endpoint derivation.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use codescope_core::ConfigError;
use serde::{Deserialize, Serialize};
use url::Url;

/// Path of the realtime endpoint on the server.
pub const ENDPOINT_PATH: &str = "/ws";
/// Default reconnection ceiling.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;
/// Default backoff base in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;
/// Default heartbeat interval in milliseconds.
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 30_000;
/// Default outbound queue capacity.
pub const DEFAULT_OUTBOUND_BUFFER: usize = 256;

/// WebSocket endpoint derived from the hosting origin.
///
/// `https://host` maps to `wss://host/ws`, `http://host` to `ws://host/ws`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    url: Url,
}

impl Endpoint {
    /// Derive the endpoint from an origin such as `https://codescope.dev:8443`.
    ///
    /// Any path, query or fragment on the origin is discarded.
    pub fn from_origin(origin: &str) -> Result<Self, ConfigError> {
        let parsed = Url::parse(origin).map_err(|e| ConfigError::InvalidOrigin {
            origin: origin.to_string(),
            reason: e.to_string(),
        })?;

        let scheme = match parsed.scheme() {
            "https" | "wss" => "wss",
            "http" | "ws" => "ws",
            other => return Err(ConfigError::UnsupportedScheme(other.to_string())),
        };
        let host = parsed.host_str().ok_or_else(|| ConfigError::InvalidOrigin {
            origin: origin.to_string(),
            reason: "origin has no host".into(),
        })?;
        let authority = match parsed.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };

        let url = Url::parse(&format!("{scheme}://{authority}{ENDPOINT_PATH}")).map_err(|e| {
            ConfigError::InvalidOrigin {
                origin: origin.to_string(),
                reason: e.to_string(),
            }
        })?;
        Ok(Self { url })
    }

    /// Whether the endpoint uses TLS (`wss`).
    pub fn is_secure(&self) -> bool {
        self.url.scheme() == "wss"
    }

    /// The endpoint URL.
    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    /// The endpoint URL.
    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}

/// Configuration for the realtime client.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientConfig {
    /// Origin of the hosting application (default `"http://localhost:5000"`).
    pub origin: String,
    /// Reconnection ceiling (default 5).
    pub max_reconnect_attempts: u32,
    /// Backoff base in ms (default 1000).
    pub base_delay_ms: u64,
    /// Heartbeat interval in ms (default 30000).
    pub heartbeat_interval_ms: u64,
    /// Outbound queue capacity (default 256).
    pub outbound_buffer: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            origin: "http://localhost:5000".into(),
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
            outbound_buffer: DEFAULT_OUTBOUND_BUFFER,
        }
    }
}

impl ClientConfig {
    /// Defaults with the given origin.
    pub fn for_origin(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            ..Self::default()
        }
    }

    /// Load from a JSON file. Missing fields keep their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_json(&raw)
    }

    /// Parse from a JSON string. Missing fields keep their defaults.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(raw).map_err(ConfigError::Parse)
    }

    /// Derive the realtime endpoint from `origin`.
    pub fn endpoint(&self) -> Result<Endpoint, ConfigError> {
        Endpoint::from_origin(&self.origin)
    }

    /// Backoff base as a `Duration`.
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    /// Heartbeat interval as a `Duration`.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    #[must_use]
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    #[must_use]
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    #[must_use]
    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }
}
