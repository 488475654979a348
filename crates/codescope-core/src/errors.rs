/// A frame that could not be turned into a message (or a message that could
/// not be encoded). Malformed inbound frames are dropped, never dispatched.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid JSON: {0}")]
    Json(#[source] serde_json::Error),
    #[error("frame is not a JSON object")]
    NotAnObject,
    #[error("frame has no `type` field")]
    MissingType,
    #[error("frame `type` is not a string")]
    InvalidType,
    #[error("binary frame is not valid UTF-8")]
    NotUtf8,
}

/// Typed error hierarchy for the socket layer.
/// Every variant is recoverable through reconnection.
#[derive(Clone, Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connect to {url} failed: {reason}")]
    Connect { url: String, reason: String },
    #[error("send failed: {0}")]
    Send(String),
    #[error("receive failed: {0}")]
    Receive(String),
    #[error("connection closed")]
    Closed,
}

impl TransportError {
    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "connect",
            Self::Send(_) => "send",
            Self::Receive(_) => "receive",
            Self::Closed => "closed",
        }
    }
}

/// Failure reported by a subscriber. Logged by the registry and otherwise
/// isolated from the remaining handlers.
#[derive(Clone, Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("unexpected `{message_type}` payload: {reason}")]
    Payload { message_type: String, reason: String },
    #[error("{0}")]
    Failed(String),
}

impl HandlerError {
    /// Convenience for ad-hoc handler failures.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed(reason.into())
    }
}

/// Invalid client configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid origin `{origin}`: {reason}")]
    InvalidOrigin { origin: String, reason: String },
    #[error("unsupported origin scheme `{0}` (expected http, https, ws or wss)")]
    UnsupportedScheme(String),
    #[error("failed to read config {path}: {reason}")]
    Read { path: String, reason: String },
    #[error("invalid config: {0}")]
    Parse(#[source] serde_json::Error),
}
