//! The wire message model.
//!
//! Every frame exchanged with the server is a JSON object carrying a string
//! `type` discriminator plus an open set of named fields. [`Message`] keeps the
//! discriminator typed as [`MessageType`] and the remaining fields untouched,
//! so unknown server message kinds still flow through dispatch.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::FrameError;
use crate::ids::ProjectId;

/// Discriminator of a [`Message`].
///
/// Known kinds get their own variant; anything else is carried verbatim in
/// [`MessageType::Other`]. Build values through `From<&str>` so known names
/// always map to their dedicated variant.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageType {
    /// Synthetic: the transport opened.
    Connected,
    /// Synthetic: the transport closed.
    Disconnected,
    /// Synthetic: the transport reported an error.
    Error,
    /// Synthetic: reconnection gave up.
    MaxReconnectAttemptsReached,
    /// Analysis job progress.
    AnalysisUpdate,
    /// A project was created or changed.
    ProjectUpdate,
    /// Search results went stale.
    SearchUpdate,
    /// A project's knowledge graph changed.
    KnowledgeGraphUpdate,
    /// Outbound: follow updates for one project.
    SubscribeProject,
    /// Outbound heartbeat.
    Ping,
    /// Heartbeat reply.
    Pong,
    /// Any kind this client has no dedicated variant for.
    Other(String),
}

impl MessageType {
    /// The on-the-wire name.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Error => "error",
            Self::MaxReconnectAttemptsReached => "maxReconnectAttemptsReached",
            Self::AnalysisUpdate => "analysis_update",
            Self::ProjectUpdate => "project_update",
            Self::SearchUpdate => "search_update",
            Self::KnowledgeGraphUpdate => "knowledge_graph_update",
            Self::SubscribeProject => "subscribe_project",
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::Other(name) => name,
        }
    }

    /// Whether this kind is produced locally by the client rather than the server.
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            Self::Connected | Self::Disconnected | Self::Error | Self::MaxReconnectAttemptsReached
        )
    }
}

impl From<&str> for MessageType {
    fn from(name: &str) -> Self {
        match name {
            "connected" => Self::Connected,
            "disconnected" => Self::Disconnected,
            "error" => Self::Error,
            "maxReconnectAttemptsReached" => Self::MaxReconnectAttemptsReached,
            "analysis_update" => Self::AnalysisUpdate,
            "project_update" => Self::ProjectUpdate,
            "search_update" => Self::SearchUpdate,
            "knowledge_graph_update" => Self::KnowledgeGraphUpdate,
            "subscribe_project" => Self::SubscribeProject,
            "ping" => Self::Ping,
            "pong" => Self::Pong,
            other => Self::Other(other.to_owned()),
        }
    }
}

impl From<String> for MessageType {
    fn from(name: String) -> Self {
        Self::from(name.as_str())
    }
}

impl From<MessageType> for String {
    fn from(ty: MessageType) -> Self {
        match ty {
            MessageType::Other(name) => name,
            known => known.as_str().to_owned(),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subscription target in the dispatch registry.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Messages of exactly this type.
    Type(MessageType),
    /// Every message, delivered after the type-specific handlers.
    Any,
}

impl From<MessageType> for Topic {
    fn from(ty: MessageType) -> Self {
        Self::Type(ty)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Type(ty) => f.write_str(ty.as_str()),
            Self::Any => f.write_str("*"),
        }
    }
}

/// One realtime message: a `type` tag plus arbitrary extra fields.
///
/// Messages are built once (by the decoder or a constructor below) and only
/// read afterwards; there are no mutating accessors.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    message_type: MessageType,
    #[serde(flatten)]
    fields: Map<String, Value>,
}

impl Message {
    /// A message with no fields besides its type.
    pub fn new(message_type: impl Into<MessageType>) -> Self {
        Self {
            message_type: message_type.into(),
            fields: Map::new(),
        }
    }

    /// Builder-style field insertion. A `type` key is ignored.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        if key != "type" {
            let _ = self.fields.insert(key, value.into());
        }
        self
    }

    /// Synthetic lifecycle message emitted when the transport opens.
    pub fn connected() -> Self {
        Self::new(MessageType::Connected)
    }

    /// Synthetic lifecycle message emitted when the transport closes.
    pub fn disconnected() -> Self {
        Self::new(MessageType::Disconnected)
    }

    /// Synthetic lifecycle message carrying a transport error detail.
    pub fn error(detail: impl Into<String>) -> Self {
        Self::new(MessageType::Error).with_field("error", detail.into())
    }

    /// Synthetic lifecycle message emitted once when reconnection gives up.
    pub fn max_reconnect_attempts_reached() -> Self {
        Self::new(MessageType::MaxReconnectAttemptsReached)
    }

    /// Outbound request to follow updates for a project.
    pub fn subscribe_project(project_id: &ProjectId) -> Self {
        Self::new(MessageType::SubscribeProject).with_field("projectId", project_id.as_str())
    }

    /// Outbound heartbeat.
    pub fn ping() -> Self {
        Self::new(MessageType::Ping)
    }

    /// The `type` discriminator.
    pub fn message_type(&self) -> &MessageType {
        &self.message_type
    }

    /// All fields other than `type`.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// A single field.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// A field, if present and a string.
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// Decode one text frame.
    ///
    /// Fails when the frame is not a JSON object or has no string `type`.
    pub fn from_frame(text: &str) -> Result<Self, FrameError> {
        let value: Value = serde_json::from_str(text).map_err(FrameError::Json)?;
        match value.get("type") {
            Some(Value::String(_)) => {}
            Some(_) => return Err(FrameError::InvalidType),
            None if value.is_object() => return Err(FrameError::MissingType),
            None => return Err(FrameError::NotAnObject),
        }
        serde_json::from_value(value).map_err(FrameError::Json)
    }

    /// Encode as one text frame.
    pub fn to_frame(&self) -> Result<String, FrameError> {
        serde_json::to_string(self).map_err(FrameError::Json)
    }
}
