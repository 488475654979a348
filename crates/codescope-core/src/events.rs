use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::errors::HandlerError;
use crate::ids::ProjectId;
use crate::message::Message;

/// Status of an analysis job as reported by `analysis_update`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    Pending,
    Running,
    Completed,
    Failed,
    /// Any status this client does not know about, or none at all.
    #[default]
    #[serde(other)]
    Other,
}

impl AnalysisStatus {
    /// Parse a wire status. Unknown values map to [`Other`](Self::Other).
    pub fn parse(status: &str) -> Self {
        match status {
            "pending" => Self::Pending,
            "running" => Self::Running,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            _ => Self::Other,
        }
    }
}

/// Typed view of the messages the update consumer reacts to.
///
/// Decoded from a [`Message`] on demand. Extra fields are ignored, and an
/// optional field holding the wrong JSON type reads as absent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RealtimeEvent {
    #[serde(rename = "connected")]
    Connected,

    #[serde(rename = "disconnected")]
    Disconnected,

    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        error: Option<serde_json::Value>,
    },

    #[serde(rename = "maxReconnectAttemptsReached")]
    MaxReconnectAttemptsReached,

    #[serde(rename = "analysis_update")]
    AnalysisUpdate {
        #[serde(default, deserialize_with = "lenient_status")]
        status: AnalysisStatus,
        #[serde(default, deserialize_with = "lenient_string")]
        error: Option<String>,
    },

    #[serde(rename = "project_update")]
    ProjectUpdate {
        #[serde(default, rename = "projectName", deserialize_with = "lenient_string")]
        project_name: Option<String>,
        #[serde(default, rename = "projectId", deserialize_with = "lenient_project_id")]
        project_id: Option<ProjectId>,
    },

    #[serde(rename = "search_update")]
    SearchUpdate,

    #[serde(rename = "knowledge_graph_update")]
    KnowledgeGraphUpdate {
        #[serde(rename = "projectId")]
        project_id: ProjectId,
    },
}

impl RealtimeEvent {
    /// Decode the typed event carried by `message`.
    ///
    /// Returns `Ok(None)` for message types that have no typed view
    /// (heartbeats, outbound kinds, unknown server kinds).
    pub fn from_message(message: &Message) -> Result<Option<Self>, HandlerError> {
        if !Self::is_consumed(message) {
            return Ok(None);
        }
        let value = serde_json::to_value(message).map_err(|e| payload_error(message, &e))?;
        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| payload_error(message, &e))
    }

    fn is_consumed(message: &Message) -> bool {
        use crate::message::MessageType as T;
        matches!(
            message.message_type(),
            T::Connected
                | T::Disconnected
                | T::Error
                | T::MaxReconnectAttemptsReached
                | T::AnalysisUpdate
                | T::ProjectUpdate
                | T::SearchUpdate
                | T::KnowledgeGraphUpdate
        )
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Error { .. } => "error",
            Self::MaxReconnectAttemptsReached => "maxReconnectAttemptsReached",
            Self::AnalysisUpdate { .. } => "analysis_update",
            Self::ProjectUpdate { .. } => "project_update",
            Self::SearchUpdate => "search_update",
            Self::KnowledgeGraphUpdate { .. } => "knowledge_graph_update",
        }
    }
}

/// A string field, or `None` for null and every non-string value.
fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::String(s) => Some(s),
        _ => None,
    })
}

fn lenient_status<'de, D: Deserializer<'de>>(d: D) -> Result<AnalysisStatus, D::Error> {
    Ok(lenient_string(d)?.map_or(AnalysisStatus::Other, |s| AnalysisStatus::parse(&s)))
}

fn lenient_project_id<'de, D: Deserializer<'de>>(d: D) -> Result<Option<ProjectId>, D::Error> {
    Ok(lenient_string(d)?.map(ProjectId::from_raw))
}

fn payload_error(message: &Message, err: &serde_json::Error) -> HandlerError {
    HandlerError::Payload {
        message_type: message.message_type().to_string(),
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageType;
    use assert_matches::assert_matches;

    fn decode(frame: &str) -> Result<Option<RealtimeEvent>, HandlerError> {
        RealtimeEvent::from_message(&Message::from_frame(frame).unwrap())
    }

    #[test]
    fn analysis_update_completed() {
        let event = decode(r#"{"type":"analysis_update","status":"completed","jobId":"j1"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(
            event,
            RealtimeEvent::AnalysisUpdate {
                status: AnalysisStatus::Completed,
                error: None,
            }
        );
    }

    #[test]
    fn analysis_update_failed_carries_error() {
        let event = decode(r#"{"type":"analysis_update","status":"failed","error":"parser crashed"}"#)
            .unwrap()
            .unwrap();
        assert_matches!(
            event,
            RealtimeEvent::AnalysisUpdate { status: AnalysisStatus::Failed, error: Some(e), .. } if e == "parser crashed"
        );
    }

    #[test]
    fn missing_status_is_other() {
        let event = decode(r#"{"type":"analysis_update","jobId":"j9"}"#).unwrap().unwrap();
        assert_matches!(event, RealtimeEvent::AnalysisUpdate { status: AnalysisStatus::Other, .. });
    }

    #[test]
    fn unknown_status_is_other() {
        let event = decode(r#"{"type":"analysis_update","status":"embedding"}"#).unwrap().unwrap();
        assert_matches!(event, RealtimeEvent::AnalysisUpdate { status: AnalysisStatus::Other, .. });
    }

    #[test]
    fn mistyped_analysis_fields_read_as_absent() {
        for (frame, expected) in [
            (r#"{"type":"analysis_update","status":null}"#, AnalysisStatus::Other),
            (r#"{"type":"analysis_update","status":3}"#, AnalysisStatus::Other),
            (r#"{"type":"analysis_update","status":{"phase":"parse"}}"#, AnalysisStatus::Other),
            (r#"{"type":"analysis_update","status":"pending","projectId":42}"#, AnalysisStatus::Pending),
        ] {
            let event = decode(frame).unwrap().unwrap();
            assert_eq!(
                event,
                RealtimeEvent::AnalysisUpdate {
                    status: expected,
                    error: None,
                },
                "{frame}"
            );
        }

        let event = decode(r#"{"type":"analysis_update","status":"failed","error":{"message":"oom"}}"#)
            .unwrap()
            .unwrap();
        assert_eq!(
            event,
            RealtimeEvent::AnalysisUpdate {
                status: AnalysisStatus::Failed,
                error: None,
            }
        );
    }

    #[test]
    fn mistyped_project_fields_read_as_absent() {
        let event = decode(r#"{"type":"project_update","projectName":7,"projectId":["p1"]}"#)
            .unwrap()
            .unwrap();
        assert_eq!(
            event,
            RealtimeEvent::ProjectUpdate {
                project_name: None,
                project_id: None,
            }
        );

        let event = decode(r#"{"type":"project_update","projectName":null,"projectId":"p7"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(
            event,
            RealtimeEvent::ProjectUpdate {
                project_name: None,
                project_id: Some(ProjectId::from_raw("p7")),
            }
        );
    }

    #[test]
    fn status_parse_covers_known_values() {
        assert_eq!(AnalysisStatus::parse("running"), AnalysisStatus::Running);
        assert_eq!(AnalysisStatus::parse("FAILED"), AnalysisStatus::Other);
    }

    #[test]
    fn knowledge_graph_update_requires_project_id() {
        let event = decode(r#"{"type":"knowledge_graph_update","projectId":"p1"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(
            event,
            RealtimeEvent::KnowledgeGraphUpdate {
                project_id: ProjectId::from_raw("p1"),
            }
        );

        let err = decode(r#"{"type":"knowledge_graph_update"}"#).unwrap_err();
        assert_matches!(err, HandlerError::Payload { message_type, .. } if message_type == "knowledge_graph_update");
    }

    #[test]
    fn lifecycle_messages_decode() {
        assert_eq!(
            RealtimeEvent::from_message(&Message::connected()).unwrap(),
            Some(RealtimeEvent::Connected)
        );
        assert_matches!(
            RealtimeEvent::from_message(&Message::error("reset")).unwrap(),
            Some(RealtimeEvent::Error { error: Some(_) })
        );
    }

    #[test]
    fn unconsumed_types_have_no_typed_view() {
        assert_eq!(RealtimeEvent::from_message(&Message::ping()).unwrap(), None);
        let other = Message::new(MessageType::from("index_rebuilt"));
        assert_eq!(RealtimeEvent::from_message(&other).unwrap(), None);
    }

    #[test]
    fn event_type_matches_wire_name() {
        let event = RealtimeEvent::SearchUpdate;
        assert_eq!(event.event_type(), MessageType::SearchUpdate.as_str());
    }
}
