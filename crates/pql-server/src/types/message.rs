//! Wire frames exchanged with PQL clients.
//!
//! Every frame is a JSON object tagged by `type`. Client frames carry a
//! client-assigned `id`; server frames echo it so replies can be matched.

use serde::{Deserialize, Serialize};

use pql::{Row, Suggestion};

use crate::session::AccessMode;

/// Client-assigned request identifier: string, number, or null.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    String(String),
    Number(i64),
    #[default]
    Null,
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestId::String(s) => write!(f, "{s}"),
            RequestId::Number(n) => write!(f, "{n}"),
            RequestId::Null => write!(f, "null"),
        }
    }
}

/// Messages a client may send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Run exactly one statement.
    Execute { pql: String },
    /// Cancel the statement in flight, if any.
    Cancel {},
    /// Suggest completions at byte offset `cursor` (defaults to the end of `pql`).
    Autocomplete {
        pql: String,
        #[serde(default)]
        cursor: Option<usize>,
    },
    Ping {},
}

impl ClientMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Execute { .. } => "execute",
            ClientMessage::Cancel {} => "cancel",
            ClientMessage::Autocomplete { .. } => "autocomplete",
            ClientMessage::Ping {} => "ping",
        }
    }
}

/// Frames the server sends back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Meta {
        entity: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fields: Option<Vec<String>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        total: Option<u64>,
    },
    Rows {
        rows: Vec<Row>,
    },
    /// Terminal frame of a successful execution. `elapsed` is in milliseconds.
    Done {
        total: u64,
        elapsed: u64,
    },
    Error {
        code: String,
        message: String,
    },
    Completions {
        items: Vec<Suggestion>,
    },
    Session {
        session_id: String,
        mode: AccessMode,
    },
    Pong {},
}

impl ServerFrame {
    /// `done` and `error` end a reply sequence.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ServerFrame::Done { .. } | ServerFrame::Error { .. })
    }
}

/// A server frame addressed to a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerEnvelope {
    pub id: RequestId,
    #[serde(flatten)]
    pub frame: ServerFrame,
}

impl ServerEnvelope {
    pub fn new(id: RequestId, frame: ServerFrame) -> Self {
        Self { id, frame }
    }

    pub fn pong(id: RequestId) -> Self {
        Self::new(id, ServerFrame::Pong {})
    }

    /// The unsolicited frame announcing a session; it carries a null id.
    pub fn session(session_id: impl Into<String>, mode: AccessMode) -> Self {
        Self::new(
            RequestId::Null,
            ServerFrame::Session {
                session_id: session_id.into(),
                mode,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_message_tags() {
        let msg: ClientMessage =
            serde_json::from_value(json!({"type": "execute", "pql": "find lease"})).unwrap();
        assert_eq!(msg.kind(), "execute");

        let msg: ClientMessage =
            serde_json::from_value(json!({"type": "autocomplete", "pql": "fi"})).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Autocomplete {
                pql: "fi".into(),
                cursor: None
            }
        );

        let msg: ClientMessage = serde_json::from_value(json!({"type": "ping"})).unwrap();
        assert_eq!(msg, ClientMessage::Ping {});
    }

    #[test]
    fn test_server_frame_shape() {
        let env = ServerEnvelope::new(
            RequestId::Number(7),
            ServerFrame::Done {
                total: 3,
                elapsed: 12,
            },
        );
        let value = serde_json::to_value(&env).unwrap();
        assert_eq!(value, json!({"id": 7, "type": "done", "total": 3, "elapsed": 12}));

        let meta = ServerEnvelope::new(
            RequestId::String("a".into()),
            ServerFrame::Meta {
                entity: "lease".into(),
                fields: None,
                total: Some(1),
            },
        );
        let value = serde_json::to_value(&meta).unwrap();
        assert!(value.get("fields").is_none());
        assert_eq!(value["type"], "meta");
    }

    #[test]
    fn test_session_frame_has_null_id() {
        let value =
            serde_json::to_value(ServerEnvelope::session("s-1", AccessMode::ReadOnly)).unwrap();
        assert_eq!(value["id"], serde_json::Value::Null);
        assert_eq!(value["mode"], "read_only");
    }
}
