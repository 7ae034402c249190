//! Frame encoding: one JSON object per line (stdio) or per text message (WebSocket).

use serde_json::Value;

use crate::types::{ClientMessage, RequestId, ServerEnvelope, ServerError, ServerResult};

/// Decode one client frame.
///
/// The request id is recovered whenever the frame is a JSON object, even if
/// the rest of it is invalid, so error replies can still be matched.
pub fn parse_message(text: &str) -> (RequestId, ServerResult<ClientMessage>) {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return (
            RequestId::Null,
            Err(ServerError::InvalidMessage("empty message".to_string())),
        );
    }

    let value: Value = match serde_json::from_str(trimmed) {
        Ok(value) => value,
        Err(e) => {
            return (
                RequestId::Null,
                Err(ServerError::InvalidMessage(format!("malformed JSON: {e}"))),
            )
        }
    };

    let id = match value.as_object() {
        Some(object) => object
            .get("id")
            .cloned()
            .and_then(|id| serde_json::from_value(id).ok())
            .unwrap_or_default(),
        None => {
            return (
                RequestId::Null,
                Err(ServerError::InvalidMessage(
                    "expected a JSON object".to_string(),
                )),
            )
        }
    };

    let message =
        serde_json::from_value(value).map_err(|e| ServerError::InvalidMessage(e.to_string()));
    (id, message)
}

/// Serialize a frame without a trailing newline.
pub fn encode(envelope: &ServerEnvelope) -> ServerResult<String> {
    serde_json::to_string(envelope).map_err(ServerError::Json)
}

/// Serialize a frame as a JSON line (with trailing newline).
pub fn frame_message(envelope: &ServerEnvelope) -> ServerResult<String> {
    let mut json = encode(envelope)?;
    json.push('\n');
    Ok(json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_execute() {
        let (id, msg) = parse_message(r#"{"id": 3, "type": "execute", "pql": "count lease"}"#);
        assert_eq!(id, RequestId::Number(3));
        assert_eq!(
            msg.unwrap(),
            ClientMessage::Execute {
                pql: "count lease".into()
            }
        );
    }

    #[test]
    fn test_bad_frames_keep_id_when_possible() {
        let (id, msg) = parse_message(r#"{"id": "q1", "type": "explode"}"#);
        assert_eq!(id, RequestId::String("q1".into()));
        assert_eq!(msg.unwrap_err().code(), "invalid_message");

        let (id, msg) = parse_message("{not json");
        assert_eq!(id, RequestId::Null);
        assert!(msg.unwrap_err().to_string().contains("malformed JSON"));

        let (_, msg) = parse_message("[1, 2]");
        assert!(msg.is_err());

        let (_, msg) = parse_message("   ");
        assert!(msg.unwrap_err().to_string().contains("empty message"));
    }

    #[test]
    fn test_frame_is_one_line() {
        let framed = frame_message(&ServerEnvelope::pong(RequestId::Number(1))).unwrap();
        assert!(framed.ends_with('\n'));
        assert_eq!(framed.matches('\n').count(), 1);
    }
}
