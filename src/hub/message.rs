//! Message classification and enrichment.
//!
//! This module contains the pure part of the dispatch pipeline: decoding an
//! inbound frame into a tagged union keyed on its `type` discriminant, and
//! injecting the server-owned fields into chat messages. Side effects
//! (persistence, broadcast) live in the hub itself.

use serde::Serialize;
use serde_json::{Map, Value, json};

/// Participant colors, assigned by connection id modulo palette size.
pub const PALETTE: [&str; 8] = [
    "#3B82F6", "#EF4444", "#10B981", "#F59E0B", "#8B5CF6", "#EC4899", "#06B6D4", "#84CC16",
];

/// Color for the connection with the given id.
pub fn color_for(id: u64) -> &'static str {
    PALETTE[(id % PALETTE.len() as u64) as usize]
}

/// A decoded inbound frame, keyed on the required `type` discriminant.
///
/// `user_count` is server-synthesized only; a client-sent `user_count`
/// classifies as `Unknown` and is discarded like any other unrecognized type.
#[derive(Debug)]
pub enum InboundMessage {
    /// Chat text; gets `username`, `userColor` and `timestamp` injected.
    Chat(Map<String, Value>),
    /// Freehand drawing event; passed through re-serialized only.
    Draw(Map<String, Value>),
    /// Shape drawing event; passed through re-serialized only.
    Shape(Map<String, Value>),
    /// Missing, non-string, or unrecognized `type`; logged and discarded.
    Unknown(Option<String>),
}

/// Decode a raw text frame and classify it by its `type` field.
///
/// Returns `Err` only for malformed JSON; a structurally valid frame with an
/// unrecognized discriminant classifies as [`InboundMessage::Unknown`].
pub fn classify(raw: &str) -> Result<InboundMessage, serde_json::Error> {
    let value: Value = serde_json::from_str(raw)?;
    let Value::Object(fields) = value else {
        // Valid JSON but not an object: no discriminant to dispatch on.
        return Ok(InboundMessage::Unknown(None));
    };

    let kind = fields
        .get("type")
        .and_then(Value::as_str)
        .map(str::to_owned);
    match kind.as_deref() {
        Some("chat") => Ok(InboundMessage::Chat(fields)),
        Some("draw") => Ok(InboundMessage::Draw(fields)),
        Some("shape") => Ok(InboundMessage::Shape(fields)),
        _ => Ok(InboundMessage::Unknown(kind)),
    }
}

/// Inject the server-owned fields into a chat frame.
///
/// Client-supplied values for `username`, `userColor` and `timestamp` are
/// always overwritten: client-asserted identity, color and time are never
/// honored.
pub fn enrich_chat(
    fields: &mut Map<String, Value>,
    sender_id: u64,
    sender_color: &str,
    timestamp_millis: i64,
) {
    fields.insert("username".to_string(), json!(format!("User {sender_id}")));
    fields.insert("userColor".to_string(), json!(sender_color));
    fields.insert("timestamp".to_string(), json!(timestamp_millis));
}

#[derive(Serialize)]
struct UserCountFrame {
    r#type: &'static str,
    count: usize,
}

/// Serialize a server-synthesized `user_count` frame.
pub fn user_count_frame(count: usize) -> String {
    serde_json::to_string(&UserCountFrame {
        r#type: "user_count",
        count,
    })
    .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_chat_frame() {
        // given:
        let raw = r#"{"type":"chat","text":"hi"}"#;

        // when:
        let message = classify(raw).unwrap();

        // then:
        match message {
            InboundMessage::Chat(fields) => {
                assert_eq!(fields.get("text"), Some(&json!("hi")));
            }
            other => panic!("expected Chat, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_draw_and_shape_frames() {
        // given:
        let draw = classify(r#"{"type":"draw","x":1,"y":2}"#).unwrap();
        let shape = classify(r#"{"type":"shape","kind":"rect"}"#).unwrap();

        // then:
        assert!(matches!(draw, InboundMessage::Draw(_)));
        assert!(matches!(shape, InboundMessage::Shape(_)));
    }

    #[test]
    fn test_classify_unknown_type() {
        // given:
        let raw = r#"{"type":"ping"}"#;

        // when:
        let message = classify(raw).unwrap();

        // then:
        match message {
            InboundMessage::Unknown(kind) => assert_eq!(kind.as_deref(), Some("ping")),
            other => panic!("expected Unknown, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_missing_type() {
        // given:
        let raw = r#"{"text":"no discriminant"}"#;

        // when:
        let message = classify(raw).unwrap();

        // then:
        assert!(matches!(message, InboundMessage::Unknown(None)));
    }

    #[test]
    fn test_classify_rejects_client_sent_user_count() {
        // given: user_count is server-synthesized only
        let raw = r#"{"type":"user_count","count":9999}"#;

        // when:
        let message = classify(raw).unwrap();

        // then:
        match message {
            InboundMessage::Unknown(kind) => assert_eq!(kind.as_deref(), Some("user_count")),
            other => panic!("expected Unknown, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_non_object_json() {
        // given:
        let message = classify("[1,2,3]").unwrap();

        // then:
        assert!(matches!(message, InboundMessage::Unknown(None)));
    }

    #[test]
    fn test_classify_malformed_json_is_an_error() {
        // given:
        let result = classify("not json at all");

        // then:
        assert!(result.is_err());
    }

    #[test]
    fn test_enrich_chat_injects_server_fields() {
        // given:
        let mut fields = match classify(r#"{"type":"chat","text":"hi"}"#).unwrap() {
            InboundMessage::Chat(fields) => fields,
            other => panic!("expected Chat, got {other:?}"),
        };

        // when:
        enrich_chat(&mut fields, 3, color_for(3), 1700000000000);

        // then:
        assert_eq!(fields.get("username"), Some(&json!("User 3")));
        assert_eq!(fields.get("userColor"), Some(&json!(PALETTE[3])));
        assert_eq!(fields.get("timestamp"), Some(&json!(1700000000000i64)));
        assert_eq!(fields.get("text"), Some(&json!("hi")));
    }

    #[test]
    fn test_enrich_chat_overwrites_client_supplied_identity() {
        // given: a client asserting someone else's identity, color and time
        let raw = r##"{"type":"chat","text":"hi","username":"admin","userColor":"#000000","timestamp":1}"##;
        let mut fields = match classify(raw).unwrap() {
            InboundMessage::Chat(fields) => fields,
            other => panic!("expected Chat, got {other:?}"),
        };

        // when:
        enrich_chat(&mut fields, 1, color_for(1), 1700000000000);

        // then: every client-supplied value is replaced
        assert_eq!(fields.get("username"), Some(&json!("User 1")));
        assert_eq!(fields.get("userColor"), Some(&json!(PALETTE[1])));
        assert_eq!(fields.get("timestamp"), Some(&json!(1700000000000i64)));
    }

    #[test]
    fn test_color_for_wraps_around_palette() {
        // given: ids spanning more than one palette cycle
        for id in 1..=16u64 {
            // then:
            assert_eq!(color_for(id), PALETTE[(id % 8) as usize]);
        }
        assert_eq!(color_for(8), PALETTE[0]);
        assert_eq!(color_for(9), PALETTE[1]);
    }

    #[test]
    fn test_user_count_frame_shape() {
        // when:
        let frame = user_count_frame(3);

        // then:
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value.get("type"), Some(&json!("user_count")));
        assert_eq!(value.get("count"), Some(&json!(3)));
    }

    #[test]
    fn test_draw_fields_survive_reserialization() {
        // given:
        let raw = r##"{"type":"draw","points":[[0,1],[2,3]],"width":2.5,"color":"#123456"}"##;
        let fields = match classify(raw).unwrap() {
            InboundMessage::Draw(fields) => fields,
            other => panic!("expected Draw, got {other:?}"),
        };

        // when:
        let reserialized = serde_json::to_string(&Value::Object(fields)).unwrap();

        // then: field-for-field identical after the round trip
        let before: Value = serde_json::from_str(raw).unwrap();
        let after: Value = serde_json::from_str(&reserialized).unwrap();
        assert_eq!(before, after);
    }
}
