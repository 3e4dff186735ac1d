//! WebSocket Message Types
//!
//! Outbound frames are `{"event": <tag>, "data": {...}}`. The data object is
//! the event payload with its `occurs_at` timestamp added. Inbound frames are
//! decoded by [`ActionMessage::parse`](crate::application::dto::ActionMessage::parse).

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::domain::events::{Event, EventKind};

/// Wire tag per event kind.
const EVENT_TAGS: &[(EventKind, &str)] = &[
    (EventKind::UserCreated, "user_created"),
    (EventKind::UserAddedFriend, "user_added_friend"),
    (EventKind::RoomCreated, "room_created"),
    (EventKind::RoomDeleted, "room_deleted"),
    (EventKind::RoomAddedMember, "room_added_member"),
    (EventKind::RoomRemovedMember, "room_removed_member"),
    (EventKind::RoomMessagesReadByUser, "room_messages_read"),
    (EventKind::MessageCreated, "message_created"),
    (EventKind::MessageReadByUser, "message_read"),
    (EventKind::ActiveClientActivated, "user_connected"),
    (EventKind::ActiveClientInactivated, "user_disconnected"),
    (EventKind::TypingStarted, "type_start"),
    (EventKind::TypingEnded, "type_end"),
    (EventKind::ErrorRaised, "error"),
];

/// Tag sent for kinds missing from the table.
pub const UNKNOWN_EVENT_TAG: &str = "unknown";

/// Wire tag of an event kind.
pub fn event_tag(kind: EventKind) -> &'static str {
    EVENT_TAGS
        .iter()
        .find(|(k, _)| *k == kind)
        .map(|(_, tag)| *tag)
        .unwrap_or(UNKNOWN_EVENT_TAG)
}

/// Outgoing frame
#[derive(Debug, Serialize)]
struct OutboundFrame<'a> {
    event: &'a str,
    data: Value,
}

/// A serialized outbound frame, shared between every connection it is sent to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedEvent(Arc<str>);

impl EncodedEvent {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EncodedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Encode an event into its wire frame.
pub fn encode_event(event: &Event) -> Result<EncodedEvent, serde_json::Error> {
    let mut data = serde_json::to_value(event.payload())?;
    if let Value::Object(map) = &mut data {
        map.insert(
            "occurs_at".to_string(),
            serde_json::to_value(event.occurs_at())?,
        );
    }

    let frame = OutboundFrame {
        event: event_tag(event.kind()),
        data,
    };
    Ok(EncodedEvent(serde_json::to_string(&frame)?.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::{ActiveClientActivated, ErrorRaised, MessageCreated};
    use chrono::Utc;
    use std::collections::HashSet;
    use test_case::test_case;

    fn decode(encoded: &EncodedEvent) -> Value {
        serde_json::from_str(encoded.as_str()).unwrap()
    }

    #[test]
    fn test_encode_message_created() {
        let event = Event::new(MessageCreated {
            message_id: 7,
            room_id: 3,
            user_id: 1,
            content: "hi".into(),
            created_at: Utc::now(),
        });
        let frame = decode(&encode_event(&event).unwrap());

        assert_eq!(frame["event"], "message_created");
        assert_eq!(frame["data"]["message_id"], 7);
        assert_eq!(frame["data"]["room_id"], 3);
        assert_eq!(frame["data"]["content"], "hi");
        assert!(frame["data"]["occurs_at"].is_string());
    }

    #[test]
    fn test_encode_error_with_cause() {
        let event = Event::new(ErrorRaised {
            error: "Unknown action: dance".into(),
            cause: Some(serde_json::json!({"action": "dance"})),
        });
        let frame = decode(&encode_event(&event).unwrap());

        assert_eq!(frame["event"], "error");
        assert_eq!(frame["data"]["error"], "Unknown action: dance");
        assert_eq!(frame["data"]["cause"]["action"], "dance");
        assert!(frame["data"].get("message").is_none());
    }

    #[test]
    fn test_presence_tag() {
        let event = Event::new(ActiveClientActivated {
            user_id: 2,
            user_name: "bob".into(),
        });
        let frame = decode(&encode_event(&event).unwrap());
        assert_eq!(frame["event"], "user_connected");
        assert_eq!(frame["data"]["user_id"], 2);
    }

    #[test_case(EventKind::ActiveClientInactivated, "user_disconnected")]
    #[test_case(EventKind::RoomMessagesReadByUser, "room_messages_read")]
    #[test_case(EventKind::TypingEnded, "type_end")]
    fn test_event_tag(kind: EventKind, expected: &str) {
        assert_eq!(event_tag(kind), expected);
    }

    #[test]
    fn test_every_kind_has_a_distinct_tag() {
        let tags: HashSet<&str> = EventKind::ALL.iter().map(|k| event_tag(*k)).collect();
        assert_eq!(tags.len(), EventKind::ALL.len());
        assert!(!tags.contains(UNKNOWN_EVENT_TAG));
    }
}
