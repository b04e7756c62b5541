//! Inbound delivery payload types.
//!
//! Entries and messaging events are kept as raw JSON in the envelope and
//! decoded one at a time by the dispatcher, so a single malformed item does
//! not make the whole delivery unreadable.

use serde::Deserialize;
use serde_json::Value;

/// `object` value of deliveries that carry page messaging events
pub const PAGE_OBJECT: &str = "page";

/// Top-level webhook delivery.
///
/// Only `object` has to be well formed for the delivery to be accepted.
/// `entry` is kept as-is; a missing list reads as empty.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundEnvelope {
    pub object: String,
    #[serde(default = "empty_entry_list", rename = "entry")]
    pub entries: Value,
}

fn empty_entry_list() -> Value {
    Value::Array(Vec::new())
}

impl InboundEnvelope {
    /// Whether this delivery is one we process
    pub fn is_page(&self) -> bool {
        self.object == PAGE_OBJECT
    }

    /// The raw entries, or `None` when `entry` is not an array
    pub fn entry_list(&self) -> Option<&[Value]> {
        self.entries.as_array().map(Vec::as_slice)
    }
}

/// One page's slice of a delivery.
#[derive(Debug, Clone, Deserialize)]
pub struct Entry {
    #[serde(rename = "id")]
    pub page_id: String,
    #[serde(default, rename = "time")]
    pub timestamp: i64,
    #[serde(default, rename = "messaging")]
    pub events: Vec<Value>,
}

/// A user or page reference.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Participant {
    pub id: String,
}

/// A single messaging event within an entry.
#[derive(Debug, Clone, Deserialize)]
pub struct MessagingEvent {
    pub sender: Participant,
    pub recipient: Participant,
    #[serde(default)]
    pub timestamp: i64,
    pub message: Option<Message>,
}

impl MessagingEvent {
    pub fn sender_id(&self) -> &str {
        &self.sender.id
    }

    pub fn recipient_id(&self) -> &str {
        &self.recipient.id
    }
}

/// Message content of an event.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Message {
    #[serde(default, rename = "mid")]
    pub id: String,
    pub text: Option<String>,
    pub attachments: Option<Vec<Value>>,
}

impl Message {
    /// Message text, treating an empty string as absent
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref().filter(|text| !text.is_empty())
    }

    pub fn has_attachments(&self) -> bool {
        self.attachments.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DELIVERY: &str = r#"{
        "object": "page",
        "entry": [
            {
                "id": "PAGE_ID",
                "time": 1458692752478,
                "messaging": [
                    {
                        "sender": {"id": "USER_ID"},
                        "recipient": {"id": "PAGE_ID"},
                        "timestamp": 1458692752478,
                        "message": {
                            "mid": "mid.1457764197618:41d102a3e1ae206a38",
                            "text": "hello, world!"
                        }
                    }
                ]
            }
        ]
    }"#;

    #[test]
    fn test_envelope_deserialization() {
        let envelope: InboundEnvelope = serde_json::from_str(DELIVERY).unwrap();
        assert!(envelope.is_page());
        let entries = envelope.entry_list().unwrap();
        assert_eq!(entries.len(), 1);

        let entry: Entry = serde_json::from_value(entries[0].clone()).unwrap();
        assert_eq!(entry.page_id, "PAGE_ID");
        assert_eq!(entry.timestamp, 1458692752478);
        assert_eq!(entry.events.len(), 1);

        let event: MessagingEvent = serde_json::from_value(entry.events[0].clone()).unwrap();
        assert_eq!(event.sender_id(), "USER_ID");
        assert_eq!(event.recipient_id(), "PAGE_ID");

        let message = event.message.unwrap();
        assert_eq!(message.id, "mid.1457764197618:41d102a3e1ae206a38");
        assert_eq!(message.text(), Some("hello, world!"));
        assert!(!message.has_attachments());
    }

    #[test]
    fn test_envelope_without_entries() {
        let envelope: InboundEnvelope = serde_json::from_str(r#"{"object":"user"}"#).unwrap();
        assert!(!envelope.is_page());
        assert_eq!(envelope.entry_list().map(<[Value]>::len), Some(0));
    }

    #[test]
    fn test_envelope_with_non_array_entry_still_parses() {
        for body in [
            r#"{"object":"page","entry":null}"#,
            r#"{"object":"page","entry":{"id":"P"}}"#,
            r#"{"object":"page","entry":"x"}"#,
        ] {
            let envelope: InboundEnvelope = serde_json::from_str(body).unwrap();
            assert!(envelope.is_page());
            assert!(envelope.entry_list().is_none(), "{body}");
        }
    }

    #[test]
    fn test_envelope_requires_object_string() {
        assert!(serde_json::from_str::<InboundEnvelope>(r#"{"entry":[]}"#).is_err());
        assert!(serde_json::from_str::<InboundEnvelope>(r#"{"object":7}"#).is_err());
        assert!(serde_json::from_str::<InboundEnvelope>(r#"[]"#).is_err());
    }

    #[test]
    fn test_event_without_message() {
        let event: MessagingEvent = serde_json::from_str(
            r#"{
                "sender": {"id": "USER_ID"},
                "recipient": {"id": "PAGE_ID"},
                "timestamp": 1458692752478,
                "delivery": {"mids": ["mid.1"], "watermark": 1458668856253}
            }"#,
        )
        .unwrap();
        assert!(event.message.is_none());
    }

    #[test]
    fn test_attachment_message() {
        let message: Message = serde_json::from_str(
            r#"{"mid": "mid.2", "attachments": [{"type": "image", "payload": {"url": "https://x"}}]}"#,
        )
        .unwrap();
        assert_eq!(message.text(), None);
        assert!(message.has_attachments());
    }

    #[test]
    fn test_empty_text_counts_as_absent() {
        let message: Message = serde_json::from_str(r#"{"mid": "mid.3", "text": ""}"#).unwrap();
        assert_eq!(message.text(), None);
    }

    #[test]
    fn test_event_missing_sender_is_an_error() {
        let result: Result<MessagingEvent, _> =
            serde_json::from_str(r#"{"recipient": {"id": "PAGE_ID"}, "message": {"text": "x"}}"#);
        assert!(result.is_err());
    }
}
