//! Event dispatch.
//!
//! Walks a delivery's entries and messaging events in the order received and
//! hands every message event to a [`MessageHandler`]. Each entry and event is
//! decoded on its own; a malformed one is logged and skipped.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use crate::dedup::RecentMessages;
use crate::error::DispatchError;
use crate::webhook::payload::{Entry, InboundEnvelope, Message, MessagingEvent};

/// Receives message events, one at a time and in delivery order.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, event: &MessagingEvent, message: &Message);
}

/// What happened to a delivery.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    /// The delivery was not a page delivery and was skipped
    pub ignored: bool,
    pub entries: usize,
    pub messages: usize,
    pub unknown_events: usize,
    pub malformed: usize,
    pub duplicates: usize,
}

/// Routes decoded events to the handler.
pub struct Dispatcher {
    handler: Arc<dyn MessageHandler>,
    recent: Option<RecentMessages>,
}

impl Dispatcher {
    pub fn new(handler: Arc<dyn MessageHandler>) -> Self {
        Self {
            handler,
            recent: None,
        }
    }

    /// Skip messages whose id was already handled inside the window.
    ///
    /// An id is recorded before the handler runs, so delivery is at most
    /// once: a redelivery that follows a failed search or send is skipped
    /// as well.
    pub fn with_dedup(mut self, recent: RecentMessages) -> Self {
        self.recent = Some(recent);
        self
    }

    /// Process every event in the delivery, in order.
    pub async fn dispatch(&self, envelope: &InboundEnvelope) -> DispatchReport {
        let mut report = DispatchReport::default();

        if !envelope.is_page() {
            tracing::debug!(object = %envelope.object, "Ignoring non-page delivery");
            report.ignored = true;
            return report;
        }

        let Some(entries) = envelope.entry_list() else {
            let err = DispatchError::MalformedEntryList {
                kind: json_kind(&envelope.entries),
            };
            tracing::warn!(error = %err, "Skipping delivery body");
            report.malformed += 1;
            return report;
        };

        for (entry_index, raw_entry) in entries.iter().enumerate() {
            let entry: Entry = match serde_json::from_value(raw_entry.clone()) {
                Ok(entry) => entry,
                Err(e) => {
                    let err = DispatchError::MalformedEntry {
                        index: entry_index,
                        reason: e.to_string(),
                    };
                    tracing::warn!(error = %err, "Skipping entry");
                    report.malformed += 1;
                    continue;
                }
            };
            report.entries += 1;
            tracing::debug!(
                page_id = %entry.page_id,
                time = entry.timestamp,
                events = entry.events.len(),
                "Processing entry"
            );

            for (event_index, raw_event) in entry.events.iter().enumerate() {
                let event: MessagingEvent = match serde_json::from_value(raw_event.clone()) {
                    Ok(event) => event,
                    Err(e) => {
                        let err = DispatchError::MalformedEvent {
                            entry_index,
                            event_index,
                            reason: e.to_string(),
                        };
                        tracing::warn!(error = %err, "Skipping messaging event");
                        report.malformed += 1;
                        continue;
                    }
                };

                let Some(message) = event.message.as_ref() else {
                    tracing::info!(event = %raw_event, "Webhook received unknown event");
                    report.unknown_events += 1;
                    continue;
                };

                if let Some(recent) = &self.recent {
                    if !recent.first_sighting(&message.id) {
                        tracing::info!(message_id = %message.id, "Skipping redelivered message");
                        report.duplicates += 1;
                        continue;
                    }
                }

                self.handler.handle(&event, message).await;
                report.messages += 1;
            }
        }

        report
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
