//! Reply selection.
//!
//! Text messages are matched against the literal command table first; text
//! that matches nothing goes to the fallback policy (search by default).
//! Attachment-only messages get a fixed acknowledgment.

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{CommandRule, FallbackPolicy, NotifierConfig, ReplyTemplates};
use crate::dispatch::MessageHandler;
use crate::search::{SearchClient, SearchHit};
use crate::send::{Button, OutboundMessage, SendGateway};
use crate::webhook::payload::{Message, MessagingEvent};

/// What a message should be answered with, before any I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyPlan<'a> {
    /// Send this text as is
    Fixed(String),
    /// Look the term up and answer with the results
    Search(&'a str),
    /// Nothing to answer
    Silent,
}

/// Reply rules, taken from configuration.
#[derive(Debug, Clone, Default)]
pub struct ReplyPolicy {
    pub commands: Vec<CommandRule>,
    pub fallback: FallbackPolicy,
    pub templates: ReplyTemplates,
}

impl ReplyPolicy {
    pub fn from_config(config: &NotifierConfig) -> Self {
        Self {
            commands: config.commands.clone(),
            fallback: config.fallback,
            templates: config.templates.clone(),
        }
    }

    /// Decide how to answer a message.
    pub fn plan<'a>(&self, message: &'a Message) -> ReplyPlan<'a> {
        if let Some(text) = message.text() {
            if let Some(rule) = self.commands.iter().find(|rule| rule.trigger == text) {
                return ReplyPlan::Fixed(rule.reply.clone());
            }
            return match self.fallback {
                FallbackPolicy::Search => ReplyPlan::Search(text),
                FallbackPolicy::Echo => ReplyPlan::Fixed(text.to_string()),
            };
        }

        if message.has_attachments() {
            return ReplyPlan::Fixed(self.templates.attachment_ack.clone());
        }

        ReplyPlan::Silent
    }
}

/// Build the reply for a finished lookup.
///
/// One button per hit, in the order the search service returned them.
pub fn build_search_reply(
    recipient_id: &str,
    term: &str,
    hits: &[SearchHit],
    templates: &ReplyTemplates,
) -> OutboundMessage {
    if hits.is_empty() {
        return OutboundMessage::text(recipient_id, templates.no_results(term));
    }

    let buttons = hits
        .iter()
        .map(|hit| Button::web_url(&hit.guid, &hit.post_title))
        .collect();
    OutboundMessage::text(recipient_id, templates.results_header(term)).with_buttons(buttons)
}

/// Answers messages and hands replies to the send gateway.
pub struct Responder {
    policy: ReplyPolicy,
    search: Arc<dyn SearchClient>,
    gateway: SendGateway,
}

impl Responder {
    pub fn new(policy: ReplyPolicy, search: Arc<dyn SearchClient>, gateway: SendGateway) -> Self {
        Self {
            policy,
            search,
            gateway,
        }
    }

    /// Work out the reply for a message, running the lookup if needed.
    ///
    /// Returns `None` when there is nothing to send, including when the
    /// lookup failed; the failure is logged and the user gets no reply.
    pub async fn reply_for(&self, sender_id: &str, message: &Message) -> Option<OutboundMessage> {
        match self.policy.plan(message) {
            ReplyPlan::Fixed(text) => Some(OutboundMessage::text(sender_id, text)),
            ReplyPlan::Search(term) => match self.search.search(term).await {
                Ok(hits) => {
                    tracing::debug!(term, hits = hits.len(), "Search finished");
                    Some(build_search_reply(
                        sender_id,
                        term,
                        &hits,
                        &self.policy.templates,
                    ))
                }
                Err(e) => {
                    tracing::error!(term, error = %e, "Unable to query search service");
                    None
                }
            },
            ReplyPlan::Silent => {
                tracing::debug!(message_id = %message.id, "Message has neither text nor attachments");
                None
            }
        }
    }
}

#[async_trait]
impl MessageHandler for Responder {
    async fn handle(&self, event: &MessagingEvent, message: &Message) {
        let received_at = chrono::DateTime::<chrono::Utc>::from_timestamp_millis(event.timestamp)
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| event.timestamp.to_string());
        tracing::info!(
            sender_id = %event.sender_id(),
            recipient_id = %event.recipient_id(),
            received_at = %received_at,
            message_id = %message.id,
            "Received message"
        );

        if let Some(reply) = self.reply_for(event.sender_id(), message).await {
            self.gateway.deliver(&reply).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UpstreamError;
    use crate::send::{SendApi, SendReceipt};
    use crate::webhook::payload::Participant;
    use serde_json::json;
    use tokio::sync::Mutex;

    struct FakeSearch {
        hits: Vec<SearchHit>,
        fail: bool,
        queries: Mutex<Vec<String>>,
    }

    impl FakeSearch {
        fn returning(hits: Vec<SearchHit>) -> Arc<Self> {
            Arc::new(Self {
                hits,
                fail: false,
                queries: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                hits: Vec::new(),
                fail: true,
                queries: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl SearchClient for FakeSearch {
        async fn search(&self, terms: &str) -> Result<Vec<SearchHit>, UpstreamError> {
            self.queries.lock().await.push(terms.to_string());
            if self.fail {
                return Err(UpstreamError::Status {
                    service: "search service",
                    status: 500,
                    body: String::new(),
                });
            }
            Ok(self.hits.clone())
        }
    }

    #[derive(Default)]
    struct RecordingSend {
        sent: Mutex<Vec<OutboundMessage>>,
    }

    #[async_trait]
    impl SendApi for RecordingSend {
        async fn send(&self, message: &OutboundMessage) -> Result<SendReceipt, UpstreamError> {
            self.sent.lock().await.push(message.clone());
            Ok(SendReceipt {
                recipient_id: message.recipient_id.clone(),
                message_id: "mid.reply".to_string(),
            })
        }
    }

    fn hit(title: &str, guid: &str) -> SearchHit {
        SearchHit {
            post_title: title.to_string(),
            guid: guid.to_string(),
        }
    }

    fn text_message(text: &str) -> Message {
        Message {
            id: "mid.1".to_string(),
            text: Some(text.to_string()),
            attachments: None,
        }
    }

    fn event() -> MessagingEvent {
        MessagingEvent {
            sender: Participant {
                id: "USER_ID".to_string(),
            },
            recipient: Participant {
                id: "PAGE_ID".to_string(),
            },
            timestamp: 1458692752478,
            message: None,
        }
    }

    fn responder(
        policy: ReplyPolicy,
        search: Arc<FakeSearch>,
    ) -> (Responder, Arc<RecordingSend>) {
        let send = Arc::new(RecordingSend::default());
        let responder = Responder::new(policy, search, SendGateway::new(send.clone()));
        (responder, send)
    }

    #[test]
    fn test_plan_text_defaults_to_search() {
        let policy = ReplyPolicy::default();
        let message = text_message("rust");
        assert_eq!(policy.plan(&message), ReplyPlan::Search("rust"));
    }

    #[test]
    fn test_plan_commands_are_case_sensitive() {
        let policy = ReplyPolicy {
            commands: vec![CommandRule {
                trigger: "help".to_string(),
                reply: "Send me a word.".to_string(),
            }],
            ..Default::default()
        };
        let exact = text_message("help");
        let other_case = text_message("Help");
        assert_eq!(
            policy.plan(&exact),
            ReplyPlan::Fixed("Send me a word.".to_string())
        );
        assert_eq!(policy.plan(&other_case), ReplyPlan::Search("Help"));
    }

    #[test]
    fn test_plan_echo_fallback() {
        let policy = ReplyPolicy {
            fallback: FallbackPolicy::Echo,
            ..Default::default()
        };
        let message = text_message("ping");
        assert_eq!(policy.plan(&message), ReplyPlan::Fixed("ping".to_string()));
    }

    #[test]
    fn test_plan_attachments_always_acknowledged() {
        let policy = ReplyPolicy::default();
        for attachments in [
            vec![],
            vec![json!({"type": "image", "payload": {"url": "https://x/cat.png"}})],
            vec![json!({"type": "location"}), json!({"type": "file"})],
        ] {
            let message = Message {
                id: "mid.a".to_string(),
                text: None,
                attachments: Some(attachments),
            };
            assert_eq!(
                policy.plan(&message),
                ReplyPlan::Fixed("Message with attachment received".to_string())
            );
        }
    }

    #[test]
    fn test_plan_text_wins_over_attachments() {
        let policy = ReplyPolicy::default();
        let message = Message {
            id: "mid.b".to_string(),
            text: Some("cats".to_string()),
            attachments: Some(vec![json!({"type": "image"})]),
        };
        assert_eq!(policy.plan(&message), ReplyPlan::Search("cats"));
    }

    #[test]
    fn test_plan_empty_message_is_silent() {
        let policy = ReplyPolicy::default();
        assert_eq!(policy.plan(&Message::default()), ReplyPlan::Silent);
    }

    #[test]
    fn test_build_reply_without_hits() {
        let reply = build_search_reply("USER_ID", "kittens", &[], &ReplyTemplates::default());
        assert_eq!(reply.recipient_id, "USER_ID");
        assert_eq!(
            reply.text,
            "Търсене за \"kittens\" не доведе до никакви резултати"
        );
        assert!(reply.buttons.is_none());
    }

    #[test]
    fn test_build_reply_one_button_per_hit_in_order() {
        let hits = vec![
            hit("Zeta", "https://blog/z"),
            hit("Alpha", "https://blog/a"),
            hit("Mid", "https://blog/m"),
        ];
        let reply = build_search_reply("USER_ID", "rust", &hits, &ReplyTemplates::default());

        assert_eq!(reply.text, "\"rust\" се съдържа в следните статии:");
        assert_eq!(
            reply.buttons.unwrap(),
            vec![
                Button::web_url("https://blog/z", "Zeta"),
                Button::web_url("https://blog/a", "Alpha"),
                Button::web_url("https://blog/m", "Mid"),
            ]
        );
    }

    #[tokio::test]
    async fn test_search_reply_is_sent() {
        let search = FakeSearch::returning(vec![hit("Post", "https://blog/p")]);
        let (responder, send) = responder(ReplyPolicy::default(), search.clone());

        responder.handle(&event(), &text_message("rust")).await;

        assert_eq!(*search.queries.lock().await, vec!["rust".to_string()]);
        let sent = send.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipient_id, "USER_ID");
        assert_eq!(
            sent[0].buttons,
            Some(vec![Button::web_url("https://blog/p", "Post")])
        );
    }

    #[tokio::test]
    async fn test_search_failure_sends_nothing() {
        let (responder, send) = responder(ReplyPolicy::default(), FakeSearch::failing());

        responder.handle(&event(), &text_message("rust")).await;

        assert!(send.sent.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_attachment_reply_skips_search() {
        let search = FakeSearch::returning(vec![]);
        let (responder, send) = responder(ReplyPolicy::default(), search.clone());
        let message = Message {
            id: "mid.c".to_string(),
            text: None,
            attachments: Some(vec![json!({"type": "audio"})]),
        };

        responder.handle(&event(), &message).await;

        assert!(search.queries.lock().await.is_empty());
        let sent = send.sent.lock().await;
        assert_eq!(
            *sent,
            vec![OutboundMessage::text(
                "USER_ID",
                "Message with attachment received"
            )]
        );
    }

    #[tokio::test]
    async fn test_silent_message_sends_nothing() {
        let search = FakeSearch::returning(vec![]);
        let (responder, send) = responder(ReplyPolicy::default(), search.clone());

        assert!(responder
            .reply_for("USER_ID", &Message::default())
            .await
            .is_none());
        responder.handle(&event(), &Message::default()).await;

        assert!(search.queries.lock().await.is_empty());
        assert!(send.sent.lock().await.is_empty());
    }
}
