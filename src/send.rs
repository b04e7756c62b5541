//! Outbound replies through the platform's Send API.
//!
//! Delivery is best effort: one attempt, no retry. [`SendGateway`] logs the
//! outcome and never hands an error back to the request that triggered it.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::UpstreamError;

const SERVICE: &str = "send api";

/// Link button attached to a reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Button {
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
    pub title: String,
}

impl Button {
    pub fn web_url(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            kind: "web_url".to_string(),
            url: url.into(),
            title: title.into(),
        }
    }
}

/// A reply to one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub recipient_id: String,
    pub text: String,
    pub buttons: Option<Vec<Button>>,
}

impl OutboundMessage {
    /// Plain text reply
    pub fn text(recipient_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            recipient_id: recipient_id.into(),
            text: text.into(),
            buttons: None,
        }
    }

    pub fn with_buttons(mut self, buttons: Vec<Button>) -> Self {
        self.buttons = Some(buttons);
        self
    }

    /// Send API request body for this message
    pub fn to_request(&self) -> SendRequest<'_> {
        SendRequest {
            recipient: Recipient {
                id: &self.recipient_id,
            },
            message: MessageBody {
                text: &self.text,
                buttons: self.buttons.as_deref(),
            },
        }
    }
}

/// Wire format: `{recipient:{id}, message:{text, buttons?}}`
#[derive(Debug, Serialize)]
pub struct SendRequest<'a> {
    recipient: Recipient<'a>,
    message: MessageBody<'a>,
}

#[derive(Debug, Serialize)]
struct Recipient<'a> {
    id: &'a str,
}

#[derive(Debug, Serialize)]
struct MessageBody<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    buttons: Option<&'a [Button]>,
}

/// Body of a successful Send API call.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SendReceipt {
    pub recipient_id: String,
    pub message_id: String,
}

/// Delivers a reply to the platform.
#[async_trait]
pub trait SendApi: Send + Sync {
    async fn send(&self, message: &OutboundMessage) -> Result<SendReceipt, UpstreamError>;
}

/// [`SendApi`] for the Graph `/me/messages` endpoint.
#[derive(Clone)]
pub struct GraphSendApi {
    client: Client,
    endpoint: String,
    access_token: String,
}

impl GraphSendApi {
    pub fn new(
        client: Client,
        graph_api_url: &str,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            client,
            endpoint: format!("{}/me/messages", graph_api_url.trim_end_matches('/')),
            access_token: access_token.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl SendApi for GraphSendApi {
    async fn send(&self, message: &OutboundMessage) -> Result<SendReceipt, UpstreamError> {
        // The platform takes the page token as a query parameter, not a header
        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("access_token", self.access_token.as_str())])
            .json(&message.to_request())
            .send()
            .await
            .map_err(|e| UpstreamError::transport(SERVICE, e))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| UpstreamError::transport(SERVICE, e))?;

        if status != StatusCode::OK {
            return Err(UpstreamError::Status {
                service: SERVICE,
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }

        serde_json::from_slice(&bytes).map_err(|e| UpstreamError::Decode {
            service: SERVICE,
            reason: e.to_string(),
        })
    }
}

/// Best-effort delivery with logging.
#[derive(Clone)]
pub struct SendGateway {
    api: Arc<dyn SendApi>,
}

impl SendGateway {
    pub fn new(api: Arc<dyn SendApi>) -> Self {
        Self { api }
    }

    /// Send once and log the outcome. Returns the receipt on success.
    pub async fn deliver(&self, message: &OutboundMessage) -> Option<SendReceipt> {
        match self.api.send(message).await {
            Ok(receipt) => {
                tracing::info!(
                    message_id = %receipt.message_id,
                    recipient_id = %receipt.recipient_id,
                    "Successfully sent message"
                );
                Some(receipt)
            }
            Err(e) => {
                tracing::error!(
                    recipient_id = %message.recipient_id,
                    error = %e,
                    "Unable to send message"
                );
                None
            }
        }
    }
}
