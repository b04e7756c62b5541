//! Webhook server implementation
//!
//! Routes:
//! - `GET /` and `GET /webhook`: subscription handshake
//! - `POST /` and `POST /webhook`: signed event deliveries
//! - `GET /health`: liveness check

use axum::{
    body::Bytes,
    extract::{rejection::QueryRejection, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tower_http::trace::TraceLayer;

use super::payload::InboundEnvelope;
use super::signature::{verify_request, SignatureError};
use crate::config::NotifierConfig;
use crate::dedup::RecentMessages;
use crate::dispatch::{DispatchReport, Dispatcher};
use crate::responder::{ReplyPolicy, Responder};
use crate::search::HttpSearchClient;
use crate::send::{GraphSendApi, SendGateway};

/// Shared state for the webhook routes. Nothing in it is mutated per request.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<NotifierConfig>,
    pub dispatcher: Arc<Dispatcher>,
}

impl AppState {
    pub fn new(config: Arc<NotifierConfig>, dispatcher: Arc<Dispatcher>) -> Self {
        Self { config, dispatcher }
    }

    /// Wire up the HTTP search client, the Send API and the responder.
    pub fn from_config(config: Arc<NotifierConfig>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .user_agent(concat!("notifier/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let search = Arc::new(HttpSearchClient::new(client.clone(), &config.search_url));
        let send = Arc::new(GraphSendApi::new(
            client,
            &config.graph_api_url,
            &config.page_access_token,
        ));
        let responder = Responder::new(
            ReplyPolicy::from_config(&config),
            search,
            SendGateway::new(send),
        );

        let mut dispatcher = Dispatcher::new(Arc::new(responder));
        if let Some(window) = config.dedup_window() {
            dispatcher = dispatcher.with_dedup(RecentMessages::new(window, config.dedup_capacity));
        }

        Ok(Self::new(config, Arc::new(dispatcher)))
    }
}

/// Request-level failures.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("Invalid webhook signature: {0}")]
    InvalidSignature(#[from] SignatureError),

    #[error("Failed to parse webhook payload: {0}")]
    ParseError(String),
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = match &self {
            WebhookError::InvalidSignature(_) => StatusCode::UNAUTHORIZED,
            WebhookError::ParseError(_) => StatusCode::BAD_REQUEST,
        };

        let body = Json(WebhookErrorResponse {
            error: self.to_string(),
        });

        (status, body).into_response()
    }
}

#[derive(Debug, Serialize)]
struct WebhookErrorResponse {
    error: String,
}

/// Query parameters of the subscription handshake.
#[derive(Debug, Default, Deserialize)]
pub struct HandshakeQuery {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// Body returned for an accepted delivery.
#[derive(Debug, Serialize)]
pub struct DeliveryResponse {
    pub received: bool,
    #[serde(flatten)]
    pub report: DispatchReport,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Build the router for all webhook routes.
pub fn create_webhook_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handshake_handler).post(delivery_handler))
        .route("/webhook", get(handshake_handler).post(delivery_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Subscription handshake.
///
/// Echoes `hub.challenge` when `hub.mode` is `subscribe` and
/// `hub.verify_token` matches the configured token; 403 otherwise, including
/// when the query string cannot be read.
pub async fn handshake_handler(
    State(state): State<AppState>,
    query: Result<Query<HandshakeQuery>, QueryRejection>,
) -> Response {
    let query = match query {
        Ok(Query(query)) => query,
        Err(e) => {
            tracing::warn!(error = %e, "Failed validation. Unreadable handshake parameters.");
            return StatusCode::FORBIDDEN.into_response();
        }
    };
    let subscribing = query.mode.as_deref() == Some("subscribe");
    let token_matches =
        query.verify_token.as_deref() == Some(state.config.validation_token.as_str());

    if subscribing && token_matches {
        tracing::info!("Validating webhook");
        (StatusCode::OK, query.challenge.unwrap_or_default()).into_response()
    } else {
        tracing::warn!(
            mode = ?query.mode,
            "Failed validation. Make sure the validation tokens match."
        );
        StatusCode::FORBIDDEN.into_response()
    }
}

/// Event delivery.
///
/// The signature is checked against the raw body before it is parsed.
/// Once the body reads as an object with an `object` string, the response
/// is 200 whatever happens to the
/// individual events, since the platform redelivers the whole batch on
/// anything else.
pub async fn delivery_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<DeliveryResponse>, WebhookError> {
    verify_request(
        &headers,
        &state.config.app_secret,
        &body,
        state.config.strict_signatures,
    )?;

    let envelope: InboundEnvelope =
        serde_json::from_slice(&body).map_err(|e| WebhookError::ParseError(e.to_string()))?;

    let report = state.dispatcher.dispatch(&envelope).await;

    tracing::info!(
        object = %envelope.object,
        entries = report.entries,
        messages = report.messages,
        unknown_events = report.unknown_events,
        malformed = report.malformed,
        duplicates = report.duplicates,
        "Processed webhook delivery"
    );

    Ok(Json(DeliveryResponse {
        received: true,
        report,
    }))
}
