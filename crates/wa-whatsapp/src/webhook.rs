//! Webhook server for receiving WhatsApp messages

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use serde_json::json;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use wa_core::{Responder, UserLocks};

use crate::cloud::CloudApiClient;
use crate::error::{Result, WhatsAppError};
use crate::payload::WebhookPayload;

/// Webhook server state
#[derive(Clone)]
pub struct WebhookState {
    pub responder: Arc<dyn Responder>,
    pub sender: Arc<CloudApiClient>,
    /// Expected `hub.verify_token`; `None` accepts any handshake
    pub verify_token: Option<String>,
    /// Keeps each sender's messages in arrival order
    pub turns: UserLocks,
}

impl WebhookState {
    pub fn new(
        responder: Arc<dyn Responder>,
        sender: Arc<CloudApiClient>,
        verify_token: Option<String>,
    ) -> Self {
        Self {
            responder,
            sender,
            verify_token,
            turns: UserLocks::new(),
        }
    }
}

/// Query of the subscription handshake
#[derive(Debug, Default, Deserialize)]
pub struct VerifyParams {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

impl VerifyParams {
    /// Challenge to echo back, or `None` when the handshake is refused
    pub fn accept(&self, expected_token: Option<&str>) -> Option<String> {
        let challenge = self.challenge.clone().unwrap_or_default();
        match expected_token {
            None => Some(challenge),
            Some(expected) => {
                let subscribing = self.mode.as_deref() == Some("subscribe");
                let token_ok = self.verify_token.as_deref() == Some(expected);
                (subscribing && token_ok).then_some(challenge)
            }
        }
    }
}

/// Create webhook router
pub fn create_router(state: WebhookState) -> Router {
    Router::new()
        .route("/webhook", get(verify_webhook).post(handle_webhook))
        .route("/health", get(|| async { "ok" }))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// Webhook server
pub struct WebhookServer {
    addr: SocketAddr,
    state: WebhookState,
}

impl WebhookServer {
    /// Create a new webhook server
    pub fn new(addr: SocketAddr, state: WebhookState) -> Self {
        Self { addr, state }
    }

    /// Start the webhook server
    pub async fn start(self) -> Result<()> {
        info!("Starting WhatsApp webhook server on {}", self.addr);

        let app = create_router(self.state);

        let listener = tokio::net::TcpListener::bind(self.addr)
            .await
            .map_err(|e| WhatsAppError::Server(e.to_string()))?;

        axum::serve(listener, app)
            .await
            .map_err(|e| WhatsAppError::Server(e.to_string()))?;

        Ok(())
    }
}

/// Handle the subscription handshake
async fn verify_webhook(
    State(state): State<Arc<WebhookState>>,
    Query(params): Query<VerifyParams>,
) -> Response {
    match params.accept(state.verify_token.as_deref()) {
        Some(challenge) => {
            info!("Webhook verified");
            challenge.into_response()
        }
        None => {
            warn!("Webhook verification failed: invalid mode or token");
            StatusCode::FORBIDDEN.into_response()
        }
    }
}

/// Handle incoming webhook delivery
async fn handle_webhook(State(state): State<Arc<WebhookState>>, body: Bytes) -> Response {
    let payload: WebhookPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!("Failed to parse webhook body: {}", e);
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "success": false, "error": e.to_string() })),
            )
                .into_response();
        }
    };

    let handles = dispatch(&state, &payload);
    info!("Accepted webhook with {} text message(s)", handles.len());

    Json(json!({ "success": true })).into_response()
}

/// Answer every text message of `payload` in its own task
///
/// Turns are reserved before spawning, so one sender's messages are
/// answered in the order they were delivered.
pub fn dispatch(state: &Arc<WebhookState>, payload: &WebhookPayload) -> Vec<JoinHandle<()>> {
    payload
        .inbound_messages()
        .into_iter()
        .map(|inbound| {
            let state = Arc::clone(state);
            let ticket = state.turns.ticket(&inbound.user_id);
            tokio::spawn(async move {
                let _turn = ticket.wait().await;
                info!("Received message from {}: {}", inbound.user_id, inbound.text);
                let reply = state.responder.respond(&inbound).await;
                if let Err(e) = state.sender.send_text(&inbound.user_id, &reply).await {
                    error!("Failed to send response to {}: {}", inbound.user_id, e);
                }
            })
        })
        .collect()
}
