//! HTTP routes
//!
//! - `GET /` and other static files - browser client
//! - `GET /ws[?role=offerer]` - signaling channel
//! - `POST /offer` - one-shot offer/answer

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use peerlink_webrtc::{
    Error, ErrorKind, OfferRequest, OfferResponse, OneShotOffer, Role, SessionContext,
    SignalingAdapter,
};
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use tokio::sync::mpsc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing::{debug, error, info, warn};

/// Shared state across all handlers
#[derive(Clone)]
pub struct AppState {
    adapter: SignalingAdapter,
    oneshot: OneShotOffer,
    outgoing_queue: usize,
}

impl AppState {
    pub fn new(ctx: SessionContext) -> Self {
        Self {
            outgoing_queue: ctx.config.outgoing_queue,
            oneshot: OneShotOffer::new(ctx.clone()),
            adapter: SignalingAdapter::new(ctx),
        }
    }
}

/// Build the application router
pub fn router(state: AppState, static_dir: &Path) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/offer", post(offer_handler))
        .fallback_service(ServeDir::new(static_dir))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
struct ChannelParams {
    #[serde(default)]
    role: Role,
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ChannelParams>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, params.role, state))
}

/// Bridge one WebSocket to a signaling adapter run
async fn handle_socket(socket: WebSocket, role: Role, state: AppState) {
    let (mut ws_tx, ws_rx) = socket.split();

    // Channel for sending messages back to this connection
    let (tx, mut rx) = mpsc::channel::<String>(state.outgoing_queue);

    let forward_task = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if let Err(e) = ws_tx.send(Message::Text(text)).await {
                debug!("Failed to send WebSocket message: {}", e);
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    let inbound = Box::pin(
        ws_rx
            .take_while(|msg| futures::future::ready(!matches!(msg, Ok(Message::Close(_)))))
            .filter_map(|msg| async move {
                match msg {
                    Ok(Message::Text(text)) => Some(Ok(text)),
                    Ok(_) => None,
                    Err(e) => Some(Err(Error::TransportError(e.to_string()))),
                }
            }),
    );

    match state.adapter.run(role, inbound, tx).await {
        Ok(final_state) => debug!(state = %final_state, "WebSocket session finished"),
        Err(e) => error!("Failed to start session: {}", e),
    }

    let _ = forward_task.await;
}

async fn offer_handler(
    State(state): State<AppState>,
    Json(request): Json<OfferRequest>,
) -> Result<Json<OfferResponse>, ApiError> {
    let response = state.oneshot.answer(request).await?;
    info!("One-shot offer answered");
    Ok(Json(response))
}

/// Library error mapped onto an HTTP status
#[derive(Debug)]
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        Self(error)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self.0.kind() {
            ErrorKind::Protocol => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        warn!(status = %status, "Offer rejected: {}", self.0);
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}
