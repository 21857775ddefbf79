//! Axum HTTP server for the redemption API.
//!
//! Three POST routes: the two redemption phases and the webhook intake for
//! the command surface, plus a health probe. The client's network origin is
//! taken from the first `x-forwarded-for` entry, falling back to the socket
//! peer address; only its hash ever leaves this module.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{ConnectInfo, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
};
use serde_json::json;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::bot::{CommandRouter, Update};
use crate::error::Error;
use crate::gate::GateService;
use crate::http::types::{RedeemRequest, RedeemResponse};

/// Shared state for all handlers.
pub struct AppState {
    pub gate: GateService,
    pub commands: CommandRouter,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/first", post(first_handler))
        .route("/api/final", post(final_handler))
        .route("/api/bot", post(webhook_handler))
        .route("/api/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn serve(addr: SocketAddr, state: Arc<AppState>) -> Result<(), Error> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

async fn first_handler(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(request): Json<RedeemRequest>,
) -> Json<RedeemResponse> {
    let origin = client_origin(&headers, &peer);
    match state.gate.begin_redemption(&request.init_data, &origin).await {
        Ok(link) => Json(RedeemResponse::resolved(link)),
        Err(rejection) => Json(RedeemResponse::rejected(rejection)),
    }
}

async fn final_handler(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(request): Json<RedeemRequest>,
) -> Json<RedeemResponse> {
    let origin = client_origin(&headers, &peer);
    match state.gate.resolve(&request.init_data, &origin).await {
        Ok(link) => Json(RedeemResponse::resolved(link)),
        Err(rejection) => Json(RedeemResponse::rejected(rejection)),
    }
}

/// Webhook intake. Always answers 200 so the platform does not retry;
/// malformed updates are dropped.
async fn webhook_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<serde_json::Value>,
) -> StatusCode {
    match serde_json::from_value::<Update>(payload) {
        Ok(update) => state.commands.handle_update(update).await,
        Err(e) => tracing::debug!(error = %e, "unparseable webhook update dropped"),
    }
    StatusCode::OK
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({ "ok": true }))
}

/// First forwarded address wins; the socket peer is the fallback.
fn client_origin(headers: &HeaderMap, peer: &SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| peer.ip().to_string())
}
