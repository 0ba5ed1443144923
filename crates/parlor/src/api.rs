//! HTTP surface: the WebSocket upgrade endpoint and the admin API.
//!
//! The upgrade is performed manually so the hand-rolled frame codec owns
//! the raw stream: headers are validated, the `101` is written, and the
//! upgraded connection is handed to a [`Client`](crate::client::Client) in
//! its own task. Everything else is plain JSON over axum.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, Query, Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use hyper::upgrade::OnUpgrade;
use hyper_util::rt::TokioIo;
use parlor_protocol::{
    AgentPresence, ChatMessage, Participant, Role, RoomSnapshot, RoomSummary,
};
use parlor_room::{Hub, HubError};
use parlor_ws::{handshake, MessageConn};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::auth::{bearer_token, AccountRole, Authenticator, Identity};
use crate::client::Client;

/// Shared state handed to every handler.
pub(crate) struct AppState<A> {
    pub(crate) hub: Arc<Hub>,
    pub(crate) auth: Arc<A>,
    pub(crate) check_origin: Option<Arc<handshake::OriginCheck>>,
}

impl<A> Clone for AppState<A> {
    fn clone(&self) -> Self {
        Self {
            hub: Arc::clone(&self.hub),
            auth: Arc::clone(&self.auth),
            check_origin: self.check_origin.clone(),
        }
    }
}

/// Error responses for the HTTP surface, rendered as `{"error": ...}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();
        if status.is_server_error() {
            tracing::error!(%status, message, "api error");
        } else {
            tracing::debug!(%status, message, "client error");
        }
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<HubError> for ApiError {
    fn from(err: HubError) -> Self {
        match err {
            HubError::RoomNotFound => ApiError::NotFound(err.to_string()),
            _ => ApiError::BadRequest(err.to_string()),
        }
    }
}

pub(crate) fn router<A: Authenticator>(state: AppState<A>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler::<A>))
        .route("/api/agents/online", get(online_agents::<A>))
        .route("/api/rooms", get(list_rooms::<A>))
        .route("/api/rooms/{id}", get(room_snapshot::<A>))
        .route("/api/rooms/{id}/assign", post(assign_agent::<A>))
        .route("/api/rooms/{id}/messages", get(room_messages::<A>))
        .route("/health", get(health))
        .layer(middleware::from_fn(no_store))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// API responses must not be cached by intermediaries or the browser.
async fn no_store(request: Request, next: Next) -> Response {
    let is_api = request.uri().path().starts_with("/api/");
    let mut response = next.run(request).await;
    if is_api {
        response
            .headers_mut()
            .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    }
    response
}

async fn health() -> &'static str {
    "ok"
}

// -------------------------------------------------------------------------
// WebSocket upgrade
// -------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct WsQuery {
    role: String,
    room_id: String,
    id: String,
    name: String,
    /// Accepted for forward compatibility with token-carrying clients; the
    /// identity service only gates the admin API.
    #[allow(dead_code)]
    token: String,
}

async fn ws_handler<A: Authenticator>(
    State(state): State<AppState<A>>,
    Query(query): Query<WsQuery>,
    mut request: Request,
) -> Result<Response, ApiError> {
    let role = if query.role.is_empty() {
        Role::Player
    } else {
        query
            .role
            .parse::<Role>()
            .map_err(|_| ApiError::BadRequest("invalid role".to_string()))?
    };
    if query.room_id.is_empty() {
        return Err(ApiError::BadRequest("roomId is required".to_string()));
    }
    if query.id.is_empty() {
        return Err(ApiError::BadRequest("id is required".to_string()));
    }
    let display_name = if query.name.is_empty() {
        format!("{}-{}", role, query.id)
    } else {
        query.name.clone()
    };

    let accept = handshake::check_upgrade(
        request.method(),
        request.headers(),
        state.check_origin.as_deref(),
    )
    .map_err(|err| ApiError::BadRequest(err.to_string()))?;

    let on_upgrade = request
        .extensions_mut()
        .remove::<OnUpgrade>()
        .ok_or_else(|| {
            ApiError::BadRequest("connection does not support upgrades".to_string())
        })?;

    let hub = Arc::clone(&state.hub);
    tokio::spawn(async move {
        let upgraded = match on_upgrade.await {
            Ok(upgraded) => upgraded,
            Err(err) => {
                tracing::debug!(error = %err, "upgrade did not complete");
                return;
            }
        };

        let conn = MessageConn::new(TokioIo::new(upgraded));
        let client = Client::new(hub, conn, query.room_id, query.id, role, display_name);
        client.run().await;
    });

    Response::builder()
        .status(StatusCode::SWITCHING_PROTOCOLS)
        .header(header::CONNECTION, "upgrade")
        .header(header::UPGRADE, "websocket")
        .header(header::SEC_WEBSOCKET_ACCEPT, accept)
        .body(Body::empty())
        .map_err(|err| ApiError::Internal(err.to_string()))
}

// -------------------------------------------------------------------------
// Admin API
// -------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct TokenQuery {
    token: String,
}

async fn require_admin<A: Authenticator>(
    state: &AppState<A>,
    headers: &HeaderMap,
    query_token: &str,
) -> Result<Identity, ApiError> {
    let token = bearer_token(headers, Some(query_token))
        .ok_or_else(|| ApiError::Unauthorized("unauthorized".to_string()))?;
    let identity = state
        .auth
        .authenticate(&token)
        .await
        .map_err(|_| ApiError::Unauthorized("unauthorized".to_string()))?;
    if identity.role != AccountRole::Admin {
        return Err(ApiError::Forbidden("forbidden".to_string()));
    }
    Ok(identity)
}

async fn online_agents<A: Authenticator>(
    State(state): State<AppState<A>>,
    Query(query): Query<TokenQuery>,
    headers: HeaderMap,
) -> Result<Json<Vec<AgentPresence>>, ApiError> {
    require_admin(&state, &headers, &query.token).await?;
    Ok(Json(state.hub.online_agents()))
}

async fn list_rooms<A: Authenticator>(
    State(state): State<AppState<A>>,
    Query(query): Query<TokenQuery>,
    headers: HeaderMap,
) -> Result<Json<Vec<RoomSummary>>, ApiError> {
    require_admin(&state, &headers, &query.token).await?;
    Ok(Json(state.hub.rooms()))
}

async fn room_snapshot<A: Authenticator>(
    State(state): State<AppState<A>>,
    Path(room_id): Path<String>,
    Query(query): Query<TokenQuery>,
    headers: HeaderMap,
) -> Result<Json<RoomSnapshot>, ApiError> {
    require_admin(&state, &headers, &query.token).await?;
    Ok(Json(state.hub.room_snapshot(&room_id)?))
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct AssignRequest {
    agent_id: String,
    display_name: String,
}

async fn assign_agent<A: Authenticator>(
    State(state): State<AppState<A>>,
    Path(room_id): Path<String>,
    Query(query): Query<TokenQuery>,
    headers: HeaderMap,
    Json(body): Json<AssignRequest>,
) -> Result<Json<Participant>, ApiError> {
    require_admin(&state, &headers, &query.token).await?;

    if body.agent_id.is_empty() {
        return Err(ApiError::BadRequest("agentId is required".to_string()));
    }
    let display_name = if body.display_name.is_empty() {
        body.agent_id.clone()
    } else {
        body.display_name
    };

    let participant = state
        .hub
        .assign_agent(&room_id, &body.agent_id, &display_name)?;
    Ok(Json(participant))
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct MessagesQuery {
    since: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MessagesResponse {
    messages: Vec<ChatMessage>,
    next_seq: i64,
}

/// The catch-up endpoint. Deliberately unauthenticated: clients resync
/// through it after a reconnect or a dropped broadcast.
async fn room_messages<A: Authenticator>(
    State(state): State<AppState<A>>,
    Path(room_id): Path<String>,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<MessagesResponse>, ApiError> {
    let since = match query.since.as_deref() {
        None | Some("") => 0,
        Some(raw) => raw
            .parse::<i64>()
            .map_err(|_| ApiError::BadRequest("invalid since parameter".to_string()))?
            .max(0),
    };

    let (messages, next_seq) = state.hub.messages_since(&room_id, since)?;
    Ok(Json(MessagesResponse { messages, next_seq }))
}
