use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::Method,
    response::sse::{Event, KeepAlive, Sse},
    routing::{delete, get, post, put},
    Json, Router,
};
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::{wrappers::ReceiverStream, StreamExt};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use duet_chat::{BroadcastEvent, ChatService};
use duet_shared::events::TypingIndicator;
use duet_shared::types::inbox_topic;
use duet_shared::{ChatId, MessageKind, MessageStatus};
use duet_store::{ChatHead, Message, Notification};

use crate::config::ServerConfig;
use crate::error::ServerError;

#[derive(Clone)]
pub struct AppState {
    pub service: ChatService,
    pub config: Arc<ServerConfig>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/info", get(server_info))
        // Messages
        .route("/messages", post(send_message))
        .route("/messages/status", post(update_message_status))
        .route("/messages/:chat_id", get(chat_history))
        .route("/messages/:chat_id", delete(delete_chat))
        .route("/messages/:message_id/delete", post(soft_delete_message))
        // Chat heads
        .route("/chats", get(list_chats))
        .route("/chats/create", post(create_chat))
        // Typing side-channel
        .route("/typing", post(send_typing))
        // Notifications
        .route("/notifications", get(list_notifications))
        .route("/notifications/unread/count", get(unread_count))
        .route("/notifications/:id/read", put(mark_notification_read))
        .route("/notifications/mark-all-read", put(mark_all_read))
        .route("/notifications/read", delete(sweep_read))
        // Live streams (SSE)
        .route("/stream/chat/:chat_id", get(stream_chat))
        .route("/stream/inbox/:user_id", get(stream_inbox))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// DTOs
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct ServerInfoResponse {
    name: String,
    version: &'static str,
    history_limit: u32,
}

#[derive(Deserialize)]
struct SendMessageRequest {
    sender_id: String,
    receiver_id: String,
    /// Parsed strictly; an unknown kind is rejected, not defaulted.
    kind: String,
    #[serde(default)]
    body: String,
    media_ref: Option<String>,
}

#[derive(Deserialize)]
struct StatusUpdateRequest {
    message_id: Uuid,
    chat_id: String,
    status: String,
    user_id: String,
}

#[derive(Deserialize)]
struct CreateChatRequest {
    user_id_a: String,
    user_id_b: String,
}

#[derive(Deserialize)]
struct TypingRequest {
    chat_id: String,
    user_id: String,
    user_name: String,
    is_typing: bool,
}

#[derive(Deserialize)]
struct UserQuery {
    user_id: String,
}

#[derive(Deserialize)]
struct HistoryQuery {
    user_id: String,
    limit: Option<u32>,
}

#[derive(Deserialize)]
struct NotificationsQuery {
    user_id: String,
    #[serde(default)]
    unread_only: bool,
    limit: Option<u32>,
}

#[derive(Serialize)]
struct CountResponse {
    count: i64,
}

#[derive(Serialize)]
struct AffectedResponse {
    affected: usize,
}

// ---------------------------------------------------------------------------
// Handlers: messages
// ---------------------------------------------------------------------------

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn server_info(State(state): State<AppState>) -> Json<ServerInfoResponse> {
    Json(ServerInfoResponse {
        name: state.config.instance_name.clone(),
        version: env!("CARGO_PKG_VERSION"),
        history_limit: state.config.history_limit,
    })
}

async fn send_message(
    State(state): State<AppState>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<Message>, ServerError> {
    let kind: MessageKind = req.kind.parse()?;
    let message = state
        .service
        .send_message(&req.sender_id, &req.receiver_id, kind, &req.body, req.media_ref)
        .await?;
    Ok(Json(message))
}

async fn chat_history(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<Message>>, ServerError> {
    let limit = query
        .limit
        .unwrap_or(state.config.history_limit)
        .min(state.config.history_limit);
    let messages =
        state
            .service
            .chat_history(&ChatId::from_raw(chat_id), &query.user_id, limit)?;
    Ok(Json(messages))
}

async fn delete_chat(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Query(query): Query<UserQuery>,
) -> Result<Json<AffectedResponse>, ServerError> {
    let affected = state
        .service
        .delete_chat(&ChatId::from_raw(chat_id), &query.user_id)?;
    Ok(Json(AffectedResponse { affected }))
}

async fn soft_delete_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Query(query): Query<UserQuery>,
) -> Result<Json<serde_json::Value>, ServerError> {
    state.service.soft_delete_message(message_id, &query.user_id)?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}

async fn update_message_status(
    State(state): State<AppState>,
    Json(req): Json<StatusUpdateRequest>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let status: MessageStatus = req.status.parse()?;
    state
        .service
        .update_message_status(
            req.message_id,
            &ChatId::from_raw(req.chat_id),
            status,
            &req.user_id,
        )
        .await?;
    Ok(Json(serde_json::json!({ "updated": true })))
}

// ---------------------------------------------------------------------------
// Handlers: chat heads
// ---------------------------------------------------------------------------

async fn list_chats(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<Vec<ChatHead>>, ServerError> {
    Ok(Json(state.service.list_chats(&query.user_id)?))
}

async fn create_chat(
    State(state): State<AppState>,
    Json(req): Json<CreateChatRequest>,
) -> Result<Json<ChatHead>, ServerError> {
    let head = state
        .service
        .create_chat_if_absent(&req.user_id_a, &req.user_id_b)?;
    Ok(Json(head))
}

// ---------------------------------------------------------------------------
// Handlers: typing
// ---------------------------------------------------------------------------

async fn send_typing(
    State(state): State<AppState>,
    Json(req): Json<TypingRequest>,
) -> Json<serde_json::Value> {
    state
        .service
        .send_typing(TypingIndicator {
            chat_id: ChatId::from_raw(req.chat_id),
            user_id: req.user_id,
            user_name: req.user_name,
            is_typing: req.is_typing,
        })
        .await;
    Json(serde_json::json!({ "sent": true }))
}

// ---------------------------------------------------------------------------
// Handlers: notifications
// ---------------------------------------------------------------------------

async fn list_notifications(
    State(state): State<AppState>,
    Query(query): Query<NotificationsQuery>,
) -> Result<Json<Vec<Notification>>, ServerError> {
    let limit = query
        .limit
        .unwrap_or(duet_shared::constants::DEFAULT_NOTIFICATION_LIMIT);
    let notifications =
        state
            .service
            .notifier()
            .notifications_for(&query.user_id, query.unread_only, limit)?;
    Ok(Json(notifications))
}

async fn unread_count(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<CountResponse>, ServerError> {
    let count = state.service.notifier().unread_count(&query.user_id)?;
    Ok(Json(CountResponse { count }))
}

async fn mark_notification_read(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<UserQuery>,
) -> Result<Json<Notification>, ServerError> {
    let notification = state.service.notifier().mark_read(id, &query.user_id)?;
    Ok(Json(notification))
}

async fn mark_all_read(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<AffectedResponse>, ServerError> {
    let affected = state.service.notifier().mark_all_read(&query.user_id)?;
    Ok(Json(AffectedResponse { affected }))
}

async fn sweep_read(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<AffectedResponse>, ServerError> {
    let affected = state.service.notifier().sweep_read(&query.user_id)?;
    Ok(Json(AffectedResponse { affected }))
}

// ---------------------------------------------------------------------------
// Handlers: live streams
// ---------------------------------------------------------------------------

/// SSE bridge over the chat-room channel. A client that reconnects has
/// missed whatever was published while it was away and catches up via
/// the history endpoint; the stream only carries new events.
async fn stream_chat(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let topic = ChatId::from_raw(chat_id).chat_topic();
    let rx = state.service.broadcaster().subscribe(&topic).await;
    sse_from(rx)
}

/// SSE bridge over a user's personal inbox channel (cross-chat badge
/// updates).
async fn stream_inbox(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state
        .service
        .broadcaster()
        .subscribe(&inbox_topic(&user_id))
        .await;
    sse_from(rx)
}

fn sse_from(
    rx: mpsc::Receiver<BroadcastEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = ReceiverStream::new(rx).map(|event| {
        let data = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
        Ok(Event::default().event("update").data(data))
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

// ---------------------------------------------------------------------------
// Serve
// ---------------------------------------------------------------------------

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    tracing::info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
