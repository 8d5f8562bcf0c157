use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use tracing::{debug, error, warn};
use uuid::Uuid;

use tourmate_types::api::{MarkCheckedRequest, MarkCheckedResponse, SendMessageRequest, ThreadQuery};
use tourmate_types::models::{Message, ThreadMessage};

use crate::state::AppState;

/// Every message the user sent or received, newest first.
pub async fn get_user_chats(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, StatusCode> {
    let messages = state
        .blocking("load chats", move |db| {
            db.get_messages_for_user(&user_id.to_string())?
                .into_iter()
                .map(Message::try_from)
                .collect::<anyhow::Result<Vec<_>>>()
        })
        .await?;

    Ok(Json(messages))
}

/// The thread between `user_a` and `user_b` about a post, oldest first.
pub async fn get_thread(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
    Query(query): Query<ThreadQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    let thread = state
        .blocking("load thread", move |db| {
            db.get_thread(&post_id.to_string(), &query.user_a.to_string(), &query.user_b.to_string())?
                .into_iter()
                .map(ThreadMessage::try_from)
                .collect::<anyhow::Result<Vec<_>>>()
        })
        .await?;

    Ok(Json(thread))
}

pub async fn send_message(
    State(state): State<AppState>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let content = req.content.trim().to_string();
    if content.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    if req.sender_id == req.receiver_id {
        warn!("Rejected message from {} to themselves", req.sender_id);
        return Err(StatusCode::BAD_REQUEST);
    }

    let db = state.db.clone();
    let row = tokio::task::spawn_blocking(move || {
        db.insert_message(
            &req.sender_id.to_string(),
            &req.receiver_id.to_string(),
            &req.post_id.to_string(),
            &content,
            Utc::now(),
        )
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?
    .map_err(|e| {
        // Unknown sender, receiver or post trips a foreign key.
        warn!("Message insert rejected: {:#}", e);
        StatusCode::UNPROCESSABLE_ENTITY
    })?;

    let message = Message::try_from(row).map_err(|e| {
        error!("Stored message is unreadable: {:#}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    // Broadcast to realtime subscribers
    state.dispatcher.publish(message.clone());

    Ok((StatusCode::CREATED, Json(message)))
}

/// Set `is_checked` on a batch of messages in one statement.
pub async fn mark_checked(
    State(state): State<AppState>,
    Json(req): Json<MarkCheckedRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let requested = req.ids.len();
    let updated = state
        .blocking("mark checked", move |db| db.mark_messages_checked(&req.ids))
        .await?;
    debug!("Marked {} of {} messages checked", updated, requested);

    Ok(Json(MarkCheckedResponse { updated }))
}
