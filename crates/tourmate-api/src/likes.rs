use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use tourmate_types::api::LikeStatus;

use crate::middleware::Viewer;
use crate::state::AppState;

pub async fn get_like(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
    Extension(Viewer(user_id)): Extension<Viewer>,
) -> Result<impl IntoResponse, StatusCode> {
    let exists = state
        .blocking("load like", move |db| {
            db.like_exists(&post_id.to_string(), &user_id.to_string())
        })
        .await?;

    Ok(Json(LikeStatus { exists }))
}

/// Idempotent: liking twice keeps one like.
pub async fn add_like(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
    Extension(Viewer(user_id)): Extension<Viewer>,
) -> Result<impl IntoResponse, StatusCode> {
    state
        .blocking("add like", move |db| {
            db.add_like(&post_id.to_string(), &user_id.to_string())
        })
        .await?;

    Ok(Json(LikeStatus { exists: true }))
}

pub async fn remove_like(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
    Extension(Viewer(user_id)): Extension<Viewer>,
) -> Result<impl IntoResponse, StatusCode> {
    state
        .blocking("remove like", move |db| {
            db.remove_like(&post_id.to_string(), &user_id.to_string())
        })
        .await?;

    Ok(Json(LikeStatus { exists: false }))
}
