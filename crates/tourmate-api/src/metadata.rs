use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{info, warn};
use uuid::Uuid;

use tourmate_types::api::{CreatePostRequest, CreateUserRequest, CreatedResponse};
use tourmate_types::models::{PostSummary, UserSummary};

use crate::state::AppState;

pub async fn get_post(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
) -> Result<impl IntoResponse, StatusCode> {
    let post = state
        .blocking("load post", move |db| {
            db.get_post(&post_id.to_string())?
                .map(PostSummary::try_from)
                .transpose()
        })
        .await?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(post))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, StatusCode> {
    let user = state
        .blocking("load user", move |db| {
            db.get_user(&user_id.to_string())?
                .map(UserSummary::try_from)
                .transpose()
        })
        .await?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(user))
}

pub async fn create_user(
    State(state): State<AppState>,
    Json(req): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let name = req.name.trim().to_string();
    let email = req.email.trim().to_lowercase();
    if name.is_empty() || !email.contains('@') {
        return Err(StatusCode::BAD_REQUEST);
    }

    let user_id = Uuid::new_v4();
    let db = state.db.clone();
    tokio::task::spawn_blocking(move || {
        db.create_user(&user_id.to_string(), &name, &email, req.avatar.as_deref())
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
    .map_err(|e| {
        warn!("User creation rejected: {:#}", e);
        StatusCode::CONFLICT
    })?;

    info!("Created user {}", user_id);
    Ok((StatusCode::CREATED, Json(CreatedResponse { id: user_id })))
}

pub async fn create_post(
    State(state): State<AppState>,
    Json(req): Json<CreatePostRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let title = req.title.trim().to_string();
    if title.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let post_id = Uuid::new_v4();
    let db = state.db.clone();
    tokio::task::spawn_blocking(move || {
        db.create_post(
            &post_id.to_string(),
            &req.user_id.to_string(),
            &title,
            req.content.as_deref(),
            req.image.as_deref(),
        )
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
    .map_err(|e| {
        warn!("Post creation rejected: {:#}", e);
        StatusCode::UNPROCESSABLE_ENTITY
    })?;

    info!("Created post {}", post_id);
    Ok((StatusCode::CREATED, Json(CreatedResponse { id: post_id })))
}
