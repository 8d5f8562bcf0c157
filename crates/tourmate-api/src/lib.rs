pub mod likes;
pub mod messages;
pub mod metadata;
pub mod middleware;
pub mod state;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};

pub use state::{AppState, AppStateInner};

/// Every HTTP route of the chat API. The realtime socket is mounted by the server.
pub fn routes(state: AppState) -> Router {
    let like_routes = Router::new()
        .route(
            "/posts/{post_id}/likes",
            get(likes::get_like).post(likes::add_like).delete(likes::remove_like),
        )
        .layer(axum_middleware::from_fn(middleware::require_viewer))
        .with_state(state.clone());

    Router::new()
        .route("/users", post(metadata::create_user))
        .route("/users/{user_id}", get(metadata::get_user))
        .route("/users/{user_id}/chats", get(messages::get_user_chats))
        .route("/posts", post(metadata::create_post))
        .route("/posts/{post_id}", get(metadata::get_post))
        .route("/posts/{post_id}/messages", get(messages::get_thread))
        .route("/messages", post(messages::send_message))
        .route("/messages/checked", post(messages::mark_checked))
        .with_state(state)
        .merge(like_routes)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use serde::de::DeserializeOwned;
    use tower::ServiceExt;
    use uuid::Uuid;

    use tourmate_db::Database;
    use tourmate_gateway::dispatcher::Dispatcher;
    use tourmate_types::api::{CreatedResponse, LikeStatus, MarkCheckedResponse, USER_ID_HEADER};
    use tourmate_types::models::{Message, PLACEHOLDER_IMAGE, UserSummary};

    use super::*;

    fn app() -> (Router, AppState) {
        let state = AppStateInner::new(Arc::new(Database::open_in_memory().unwrap()), Dispatcher::new());
        (routes(state.clone()), state)
    }

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn read<T: DeserializeOwned>(response: axum::response::Response) -> T {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn create_user(app: &Router, name: &str) -> Uuid {
        let body = serde_json::json!({ "name": name, "email": format!("{}@example.com", name), "avatar": null });
        let response = app.clone().oneshot(json_request("POST", "/users", body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        read::<CreatedResponse>(response).await.id
    }

    async fn create_post(app: &Router, user_id: Uuid) -> Uuid {
        let body = serde_json::json!({ "user_id": user_id, "title": "Andong mask festival", "content": null, "image": null });
        let response = app.clone().oneshot(json_request("POST", "/posts", body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        read::<CreatedResponse>(response).await.id
    }

    #[tokio::test]
    async fn send_publishes_and_mark_checked_updates() {
        let (app, state) = app();
        let guide = create_user(&app, "minji").await;
        let traveler = create_user(&app, "joon").await;
        let post = create_post(&app, guide).await;
        let mut rx = state.dispatcher.subscribe();

        let body = serde_json::json!({
            "sender_id": traveler, "receiver_id": guide, "content": "  hello  ", "post_id": post
        });
        let response = app.clone().oneshot(json_request("POST", "/messages", body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let sent: Message = read(response).await;
        assert_eq!(sent.content, "hello");
        assert_eq!(rx.recv().await.unwrap(), sent);

        let body = serde_json::json!({ "ids": [sent.id] });
        let response = app.clone().oneshot(json_request("POST", "/messages/checked", body)).await.unwrap();
        assert_eq!(read::<MarkCheckedResponse>(response).await.updated, 1);

        let uri = format!("/users/{}/chats", guide);
        let response = app.oneshot(Request::get(uri).body(Body::empty()).unwrap()).await.unwrap();
        let chats: Vec<Message> = read(response).await;
        assert!(chats[0].is_checked);
    }

    #[tokio::test]
    async fn blank_message_is_rejected() {
        let (app, _) = app();
        let body = serde_json::json!({
            "sender_id": Uuid::new_v4(), "receiver_id": Uuid::new_v4(), "content": "   ", "post_id": Uuid::new_v4()
        });
        let response = app.oneshot(json_request("POST", "/messages", body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn user_without_avatar_gets_placeholder_and_unknown_is_404() {
        let (app, _) = app();
        let id = create_user(&app, "sora").await;

        let response = app.clone().oneshot(Request::get(format!("/users/{}", id)).body(Body::empty()).unwrap()).await.unwrap();
        let user: UserSummary = read(response).await;
        assert_eq!(user.avatar, PLACEHOLDER_IMAGE);

        let response = app
            .oneshot(Request::get(format!("/users/{}", Uuid::new_v4())).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn likes_need_user_header() {
        let (app, _) = app();
        let guide = create_user(&app, "minji").await;
        let post = create_post(&app, guide).await;
        let uri = format!("/posts/{}/likes", post);

        let response = app.clone().oneshot(Request::post(&uri).body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let like = Request::post(&uri).header(USER_ID_HEADER, guide.to_string()).body(Body::empty()).unwrap();
        assert_eq!(app.clone().oneshot(like).await.unwrap().status(), StatusCode::OK);

        let status = Request::get(&uri).header(USER_ID_HEADER, guide.to_string()).body(Body::empty()).unwrap();
        let response = app.oneshot(status).await.unwrap();
        assert!(read::<LikeStatus>(response).await.exists);
    }
}
