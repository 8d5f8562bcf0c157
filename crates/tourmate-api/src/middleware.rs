use axum::{extract::Request, http::StatusCode, middleware::Next, response::Response};
use uuid::Uuid;

use tourmate_types::api::USER_ID_HEADER;

/// The acting user, taken from the `user-id` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewer(pub Uuid);

/// Reject requests without a valid `user-id` header.
pub async fn require_viewer(mut req: Request, next: Next) -> Result<Response, StatusCode> {
    let viewer = req
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<Uuid>().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    req.extensions_mut().insert(Viewer(viewer));
    Ok(next.run(req).await)
}
