use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use tourmate_api::{AppState, AppStateInner};
use tourmate_db::Database;
use tourmate_gateway::connection;
use tourmate_gateway::dispatcher::Dispatcher;

/// Server settings from `TOURMATE_DB_PATH`, `TOURMATE_HOST` and `TOURMATE_PORT`.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub db_path: PathBuf,
    pub addr: SocketAddr,
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let db_path = std::env::var("TOURMATE_DB_PATH").unwrap_or_else(|_| "tourmate.db".into());
        let host = std::env::var("TOURMATE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = std::env::var("TOURMATE_PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .context("TOURMATE_PORT must be a port number")?;

        Ok(Self {
            db_path: PathBuf::from(db_path),
            addr: format!("{}:{}", host, port).parse()?,
        })
    }
}

/// The HTTP API plus the `/realtime` WebSocket, sharing one dispatcher.
pub fn app(db: Arc<Database>, dispatcher: Dispatcher) -> Router {
    let state = AppStateInner::new(db, dispatcher);

    let ws_route = Router::new()
        .route("/realtime", get(ws_upgrade))
        .with_state(state.clone());

    tourmate_api::routes(state)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    let dispatcher = state.dispatcher.clone();
    ws.on_upgrade(move |socket| connection::handle_connection(socket, dispatcher))
}
