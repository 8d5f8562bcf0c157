use std::sync::Arc;

use axum::http::StatusCode;
use tracing::error;

use tourmate_db::Database;
use tourmate_gateway::dispatcher::Dispatcher;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub dispatcher: Dispatcher,
}

impl AppStateInner {
    pub fn new(db: Arc<Database>, dispatcher: Dispatcher) -> AppState {
        Arc::new(Self { db, dispatcher })
    }

    /// Run a database call off the async runtime. Failures are logged and
    /// reported as 500.
    pub async fn blocking<T, F>(&self, what: &'static str, f: F) -> Result<T, StatusCode>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            })?
            .map_err(|e| {
                error!("{} failed: {:#}", what, e);
                StatusCode::INTERNAL_SERVER_ERROR
            })
    }
}
