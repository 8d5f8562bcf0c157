use futures_util::{SinkExt, StreamExt};
use reqwest::Client;
use serde::de::DeserializeOwned;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, warn};
use uuid::Uuid;

use tourmate_types::api::{LikeStatus, MarkCheckedRequest, MarkCheckedResponse, SendMessageRequest, ThreadQuery, USER_ID_HEADER};
use tourmate_types::events::{FeedCommand, FeedEvent, FeedFilter};
use tourmate_types::models::{Message, PostSummary, ThreadMessage, UserSummary};

use crate::config::ClientConfig;
use crate::error::{StoreError, SubscriptionError};
use crate::feed::{FeedStream, RealtimeFeed};
use crate::store::{LikeStore, MessageStore, MetadataSource};

/// Message, metadata and like stores over the server's HTTP API.
#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.api_url.clone())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, StoreError> {
        let response = self.client.get(self.url(path)).send().await?.error_for_status()?;
        Ok(response.json().await?)
    }
}

impl MessageStore for HttpBackend {
    async fn messages_for_user(&self, user_id: Uuid) -> Result<Vec<Message>, StoreError> {
        self.get_json(&format!("/users/{}/chats", user_id)).await
    }

    async fn thread(&self, post_id: Uuid, user_a: Uuid, user_b: Uuid) -> Result<Vec<ThreadMessage>, StoreError> {
        let response = self
            .client
            .get(self.url(&format!("/posts/{}/messages", post_id)))
            .query(&ThreadQuery { user_a, user_b })
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    async fn send(&self, request: SendMessageRequest) -> Result<Message, StoreError> {
        let response = self
            .client
            .post(self.url("/messages"))
            .json(&request)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    async fn mark_checked(&self, ids: &[i64]) -> Result<usize, StoreError> {
        let request = MarkCheckedRequest { ids: ids.to_vec() };
        let response = self
            .client
            .post(self.url("/messages/checked"))
            .json(&request)
            .send()
            .await?
            .error_for_status()?;
        let body: MarkCheckedResponse = response.json().await?;
        Ok(body.updated)
    }
}

impl MetadataSource for HttpBackend {
    async fn post(&self, id: Uuid) -> Result<PostSummary, StoreError> {
        self.get_json(&format!("/posts/{}", id)).await
    }

    async fn user(&self, id: Uuid) -> Result<UserSummary, StoreError> {
        self.get_json(&format!("/users/{}", id)).await
    }
}

impl LikeStore for HttpBackend {
    async fn like_status(&self, post_id: Uuid, user_id: Uuid) -> Result<bool, StoreError> {
        let response = self
            .client
            .get(self.url(&format!("/posts/{}/likes", post_id)))
            .header(USER_ID_HEADER, user_id.to_string())
            .send()
            .await?
            .error_for_status()?;
        let status: LikeStatus = response.json().await?;
        Ok(status.exists)
    }

    async fn set_like(&self, post_id: Uuid, user_id: Uuid, liked: bool) -> Result<(), StoreError> {
        let url = self.url(&format!("/posts/{}/likes", post_id));
        let request = if liked {
            self.client.post(url)
        } else {
            self.client.delete(url)
        };
        request
            .header(USER_ID_HEADER, user_id.to_string())
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Realtime feed over the server's `/realtime` WebSocket.
#[derive(Debug, Clone)]
pub struct WsFeed {
    url: String,
}

impl WsFeed {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.realtime_url.clone())
    }
}

impl RealtimeFeed for WsFeed {
    async fn open(&self, filter: FeedFilter) -> Result<FeedStream, SubscriptionError> {
        let (ws_stream, _) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(|e| SubscriptionError::Connect(e.to_string()))?;
        let (mut ws_tx, mut ws_rx) = ws_stream.split();

        let subscribe = serde_json::to_string(&FeedCommand::Subscribe { filter })
            .map_err(|e| SubscriptionError::Protocol(e.to_string()))?;
        ws_tx
            .send(WsMessage::Text(subscribe.into()))
            .await
            .map_err(|e| SubscriptionError::Connect(e.to_string()))?;

        // Inserts are only delivered once the server acknowledged the filter.
        loop {
            match ws_rx.next().await {
                Some(Ok(WsMessage::Text(text))) => match serde_json::from_str::<FeedEvent>(text.as_str()) {
                    Ok(FeedEvent::Subscribed { .. }) => break,
                    Ok(other) => debug!("Ignoring {:?} before subscribe ack", other),
                    Err(e) => return Err(SubscriptionError::Protocol(e.to_string())),
                },
                Some(Ok(WsMessage::Close(_))) | None => {
                    return Err(SubscriptionError::Connect("closed before subscribe ack".into()));
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(SubscriptionError::Connect(e.to_string())),
            }
        }

        let stream = async_stream::stream! {
            loop {
                match ws_rx.next().await {
                    Some(Ok(WsMessage::Text(text))) => match serde_json::from_str::<FeedEvent>(text.as_str()) {
                        Ok(FeedEvent::MessageInsert { message }) => yield Ok(message),
                        Ok(FeedEvent::Lagged { skipped }) => {
                            yield Err(SubscriptionError::Lagged(skipped));
                            break;
                        }
                        Ok(FeedEvent::Subscribed { .. }) => {}
                        Err(e) => {
                            let preview: String = text.as_str().chars().take(200).collect();
                            warn!("Unparseable feed event: {} (raw: {})", e, preview);
                            yield Err(SubscriptionError::Protocol(e.to_string()));
                            break;
                        }
                    },
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        yield Err(SubscriptionError::Connect(e.to_string()));
                        break;
                    }
                }
            }
            // The write half lives as long as the stream so the socket stays open.
            let _ = ws_tx.close().await;
        };
        Ok(Box::pin(stream))
    }
}
