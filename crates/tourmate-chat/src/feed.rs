use std::future::Future;

use futures_util::stream::BoxStream;
use tokio::sync::broadcast;

use tourmate_gateway::dispatcher::Dispatcher;
use tourmate_types::events::FeedFilter;
use tourmate_types::models::Message;

use crate::error::SubscriptionError;

/// Inserted messages matching a filter, in insertion order. An `Err` item
/// means the connection is no longer trustworthy and the stream should be
/// dropped and reopened.
pub type FeedStream = BoxStream<'static, Result<Message, SubscriptionError>>;

/// A push service that notifies on newly inserted messages.
///
/// No replay: anything inserted while no stream is open is never delivered.
pub trait RealtimeFeed: Send + Sync {
    fn open(
        &self,
        filter: FeedFilter,
    ) -> impl Future<Output = Result<FeedStream, SubscriptionError>> + Send;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Subscribed,
    Error(String),
    Closed,
}

/// What a [`Subscription`](crate::Subscription) yields.
#[derive(Debug, Clone)]
pub enum SubscriptionEvent {
    State(ConnectionState),
    Message(Message),
}

/// In-process feed straight off the gateway dispatcher.
impl RealtimeFeed for Dispatcher {
    async fn open(&self, filter: FeedFilter) -> Result<FeedStream, SubscriptionError> {
        let mut rx = self.subscribe();
        let stream = async_stream::stream! {
            loop {
                match rx.recv().await {
                    Ok(message) => {
                        if filter.matches(&message) {
                            yield Ok(message);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        yield Err(SubscriptionError::Lagged(skipped));
                        break;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        };
        Ok(Box::pin(stream))
    }
}
