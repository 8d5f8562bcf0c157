use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, watch};
use tracing::{info, trace, warn};
use uuid::Uuid;

use tourmate_types::events::{FeedCommand, FeedEvent, FeedFilter};

use crate::dispatcher::Dispatcher;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// A client must send its first Subscribe within this window.
const SUBSCRIBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Handle a single realtime WebSocket connection.
///
/// The client opens with `FeedCommand::Subscribe`; the server confirms with
/// `FeedEvent::Subscribed` and then forwards every insert matching the
/// current filter. Later Subscribe commands replace the filter.
pub async fn handle_connection(socket: WebSocket, dispatcher: Dispatcher) {
    let (mut sender, mut receiver) = socket.split();

    let filter = match wait_for_subscribe(&mut receiver).await {
        Some(filter) => filter,
        None => {
            warn!("Realtime client never subscribed, closing");
            return;
        }
    };

    // Take the broadcast receiver before confirming, so nothing published
    // after the client sees Subscribed can be missed.
    let broadcast_rx = dispatcher.subscribe();
    let conn_id = Uuid::new_v4();
    info!("Realtime connection {} subscribed with {:?}", conn_id, filter);

    if !send_event(&mut sender, &FeedEvent::Subscribed { filter }).await {
        return;
    }

    let (filter_tx, filter_rx) = watch::channel(filter);

    // Shared flag for heartbeat
    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    let mut send_task = tokio::spawn(run_send_loop(sender, broadcast_rx, filter_rx, pong_flag_send));

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<FeedCommand>(text.as_str()) {
                    Ok(FeedCommand::Subscribe { filter }) => {
                        info!("Realtime connection {} now filtering {:?}", conn_id, filter);
                        filter_tx.send_replace(filter);
                    }
                    Err(e) => {
                        warn!(
                            "Realtime connection {} bad command: {} -- raw: {}",
                            conn_id,
                            e,
                            text.chars().take(200).collect::<String>()
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    info!("Realtime connection {} closed", conn_id);
}

async fn run_send_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut broadcast_rx: broadcast::Receiver<tourmate_types::models::Message>,
    mut filter_rx: watch::Receiver<FeedFilter>,
    pong_flag: Arc<AtomicBool>,
) {
    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await;
    let mut missed_heartbeats: u8 = 0;

    loop {
        tokio::select! {
            result = broadcast_rx.recv() => {
                let event = match result {
                    Ok(message) => {
                        if !filter_rx.borrow().matches(&message) {
                            continue;
                        }
                        trace!("Forwarding message {}", message.id);
                        FeedEvent::MessageInsert { message }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Broadcast receiver lagged by {} messages", skipped);
                        FeedEvent::Lagged { skipped }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };

                if !send_event(&mut sender, &event).await {
                    break;
                }
            }
            changed = filter_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let filter = *filter_rx.borrow_and_update();
                if !send_event(&mut sender, &FeedEvent::Subscribed { filter }).await {
                    break;
                }
            }
            _ = heartbeat.tick() => {
                if pong_flag.swap(false, Ordering::Acquire) {
                    missed_heartbeats = 0;
                } else {
                    missed_heartbeats += 1;
                    if missed_heartbeats >= 2 {
                        warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                        break;
                    }
                }
                if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
        }
    }
}

async fn wait_for_subscribe(receiver: &mut SplitStream<WebSocket>) -> Option<FeedFilter> {
    let timeout = tokio::time::timeout(SUBSCRIBE_TIMEOUT, async {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                if let Ok(FeedCommand::Subscribe { filter }) = serde_json::from_str::<FeedCommand>(text.as_str()) {
                    return Some(filter);
                }
            }
        }
        None
    });

    timeout.await.ok().flatten()
}

/// Returns false once the socket is gone.
async fn send_event(sender: &mut SplitSink<WebSocket, Message>, event: &FeedEvent) -> bool {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            warn!("Failed to encode feed event: {}", e);
            return true;
        }
    };
    sender.send(Message::Text(text.into())).await.is_ok()
}
