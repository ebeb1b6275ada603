//! Live collaboration relay.
//!
//! Each document gets a broadcast channel. Every frame a peer sends is
//! relayed to the other peers connected to the same document; nothing is
//! persisted.

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

/// Frames buffered per document before slow peers start lagging.
const CHANNEL_CAPACITY: usize = 64;

/// A frame relayed between peers of one document.
#[derive(Debug, Clone)]
pub struct CollabFrame {
    /// Peer that sent the frame; it is not echoed back to them
    pub from: u64,
    pub message: Message,
}

/// Tracks connected peers per document.
pub struct CollabHub {
    channels: RwLock<HashMap<String, broadcast::Sender<CollabFrame>>>,
    next_peer: AtomicU64,
}

impl CollabHub {
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            next_peer: AtomicU64::new(1),
        }
    }

    /// Joins a document, returning the new peer's id and its receiver.
    pub async fn join(&self, document_id: &str) -> (u64, broadcast::Receiver<CollabFrame>) {
        let peer = self.next_peer.fetch_add(1, Ordering::Relaxed);
        let mut channels = self.channels.write().await;

        let receiver = match channels.get(document_id) {
            Some(sender) => sender.subscribe(),
            None => {
                let (sender, receiver) = broadcast::channel(CHANNEL_CAPACITY);
                channels.insert(document_id.to_string(), sender);
                receiver
            }
        };
        (peer, receiver)
    }

    /// Relays a frame to every peer of the document.
    pub async fn broadcast(&self, document_id: &str, frame: CollabFrame) {
        let channels = self.channels.read().await;
        if let Some(sender) = channels.get(document_id) {
            // No subscribers is fine
            let _ = sender.send(frame);
        }
    }

    /// Drops the document's channel once its last peer is gone.
    pub async fn leave(&self, document_id: &str) {
        let mut channels = self.channels.write().await;
        if channels
            .get(document_id)
            .is_some_and(|sender| sender.receiver_count() == 0)
        {
            channels.remove(document_id);
        }
    }

    /// Number of peers connected to a document.
    pub async fn peer_count(&self, document_id: &str) -> usize {
        self.channels
            .read()
            .await
            .get(document_id)
            .map_or(0, |sender| sender.receiver_count())
    }

    /// Number of documents with connected peers.
    pub async fn active_documents(&self) -> usize {
        self.channels.read().await.len()
    }
}

impl Default for CollabHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Relays frames between `socket` and the other peers of `document_id`
/// until either side closes.
pub async fn handle_socket(socket: WebSocket, hub: Arc<CollabHub>, document_id: String) {
    let (peer, mut receiver) = hub.join(&document_id).await;
    tracing::info!(%document_id, peer, "collaboration peer connected");

    let (mut ws_tx, mut ws_rx) = socket.split();

    let mut outgoing = tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(frame) if frame.from == peer => continue,
                Ok(frame) => {
                    if ws_tx.send(frame.message).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(peer, skipped, "collaboration peer lagging; frames dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let incoming_hub = hub.clone();
    let incoming_doc = document_id.clone();
    let mut incoming = tokio::spawn(async move {
        while let Some(Ok(message)) = ws_rx.next().await {
            match message {
                Message::Text(_) | Message::Binary(_) => {
                    incoming_hub
                        .broadcast(&incoming_doc, CollabFrame { from: peer, message })
                        .await;
                }
                Message::Close(_) => break,
                // Ping/pong are answered by axum
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut outgoing => incoming.abort(),
        _ = &mut incoming => outgoing.abort(),
    }

    // Wait for the aborted task so its receiver is dropped before pruning.
    let _ = outgoing.await;
    let _ = incoming.await;
    hub.leave(&document_id).await;
    tracing::info!(%document_id, peer, "collaboration peer disconnected");
}
