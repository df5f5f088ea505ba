use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::RwLock;
use warp::ws::Message;

use crate::messages::ServerMessage;
use crate::session::ConnectionId;

type Connections = Arc<RwLock<HashMap<ConnectionId, mpsc::UnboundedSender<Message>>>>;

/// Fan-out over all live connections plus point-to-point delivery to
/// one. Delivery is best-effort: a connection whose receiver is gone
/// simply misses the message.
#[derive(Clone)]
pub struct Broadcaster {
    connections: Connections,
}

impl Broadcaster {
    pub fn new() -> Self {
        Broadcaster {
            connections: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn add(&self, id: ConnectionId, sender: mpsc::UnboundedSender<Message>) {
        let mut connections = self.connections.write().await;
        connections.insert(id, sender);
    }

    pub async fn remove(&self, id: ConnectionId) {
        let mut connections = self.connections.write().await;
        connections.remove(&id);
    }

    pub async fn broadcast_all(&self, message: &ServerMessage) {
        if let Ok(msg) = serde_json::to_string(message) {
            let connections = self.connections.read().await;
            for sender in connections.values() {
                let _ = sender.send(Message::text(msg.clone()));
            }
        }
    }

    pub async fn send_to(&self, id: ConnectionId, message: &ServerMessage) {
        if let Ok(msg) = serde_json::to_string(message) {
            let connections = self.connections.read().await;
            if let Some(sender) = connections.get(&id) {
                let _ = sender.send(Message::text(msg));
            }
        }
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}
