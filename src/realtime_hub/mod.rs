//! RealtimeHub - WebSocket Distribution
//!
//! ## Responsibilities
//!
//! - Subscriber registration (one entry per WebSocket connection)
//! - Detection event broadcasting
//! - Camera worker status notifications
//!
//! Delivery is independent per subscriber: a subscriber whose channel is
//! closed is dropped from the set and never affects the others.

use crate::event_log_service::DetectionEvent;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Hub message types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
#[serde(rename_all = "snake_case")]
pub enum HubMessage {
    Detection(DetectionEvent),
    CameraStatus(CameraStatusMessage),
}

impl HubMessage {
    fn kind(&self) -> &'static str {
        match self {
            HubMessage::Detection(_) => "detection",
            HubMessage::CameraStatus(_) => "camera_status",
        }
    }
}

/// Camera status message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CameraStatusMessage {
    pub camera_id: String,
    /// Worker running
    pub active: bool,
    /// Worker serving placeholder frames
    pub simulated: bool,
    pub timestamp: String,
}

/// Client connection
struct ClientConnection {
    tx: mpsc::UnboundedSender<String>,
}

/// RealtimeHub instance
pub struct RealtimeHub {
    connections: RwLock<HashMap<Uuid, ClientConnection>>,
    connection_count: AtomicU64,
}

impl RealtimeHub {
    /// Create new RealtimeHub
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            connection_count: AtomicU64::new(0),
        }
    }

    /// Register a new subscriber
    pub async fn register(&self) -> (Uuid, mpsc::UnboundedReceiver<String>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();

        {
            let mut connections = self.connections.write().await;
            connections.insert(id, ClientConnection { tx });
        }

        self.connection_count.fetch_add(1, Ordering::Relaxed);

        tracing::info!(connection_id = %id, "Client connected");

        (id, rx)
    }

    /// Unregister a subscriber
    pub async fn unregister(&self, id: &Uuid) {
        let mut connections = self.connections.write().await;
        if connections.remove(id).is_some() {
            self.connection_count.fetch_sub(1, Ordering::Relaxed);
            tracing::info!(connection_id = %id, "Client disconnected");
        }
    }

    /// Broadcast message to all subscribers, dropping the ones that fail
    pub async fn broadcast(&self, message: HubMessage) {
        let msg_type = message.kind();

        let json = match serde_json::to_string(&message) {
            Ok(j) => j,
            Err(e) => {
                tracing::error!(message_type = %msg_type, error = %e, "Failed to serialize message");
                return;
            }
        };

        let failed: Vec<Uuid> = {
            let connections = self.connections.read().await;
            tracing::debug!(
                message_type = %msg_type,
                client_count = connections.len(),
                "Broadcasting message to clients"
            );

            connections
                .iter()
                .filter_map(|(id, conn)| match conn.tx.send(json.clone()) {
                    Ok(()) => None,
                    Err(e) => {
                        tracing::warn!(connection_id = %id, error = %e, "Failed to send message");
                        Some(*id)
                    }
                })
                .collect()
        };

        for id in failed {
            self.unregister(&id).await;
        }
    }

    /// Get connection count
    pub fn connection_count(&self) -> u64 {
        self.connection_count.load(Ordering::Relaxed)
    }
}

impl Default for RealtimeHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_log_service::PlateStatus;
    use chrono::Utc;

    fn detection() -> HubMessage {
        HubMessage::Detection(DetectionEvent {
            id: Uuid::new_v4(),
            camera_id: "cam-1".to_string(),
            plate: "34ABC123".to_string(),
            status: PlateStatus::Allowed,
            confidence: 0.91,
            timestamp: Utc::now(),
            image_base64: None,
            owner_info: None,
        })
    }

    #[test]
    fn test_detection_envelope() {
        let json = serde_json::to_value(detection()).unwrap();
        assert_eq!(json["type"], "detection");
        assert_eq!(json["data"]["plate"], "34ABC123");
        assert_eq!(json["data"]["status"], "allowed");
    }

    #[tokio::test]
    async fn test_failed_subscriber_is_dropped_others_still_receive() {
        let hub = RealtimeHub::new();
        let (_a, mut rx_a) = hub.register().await;
        let (_b, rx_b) = hub.register().await;
        assert_eq!(hub.connection_count(), 2);

        drop(rx_b);
        hub.broadcast(detection()).await;

        let msg = rx_a.recv().await.unwrap();
        assert!(msg.contains("\"type\":\"detection\""));
        assert_eq!(hub.connection_count(), 1);

        hub.broadcast(detection()).await;
        assert!(rx_a.recv().await.is_some());
        assert_eq!(hub.connection_count(), 1);
    }

    #[tokio::test]
    async fn test_unregister_is_idempotent() {
        let hub = RealtimeHub::new();
        let (id, _rx) = hub.register().await;
        hub.unregister(&id).await;
        hub.unregister(&id).await;
        assert_eq!(hub.connection_count(), 0);
    }
}
