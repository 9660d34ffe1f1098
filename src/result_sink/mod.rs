//! ResultSink - Detection Persistence, History and Broadcast
//!
//! `record` runs three independent best-effort steps in order: persist,
//! append to the recent-history ring, broadcast. None of them can fail the
//! call.

use crate::access_store::AccessStore;
use crate::event_log_service::{DetectionEvent, EventLogService};
use crate::realtime_hub::{HubMessage, RealtimeHub};
use std::sync::Arc;

/// ResultSink instance
pub struct ResultSink {
    store: Arc<dyn AccessStore>,
    event_log: Arc<EventLogService>,
    realtime_hub: Arc<RealtimeHub>,
}

impl ResultSink {
    pub fn new(
        store: Arc<dyn AccessStore>,
        event_log: Arc<EventLogService>,
        realtime_hub: Arc<RealtimeHub>,
    ) -> Self {
        Self {
            store,
            event_log,
            realtime_hub,
        }
    }

    /// Persist, remember and broadcast one detection
    pub async fn record(&self, event: DetectionEvent) {
        if let Err(e) = self.store.insert_detection(&event).await {
            tracing::error!(
                detection_id = %event.id,
                camera_id = %event.camera_id,
                error = %e,
                "Failed to persist detection"
            );
        }

        self.event_log.add_event(event.clone()).await;
        self.realtime_hub.broadcast(HubMessage::Detection(event)).await;
    }

    /// Recent-history ring, oldest first
    pub async fn recent(&self) -> Vec<DetectionEvent> {
        self.event_log.get_all().await
    }

    pub fn event_log(&self) -> &Arc<EventLogService> {
        &self.event_log
    }

    pub fn realtime_hub(&self) -> &Arc<RealtimeHub> {
        &self.realtime_hub
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access_store::{Camera, DetectionFilter, Door, MemoryAccessStore, PlateRecord};
    use crate::error::{Error, Result};
    use crate::event_log_service::PlateStatus;
    use async_trait::async_trait;
    use chrono::Utc;
    use uuid::Uuid;

    fn event(plate: &str) -> DetectionEvent {
        DetectionEvent {
            id: Uuid::new_v4(),
            camera_id: "cam-1".to_string(),
            plate: plate.to_string(),
            status: PlateStatus::Unknown,
            confidence: 0.7,
            timestamp: Utc::now(),
            image_base64: None,
            owner_info: None,
        }
    }

    /// Store whose writes always fail
    struct BrokenStore;

    #[async_trait]
    impl AccessStore for BrokenStore {
        async fn find_access_entry(&self, _plate: &str) -> Result<Option<PlateRecord>> {
            Ok(None)
        }
        async fn find_camera(&self, _camera_id: &str) -> Result<Option<Camera>> {
            Ok(None)
        }
        async fn find_door(&self, _door_id: &str) -> Result<Option<Door>> {
            Ok(None)
        }
        async fn insert_detection(&self, _event: &DetectionEvent) -> Result<()> {
            Err(Error::Internal("disk full".to_string()))
        }
        async fn count_detections(&self, _filter: &DetectionFilter) -> Result<u64> {
            Ok(0)
        }
        async fn list_detections(
            &self,
            _filter: &DetectionFilter,
            _limit: u32,
        ) -> Result<Vec<DetectionEvent>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_record_persists_stores_and_broadcasts() {
        let store = Arc::new(MemoryAccessStore::new());
        let hub = Arc::new(RealtimeHub::new());
        let sink = ResultSink::new(store.clone(), Arc::new(EventLogService::default()), hub.clone());
        let (_id, mut rx) = hub.register().await;

        sink.record(event("06XY999")).await;

        assert_eq!(store.detections().await.len(), 1);
        assert_eq!(sink.recent().await.len(), 1);
        let msg: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(msg["type"], "detection");
        assert_eq!(msg["data"]["plate"], "06XY999");
        assert!(msg["data"]["owner_info"].is_null());
    }

    #[tokio::test]
    async fn test_persist_failure_does_not_stop_broadcast() {
        let hub = Arc::new(RealtimeHub::new());
        let sink = ResultSink::new(
            Arc::new(BrokenStore),
            Arc::new(EventLogService::default()),
            hub.clone(),
        );
        let (_id, mut rx) = hub.register().await;

        sink.record(event("34ABC123")).await;

        assert_eq!(sink.recent().await.len(), 1);
        assert!(rx.recv().await.is_some());
    }
}
