//! In-memory AccessStore
//!
//! Used when no DATABASE_URL is configured and by the test suites.

use super::types::*;
use super::AccessStore;
use crate::error::Result;
use crate::event_log_service::DetectionEvent;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::RwLock;

/// Initial contents of a volatile store, read from JSON
#[derive(Debug, Default, Deserialize)]
pub struct StoreSeed {
    #[serde(default)]
    pub cameras: Vec<Camera>,
    #[serde(default)]
    pub doors: Vec<Door>,
    #[serde(default)]
    pub plates: Vec<PlateRecord>,
}

/// Volatile store holding everything in maps
#[derive(Default)]
pub struct MemoryAccessStore {
    cameras: RwLock<HashMap<String, Camera>>,
    doors: RwLock<HashMap<String, Door>>,
    records: RwLock<Vec<PlateRecord>>,
    detections: RwLock<Vec<DetectionEvent>>,
}

impl MemoryAccessStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn from_seed(seed: StoreSeed) -> Result<Self> {
        let store = Self::new();
        for camera in seed.cameras {
            store.upsert_camera(camera).await;
        }
        for door in seed.doors {
            store.upsert_door(door).await;
        }
        for record in seed.plates {
            store.upsert_record(record).await?;
        }
        Ok(store)
    }

    /// Store seeded from a JSON file with `cameras`, `doors` and `plates`
    pub async fn load_seed_file(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path).await?;
        let seed: StoreSeed = serde_json::from_str(&raw)?;
        tracing::info!(
            path = %path.display(),
            cameras = seed.cameras.len(),
            doors = seed.doors.len(),
            plates = seed.plates.len(),
            "Loaded store seed"
        );
        Self::from_seed(seed).await
    }

    pub async fn upsert_camera(&self, camera: Camera) {
        self.cameras
            .write()
            .await
            .insert(camera.camera_id.clone(), camera);
    }

    pub async fn upsert_door(&self, door: Door) {
        self.doors.write().await.insert(door.door_id.clone(), door);
    }

    pub async fn upsert_record(&self, record: PlateRecord) -> Result<()> {
        record.validate()?;
        let mut records = self.records.write().await;
        records.retain(|r| r.plate_id != record.plate_id);
        records.push(record);
        Ok(())
    }

    /// All persisted detections in insertion order
    pub async fn detections(&self) -> Vec<DetectionEvent> {
        self.detections.read().await.clone()
    }
}

#[async_trait]
impl AccessStore for MemoryAccessStore {
    async fn find_access_entry(&self, plate: &str) -> Result<Option<PlateRecord>> {
        let records = self.records.read().await;
        Ok(records.iter().find(|r| r.contains_plate(plate)).cloned())
    }

    async fn find_camera(&self, camera_id: &str) -> Result<Option<Camera>> {
        Ok(self.cameras.read().await.get(camera_id).cloned())
    }

    async fn find_door(&self, door_id: &str) -> Result<Option<Door>> {
        Ok(self.doors.read().await.get(door_id).cloned())
    }

    async fn insert_detection(&self, event: &DetectionEvent) -> Result<()> {
        self.detections.write().await.push(event.clone());
        Ok(())
    }

    async fn count_detections(&self, filter: &DetectionFilter) -> Result<u64> {
        let detections = self.detections.read().await;
        Ok(detections.iter().filter(|e| filter.matches(e)).count() as u64)
    }

    async fn list_detections(
        &self,
        filter: &DetectionFilter,
        limit: u32,
    ) -> Result<Vec<DetectionEvent>> {
        let detections = self.detections.read().await;
        let mut matched: Vec<DetectionEvent> = detections
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        matched.truncate(limit as usize);
        Ok(matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_log_service::PlateStatus;
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    fn event(plate: &str, status: PlateStatus, minutes_ago: i64) -> DetectionEvent {
        DetectionEvent {
            id: Uuid::new_v4(),
            camera_id: "cam-1".to_string(),
            plate: plate.to_string(),
            status,
            confidence: 0.9,
            timestamp: Utc::now() - Duration::minutes(minutes_ago),
            image_base64: None,
            owner_info: None,
        }
    }

    #[tokio::test]
    async fn test_find_access_entry_matches_any_registered_plate() {
        let store = MemoryAccessStore::new();
        store
            .upsert_record(PlateRecord {
                plate_id: "p1".to_string(),
                site_id: "s1".to_string(),
                block_name: "B Blok".to_string(),
                apartment_number: "4".to_string(),
                owner_name: "Mehmet Kaya".to_string(),
                plates: vec!["34ABC123".to_string(), "06XY999".to_string()],
                valid_until: "2030-01-01".to_string(),
                status: AccessStatus::Allowed,
            })
            .await
            .unwrap();

        let found = store.find_access_entry("06XY999").await.unwrap();
        assert_eq!(found.map(|r| r.plate_id), Some("p1".to_string()));
        assert!(store.find_access_entry("35ZZ001").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_count_and_list_with_filter() {
        let store = MemoryAccessStore::new();
        store.insert_detection(&event("34ABC123", PlateStatus::Allowed, 30)).await.unwrap();
        store.insert_detection(&event("06XY999", PlateStatus::Unknown, 20)).await.unwrap();
        store.insert_detection(&event("35ZZ001", PlateStatus::Blocked, 10)).await.unwrap();

        let all = DetectionFilter::default();
        assert_eq!(store.count_detections(&all).await.unwrap(), 3);

        let unknown = DetectionFilter::default().with_status(PlateStatus::Unknown);
        assert_eq!(store.count_detections(&unknown).await.unwrap(), 1);

        let recent = DetectionFilter::since(Utc::now() - Duration::minutes(25));
        let listed = store.list_detections(&recent, 10).await.unwrap();
        assert_eq!(listed.len(), 2);
        // newest first
        assert_eq!(listed[0].plate, "35ZZ001");

        let limited = store.list_detections(&all, 1).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn test_seed_rejects_oversized_record() {
        let json = r#"{
            "cameras": [{"camera_id":"cam-1","name":"Gate","origin_kind":"rtsp",
                         "origin":"rtsp://10.0.0.9/live","door_id":"d1","fps":10,
                         "enabled":true,"position":0}],
            "plates": [{"plate_id":"p1","site_id":"s1","block_name":"A","apartment_number":"1",
                        "owner_name":"X","plates":["A","B","C","D"],
                        "valid_until":"2030-01-01","status":"allowed"}]
        }"#;
        let seed: StoreSeed = serde_json::from_str(json).unwrap();
        assert_eq!(seed.cameras[0].origin_kind, OriginKind::NetworkStream);
        assert!(MemoryAccessStore::from_seed(seed).await.is_err());
    }
}
