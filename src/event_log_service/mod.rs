//! EventLogService - Detection Events (Ring Buffer)
//!
//! ## Responsibilities
//!
//! - Detection event types shared by the pipeline, store and API
//! - Bounded recent-history ring (oldest evicted first)
//! - Recent event queries

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Default ring capacity
pub const DEFAULT_RECENT_CAPACITY: usize = 20;

/// Outcome of an access-list lookup
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PlateStatus {
    Allowed,
    Blocked,
    Unknown,
}

impl PlateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlateStatus::Allowed => "allowed",
            PlateStatus::Blocked => "blocked",
            PlateStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for PlateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlateStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "allowed" => Ok(PlateStatus::Allowed),
            "blocked" => Ok(PlateStatus::Blocked),
            "unknown" => Ok(PlateStatus::Unknown),
            other => Err(Error::Validation(format!("Unknown plate status: {}", other))),
        }
    }
}

/// Owner summary attached to detections of registered plates
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OwnerInfo {
    pub owner_name: String,
    /// "<block> - <number>"
    pub apartment: String,
}

/// Detection event
///
/// Created once per accepted plate read; never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetectionEvent {
    pub id: Uuid,
    pub camera_id: String,
    pub plate: String,
    pub status: PlateStatus,
    pub confidence: f32,
    pub timestamp: DateTime<Utc>,
    /// Annotated JPEG, base64
    pub image_base64: Option<String>,
    pub owner_info: Option<OwnerInfo>,
}

/// Ring buffer for events
struct EventRingBuffer {
    events: VecDeque<DetectionEvent>,
    capacity: usize,
}

impl EventRingBuffer {
    fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, event: DetectionEvent) {
        if self.events.len() >= self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }
}

/// EventLogService instance
pub struct EventLogService {
    buffer: RwLock<EventRingBuffer>,
}

impl EventLogService {
    /// Create new EventLogService
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: RwLock::new(EventRingBuffer::new(capacity)),
        }
    }

    /// Add event, evicting the oldest one when full
    pub async fn add_event(&self, event: DetectionEvent) {
        let mut buffer = self.buffer.write().await;
        let id = event.id;
        buffer.push(event);
        tracing::debug!(detection_id = %id, len = buffer.events.len(), "Event added to ring buffer");
    }

    /// Ring entries of one camera, in insertion order
    pub async fn get_by_camera(&self, camera_id: &str) -> Vec<DetectionEvent> {
        let buffer = self.buffer.read().await;
        buffer
            .events
            .iter()
            .filter(|e| e.camera_id == camera_id)
            .cloned()
            .collect()
    }

    /// Whole ring in insertion order
    pub async fn get_all(&self) -> Vec<DetectionEvent> {
        let buffer = self.buffer.read().await;
        buffer.events.iter().cloned().collect()
    }

    /// Get event count
    pub async fn count(&self) -> usize {
        let buffer = self.buffer.read().await;
        buffer.events.len()
    }
}

impl Default for EventLogService {
    fn default() -> Self {
        Self::new(DEFAULT_RECENT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(camera_id: &str, plate: &str) -> DetectionEvent {
        DetectionEvent {
            id: Uuid::new_v4(),
            camera_id: camera_id.to_string(),
            plate: plate.to_string(),
            status: PlateStatus::Unknown,
            confidence: 0.8,
            timestamp: Utc::now(),
            image_base64: None,
            owner_info: None,
        }
    }

    #[tokio::test]
    async fn test_ring_keeps_last_capacity_events_in_order() {
        let log = EventLogService::default();
        let plates: Vec<String> = (0..25).map(|i| format!("34AB{:03}", i)).collect();
        for plate in &plates {
            log.add_event(event("cam-1", plate)).await;
        }

        let all = log.get_all().await;
        assert_eq!(all.len(), DEFAULT_RECENT_CAPACITY);
        let kept: Vec<&str> = all.iter().map(|e| e.plate.as_str()).collect();
        let expected: Vec<&str> = plates[5..].iter().map(|s| s.as_str()).collect();
        assert_eq!(kept, expected);
    }

    #[tokio::test]
    async fn test_by_camera_filters_ring_in_order() {
        let log = EventLogService::new(3);
        log.add_event(event("cam-1", "34AA100")).await;
        log.add_event(event("cam-1", "34AA200")).await;
        log.add_event(event("cam-2", "34AA300")).await;
        log.add_event(event("cam-1", "34AA400")).await;

        // 34AA100 was evicted
        let cam1: Vec<String> = log
            .get_by_camera("cam-1")
            .await
            .into_iter()
            .map(|e| e.plate)
            .collect();
        assert_eq!(cam1, vec!["34AA200", "34AA400"]);
        assert_eq!(log.get_by_camera("cam-2").await.len(), 1);
        assert!(log.get_by_camera("cam-9").await.is_empty());
        assert_eq!(log.count().await, 3);
    }

    #[test]
    fn test_status_wire_format() {
        assert_eq!(serde_json::to_string(&PlateStatus::Blocked).unwrap(), "\"blocked\"");
        assert_eq!("UNKNOWN".parse::<PlateStatus>().unwrap(), PlateStatus::Unknown);
        assert!("maybe".parse::<PlateStatus>().is_err());
    }
}
