//! DecisionStage - Access Decision for Accepted Plate Reads
//!
//! ## Responsibilities
//!
//! - Access-list lookup and outcome classification
//! - Fire-and-forget door trigger for allowed plates
//! - Annotated snapshot for the detection event

use crate::access_store::{AccessStatus, AccessStore, PlateRecord};
use crate::door_actuator::{DoorTrigger, AUTO_TRIGGER_TIMEOUT};
use crate::error::{Error, Result};
use crate::event_log_service::{DetectionEvent, OwnerInfo, PlateStatus};
use crate::frame_source::{overlay, Frame};
use crate::plate_reader::PlateRead;
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::Utc;
use image::Rgb;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// JPEG quality of the snapshot stored with the event
const SNAPSHOT_JPEG_QUALITY: u8 = 95;
const BOX_THICKNESS: u32 = 3;
const LABEL_SCALE: u32 = 2;

/// Outcome color on annotated frames
pub fn status_color(status: PlateStatus) -> Rgb<u8> {
    match status {
        PlateStatus::Allowed => Rgb([0, 255, 0]),
        PlateStatus::Blocked => Rgb([255, 0, 0]),
        PlateStatus::Unknown => Rgb([255, 255, 0]),
    }
}

/// Result of one decision
pub struct Decision {
    pub event: DetectionEvent,
    /// Frame copy with box and plate drawn on it
    pub annotated: Frame,
    /// Detached door trigger, present for allowed plates
    pub actuation: Option<JoinHandle<()>>,
}

/// DecisionStage instance
pub struct DecisionStage {
    store: Arc<dyn AccessStore>,
    door_trigger: Arc<dyn DoorTrigger>,
    door_timeout: Duration,
}

impl DecisionStage {
    pub fn new(store: Arc<dyn AccessStore>, door_trigger: Arc<dyn DoorTrigger>) -> Self {
        Self {
            store,
            door_trigger,
            door_timeout: AUTO_TRIGGER_TIMEOUT,
        }
    }

    pub fn with_door_timeout(mut self, timeout: Duration) -> Self {
        self.door_timeout = timeout;
        self
    }

    /// Classify a read and build its event. Lookup failures count as unknown.
    pub async fn decide(&self, read: &PlateRead, camera_id: &str, frame: &Frame) -> Decision {
        let record = match self.store.find_access_entry(&read.plate).await {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(plate = %read.plate, error = %e, "Access lookup failed");
                None
            }
        };

        let status = classify(record.as_ref());

        let actuation = if status == PlateStatus::Allowed {
            Some(self.spawn_door_trigger(camera_id.to_string()))
        } else {
            None
        };

        let owner_info = record.as_ref().map(|r| OwnerInfo {
            owner_name: r.owner_name.clone(),
            apartment: r.unit_label(),
        });

        let annotated = annotate(frame, read, status);
        let image_base64 = match overlay::encode_jpeg(&annotated, SNAPSHOT_JPEG_QUALITY) {
            Ok(jpeg) => Some(STANDARD.encode(jpeg)),
            Err(e) => {
                tracing::warn!(camera_id = %camera_id, error = %e, "Snapshot encode failed");
                None
            }
        };

        tracing::info!(
            camera_id = %camera_id,
            plate = %read.plate,
            status = %status,
            confidence = read.confidence,
            "Plate decision"
        );

        Decision {
            event: DetectionEvent {
                id: Uuid::new_v4(),
                camera_id: camera_id.to_string(),
                plate: read.plate.clone(),
                status,
                confidence: read.confidence,
                timestamp: Utc::now(),
                image_base64,
                owner_info,
            },
            annotated,
            actuation,
        }
    }

    /// Resolve the camera's door and trigger it on a detached task
    fn spawn_door_trigger(&self, camera_id: String) -> JoinHandle<()> {
        let store = self.store.clone();
        let trigger = self.door_trigger.clone();
        let timeout = self.door_timeout;

        tokio::spawn(async move {
            if let Err(e) = open_camera_door(store.as_ref(), trigger.as_ref(), &camera_id, timeout).await {
                tracing::debug!(camera_id = %camera_id, error = %e, "Door trigger skipped");
            }
        })
    }
}

fn classify(record: Option<&PlateRecord>) -> PlateStatus {
    match record {
        None => PlateStatus::Unknown,
        Some(r) if r.status == AccessStatus::Blocked => PlateStatus::Blocked,
        Some(_) => PlateStatus::Allowed,
    }
}

async fn open_camera_door(
    store: &dyn AccessStore,
    trigger: &dyn DoorTrigger,
    camera_id: &str,
    timeout: Duration,
) -> Result<()> {
    let camera = store
        .find_camera(camera_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Camera {}", camera_id)))?;
    let door_id = camera
        .door_id
        .ok_or_else(|| Error::NotFound(format!("No door assigned to camera {}", camera_id)))?;
    let door = store
        .find_door(&door_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Door {}", door_id)))?;

    trigger.trigger(&door, timeout).await
}

/// Box and plate label drawn on a copy of the frame
pub fn annotate(frame: &Frame, read: &PlateRead, status: PlateStatus) -> Frame {
    let mut annotated = frame.clone();
    let color = status_color(status);
    let (x1, y1, _, _) = read.bbox;

    overlay::draw_box(&mut annotated, read.bbox, BOX_THICKNESS, color);
    let label_y = y1 as i32 - 10 - (8 * LABEL_SCALE) as i32;
    overlay::draw_text(&mut annotated, &read.plate, x1 as i32, label_y, LABEL_SCALE, color);
    annotated
}
