//! AccessStore data types
//!
//! Cameras, doors and plate records as the pipeline sees them.

use crate::error::{Error, Result};
use crate::event_log_service::{DetectionEvent, PlateStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default target frame rate for a camera
pub const DEFAULT_CAMERA_FPS: u32 = 15;

/// Maximum number of plates registered on one record
pub const MAX_PLATES_PER_RECORD: usize = 3;

/// Where a camera's frames come from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum OriginKind {
    /// Local capture device (index or device path)
    #[serde(alias = "webcam")]
    Device,
    /// RTSP / HTTP network stream
    #[serde(alias = "rtsp", alias = "http")]
    NetworkStream,
}

impl OriginKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OriginKind::Device => "device",
            OriginKind::NetworkStream => "network-stream",
        }
    }
}

impl fmt::Display for OriginKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OriginKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "device" | "webcam" => Ok(OriginKind::Device),
            "network-stream" | "rtsp" | "http" => Ok(OriginKind::NetworkStream),
            other => Err(Error::Validation(format!("Unknown origin kind: {}", other))),
        }
    }
}

/// Camera (video source) record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Camera {
    pub camera_id: String,
    pub name: String,
    pub origin_kind: OriginKind,
    /// Device index / path or stream URL
    pub origin: String,
    /// Door opened when an allowed plate is read on this camera
    pub door_id: Option<String>,
    pub fps: u32,
    pub enabled: bool,
    /// Grid slot (0-3)
    pub position: i32,
}

impl Camera {
    /// Frame rate used for pacing; never zero
    pub fn effective_fps(&self) -> u32 {
        if self.fps == 0 {
            DEFAULT_CAMERA_FPS
        } else {
            self.fps
        }
    }
}

/// Door actuator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Door {
    pub door_id: String,
    pub name: String,
    pub ip: String,
    /// Path on the door controller, e.g. `/kapiac`
    pub endpoint: String,
}

impl Door {
    /// URL hit to open the door
    pub fn trigger_url(&self) -> String {
        format!("http://{}{}", self.ip, self.endpoint)
    }
}

/// Access status stored on a plate record
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AccessStatus {
    Allowed,
    Blocked,
}

impl AccessStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessStatus::Allowed => "allowed",
            AccessStatus::Blocked => "blocked",
        }
    }

    /// Anything that is not explicitly blocked grants access
    pub fn from_db(s: &str) -> Self {
        if s.eq_ignore_ascii_case("blocked") {
            AccessStatus::Blocked
        } else {
            AccessStatus::Allowed
        }
    }
}

/// Plate record: one unit/owner and its registered plates
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlateRecord {
    pub plate_id: String,
    pub site_id: String,
    pub block_name: String,
    pub apartment_number: String,
    pub owner_name: String,
    pub plates: Vec<String>,
    /// Informational only; not checked by the pipeline
    pub valid_until: String,
    pub status: AccessStatus,
}

impl PlateRecord {
    /// Unit label shown with detections, e.g. "A Blok - 12"
    pub fn unit_label(&self) -> String {
        format!("{} - {}", self.block_name, self.apartment_number)
    }

    pub fn contains_plate(&self, plate: &str) -> bool {
        self.plates.iter().any(|p| p == plate)
    }

    /// Reject records carrying more plates than a unit may register
    pub fn validate(&self) -> Result<()> {
        if self.plates.len() > MAX_PLATES_PER_RECORD {
            return Err(Error::Validation(format!(
                "At most {} plates per record, got {}",
                MAX_PLATES_PER_RECORD,
                self.plates.len()
            )));
        }
        Ok(())
    }
}

/// Detection query filter
#[derive(Debug, Clone, Default)]
pub struct DetectionFilter {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub status: Option<PlateStatus>,
    pub camera_id: Option<String>,
}

impl DetectionFilter {
    /// Everything detected since `start`
    pub fn since(start: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: PlateStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn matches(&self, event: &DetectionEvent) -> bool {
        if let Some(start) = self.start {
            if event.timestamp < start {
                return false;
            }
        }
        if let Some(end) = self.end {
            if event.timestamp > end {
                return false;
            }
        }
        if let Some(status) = self.status {
            if event.status != status {
                return false;
            }
        }
        if let Some(ref camera_id) = self.camera_id {
            if &event.camera_id != camera_id {
                return false;
            }
        }
        true
    }
}
