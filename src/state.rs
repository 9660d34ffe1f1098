//! Application state
//!
//! Holds all shared components and state

use crate::access_store::AccessStore;
use crate::door_actuator::DoorTrigger;
use crate::event_log_service::{EventLogService, DEFAULT_RECENT_CAPACITY};
use crate::realtime_hub::RealtimeHub;
use crate::stream_supervisor::StreamSupervisor;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// MySQL URL; in-memory store when unset
    pub database_url: Option<String>,
    /// JSON seed for the in-memory store
    pub seed_file: Option<PathBuf>,
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Plate detector inference server URL
    pub detector_url: String,
    pub tesseract_bin: String,
    /// Tesseract language set
    pub tesseract_langs: String,
    pub ffmpeg_bin: String,
    /// Minimum time between accepted plate reads, system-wide
    pub detection_cooldown: Duration,
    pub min_confidence: f32,
    /// Run the reader on every Nth frame of each camera
    pub detect_every_n_frames: u64,
    /// Recent-detections ring size
    pub recent_capacity: usize,
    /// Timeout for pipeline-issued door triggers
    pub door_timeout: Duration,
    pub capture_open_timeout: Duration,
    pub capture_read_timeout: Duration,
    pub ocr_timeout: Duration,
    /// Allowed CORS origins; empty means any
    pub cors_origins: Vec<String>,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),
            seed_file: std::env::var("SEED_FILE").ok().map(PathBuf::from),
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_or("PORT", 8000),
            detector_url: std::env::var("DETECTOR_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:9000".to_string()),
            tesseract_bin: std::env::var("TESSERACT_BIN")
                .unwrap_or_else(|_| "tesseract".to_string()),
            tesseract_langs: std::env::var("TESSERACT_LANGS")
                .unwrap_or_else(|_| "tur+eng".to_string()),
            ffmpeg_bin: std::env::var("FFMPEG_BIN").unwrap_or_else(|_| "ffmpeg".to_string()),
            detection_cooldown: Duration::from_millis(env_or("DETECTION_COOLDOWN_MS", 1000)),
            min_confidence: env_or("MIN_CONFIDENCE", 0.4),
            detect_every_n_frames: env_or("DETECT_EVERY_N_FRAMES", 5u64).max(1),
            recent_capacity: env_or("RECENT_CAPACITY", DEFAULT_RECENT_CAPACITY).max(1),
            door_timeout: Duration::from_millis(env_or("DOOR_TIMEOUT_MS", 2000)),
            capture_open_timeout: Duration::from_secs(env_or("CAPTURE_OPEN_TIMEOUT_SEC", 10)),
            capture_read_timeout: Duration::from_secs(env_or("CAPTURE_READ_TIMEOUT_SEC", 5)),
            ocr_timeout: Duration::from_secs(env_or("OCR_TIMEOUT_SEC", 5)),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty() && s != "*")
                        .collect()
                })
                .unwrap_or_default(),
        }
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Application config
    pub config: AppConfig,
    /// Cameras, doors, plate records, detections
    pub store: Arc<dyn AccessStore>,
    /// StreamSupervisor (camera workers)
    pub supervisor: Arc<StreamSupervisor>,
    /// EventLogService (recent detections ring)
    pub event_log: Arc<EventLogService>,
    /// RealtimeHub (WebSocket)
    pub realtime: Arc<RealtimeHub>,
    /// Door trigger used by manual opens
    pub door_trigger: Arc<dyn DoorTrigger>,
    /// System health status
    pub system_health: Arc<RwLock<SystemHealth>>,
    /// Process start, for uptime
    pub started_at: Instant,
}

/// System health metrics
#[derive(Debug, Clone, Default)]
pub struct SystemHealth {
    pub cpu_percent: f32,
    pub memory_percent: f32,
    pub memory_used_bytes: u64,
    pub memory_total_bytes: u64,
    pub overloaded: bool,
    pub last_overload_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl SystemHealth {
    /// Record a sample and update overload status
    pub fn update(&mut self, cpu: f32, memory_used: u64, memory_total: u64) {
        let memory = if memory_total > 0 {
            (memory_used as f32 / memory_total as f32) * 100.0
        } else {
            0.0
        };
        self.cpu_percent = cpu;
        self.memory_percent = memory;
        self.memory_used_bytes = memory_used;
        self.memory_total_bytes = memory_total;

        if cpu > 85.0 || memory > 90.0 {
            if !self.overloaded {
                tracing::warn!(cpu_percent = cpu, memory_percent = memory, "System overloaded");
            }
            self.overloaded = true;
            self.last_overload_at = Some(chrono::Utc::now());
        } else if self.overloaded {
            // Recovery with hysteresis
            if let Some(last) = self.last_overload_at {
                let elapsed = chrono::Utc::now() - last;
                if elapsed > chrono::Duration::seconds(60) && cpu < 60.0 && memory < 70.0 {
                    self.overloaded = false;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overload_sets_and_holds() {
        let mut health = SystemHealth::default();
        health.update(95.0, 1, 2);
        assert!(health.overloaded);
        assert_eq!(health.memory_percent, 50.0);

        // Recovery needs 60s of quiet
        health.update(10.0, 1, 10);
        assert!(health.overloaded);
    }

    #[test]
    fn test_zero_total_memory() {
        let mut health = SystemHealth::default();
        health.update(5.0, 0, 0);
        assert_eq!(health.memory_percent, 0.0);
        assert!(!health.overloaded);
    }
}
