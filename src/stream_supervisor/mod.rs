//! StreamSupervisor - Per-Camera Worker Lifecycle
//!
//! ## Responsibilities
//!
//! - Activate / deactivate camera workers (one per active camera)
//! - Registry of active workers and their latest output
//! - Deterministic stop acknowledgement
//!
//! ## Worker states
//!
//! `Starting -> (Connected | Simulated) -> Running -> Stopped`
//!
//! A worker keeps running while its camera id is in the registry and its
//! cancellation token is untouched. Deactivation removes the entry, cancels
//! the token and waits for the worker to release its origin. Activation and
//! deactivation of the same camera hold a per-camera lifecycle lock, so a
//! restart never opens the origin before the previous worker let go of it.

mod worker;

use crate::access_store::{AccessStore, Camera};
use crate::decision_stage::DecisionStage;
use crate::error::{Error, Result};
use crate::event_log_service::PlateStatus;
use crate::frame_source::CaptureBackend;
use crate::plate_reader::PlateReaderHandle;
use crate::result_sink::ResultSink;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Worker status as shown to viewers
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    Starting,
    /// No detection this cycle
    Monitoring,
    Allowed,
    Blocked,
    Unknown,
}

impl From<PlateStatus> for WorkerStatus {
    fn from(status: PlateStatus) -> Self {
        match status {
            PlateStatus::Allowed => WorkerStatus::Allowed,
            PlateStatus::Blocked => WorkerStatus::Blocked,
            PlateStatus::Unknown => WorkerStatus::Unknown,
        }
    }
}

/// Mutable output of one worker
#[derive(Debug, Clone)]
pub struct WorkerOutput {
    pub status: WorkerStatus,
    /// Latest JPEG
    pub last_frame: Option<Bytes>,
    pub last_frame_at: Option<DateTime<Utc>>,
    pub frame_count: u64,
    pub simulated: bool,
}

impl Default for WorkerOutput {
    fn default() -> Self {
        Self {
            status: WorkerStatus::Starting,
            last_frame: None,
            last_frame_at: None,
            frame_count: 0,
            simulated: false,
        }
    }
}

/// Point-in-time view of an active worker
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerSnapshot {
    pub camera_id: String,
    pub name: String,
    pub origin: String,
    pub fps: u32,
    pub status: WorkerStatus,
    pub simulated: bool,
    pub frame_count: u64,
    pub last_frame_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActivateOutcome {
    Started(WorkerSnapshot),
    AlreadyRunning(WorkerSnapshot),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    NotRunning,
}

/// Supervisor tuning
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Run the plate reader on every Nth frame
    pub detect_every_n_frames: u64,
    /// JPEG quality of republished frames
    pub preview_jpeg_quality: u8,
    /// How long deactivate waits for the worker to exit
    pub stop_timeout: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            detect_every_n_frames: 5,
            preview_jpeg_quality: 50,
            stop_timeout: Duration::from_secs(10),
        }
    }
}

struct WorkerEntry {
    camera: Camera,
    output: Arc<RwLock<WorkerOutput>>,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl WorkerEntry {
    async fn snapshot(&self) -> WorkerSnapshot {
        let output = self.output.read().await;
        WorkerSnapshot {
            camera_id: self.camera.camera_id.clone(),
            name: self.camera.name.clone(),
            origin: self.camera.origin.clone(),
            fps: self.camera.effective_fps(),
            status: output.status,
            simulated: output.simulated,
            frame_count: output.frame_count,
            last_frame_at: output.last_frame_at,
        }
    }
}

type Registry = Arc<RwLock<HashMap<String, WorkerEntry>>>;

/// StreamSupervisor instance
pub struct StreamSupervisor {
    store: Arc<dyn AccessStore>,
    backend: Arc<dyn CaptureBackend>,
    reader: PlateReaderHandle,
    decision: Arc<DecisionStage>,
    sink: Arc<ResultSink>,
    config: SupervisorConfig,
    registry: Registry,
    /// Per-camera start/stop serialization
    lifecycle: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl StreamSupervisor {
    pub fn new(
        store: Arc<dyn AccessStore>,
        backend: Arc<dyn CaptureBackend>,
        reader: PlateReaderHandle,
        decision: Arc<DecisionStage>,
        sink: Arc<ResultSink>,
        config: SupervisorConfig,
    ) -> Self {
        Self {
            store,
            backend,
            reader,
            decision,
            sink,
            config,
            registry: Arc::new(RwLock::new(HashMap::new())),
            lifecycle: Mutex::new(HashMap::new()),
        }
    }

    async fn lifecycle_lock(&self, camera_id: &str) -> Arc<Mutex<()>> {
        self.lifecycle
            .lock()
            .await
            .entry(camera_id.to_string())
            .or_default()
            .clone()
    }

    /// Start a worker for the camera; no-op if one is already running
    pub async fn activate(&self, camera_id: &str) -> Result<ActivateOutcome> {
        if let Some(entry) = self.registry.read().await.get(camera_id) {
            return Ok(ActivateOutcome::AlreadyRunning(entry.snapshot().await));
        }

        let camera = self
            .store
            .find_camera(camera_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Camera {}", camera_id)))?;

        // Waits for an in-flight stop of this camera to finish
        let lock = self.lifecycle_lock(camera_id).await;
        let _guard = lock.lock().await;

        let mut registry = self.registry.write().await;
        // Another activate may have won while the store was queried
        if let Some(entry) = registry.get(camera_id) {
            return Ok(ActivateOutcome::AlreadyRunning(entry.snapshot().await));
        }

        let output = Arc::new(RwLock::new(WorkerOutput::default()));
        let cancel = CancellationToken::new();

        let worker = worker::Worker {
            camera: camera.clone(),
            backend: self.backend.clone(),
            reader: self.reader.clone(),
            decision: self.decision.clone(),
            sink: self.sink.clone(),
            output: output.clone(),
            registry: self.registry.clone(),
            cancel: cancel.clone(),
            detect_every_n_frames: self.config.detect_every_n_frames.max(1),
            preview_jpeg_quality: self.config.preview_jpeg_quality,
        };
        let handle = tokio::spawn(worker.run());

        let entry = WorkerEntry {
            camera,
            output,
            cancel,
            handle,
        };
        let snapshot = entry.snapshot().await;
        registry.insert(camera_id.to_string(), entry);

        tracing::info!(camera_id = %camera_id, "Camera worker started");
        Ok(ActivateOutcome::Started(snapshot))
    }

    /// Stop the camera's worker and wait for it to exit
    pub async fn deactivate(&self, camera_id: &str) -> StopOutcome {
        if !self.is_active(camera_id).await {
            tracing::debug!(camera_id = %camera_id, "Stop requested for inactive camera");
            return StopOutcome::NotRunning;
        }

        // Held until the worker has exited
        let lock = self.lifecycle_lock(camera_id).await;
        let _guard = lock.lock().await;

        let entry = self.registry.write().await.remove(camera_id);
        let Some(mut entry) = entry else {
            tracing::debug!(camera_id = %camera_id, "Camera already stopped concurrently");
            return StopOutcome::NotRunning;
        };

        entry.cancel.cancel();

        match tokio::time::timeout(self.config.stop_timeout, &mut entry.handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::error!(camera_id = %camera_id, error = %e, "Camera worker panicked");
            }
            Err(_) => {
                tracing::warn!(
                    camera_id = %camera_id,
                    timeout_sec = self.config.stop_timeout.as_secs(),
                    "Camera worker did not stop in time, aborting"
                );
                entry.handle.abort();
            }
        }

        tracing::info!(camera_id = %camera_id, "Camera worker stopped");
        StopOutcome::Stopped
    }

    /// Stop every worker
    pub async fn shutdown(&self) {
        let ids: Vec<String> = self.registry.read().await.keys().cloned().collect();
        for id in ids {
            self.deactivate(&id).await;
        }
    }

    pub async fn is_active(&self, camera_id: &str) -> bool {
        self.registry.read().await.contains_key(camera_id)
    }

    pub async fn active_count(&self) -> usize {
        self.registry.read().await.len()
    }

    pub async fn snapshot(&self, camera_id: &str) -> Option<WorkerSnapshot> {
        match self.registry.read().await.get(camera_id) {
            Some(entry) => Some(entry.snapshot().await),
            None => None,
        }
    }

    /// All active workers ordered by camera id
    pub async fn list_active(&self) -> Vec<WorkerSnapshot> {
        let registry = self.registry.read().await;
        let mut snapshots = Vec::with_capacity(registry.len());
        for entry in registry.values() {
            snapshots.push(entry.snapshot().await);
        }
        snapshots.sort_by(|a, b| a.camera_id.cmp(&b.camera_id));
        snapshots
    }

    /// Latest JPEG of an active camera. `None` when the camera is not
    /// active; `Some(None)` before the first frame.
    pub async fn latest_frame(&self, camera_id: &str) -> Option<Option<Bytes>> {
        let output = {
            let registry = self.registry.read().await;
            registry.get(camera_id)?.output.clone()
        };
        let frame = output.read().await.last_frame.clone();
        Some(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_status_wire_format() {
        assert_eq!(serde_json::to_string(&WorkerStatus::Monitoring).unwrap(), "\"monitoring\"");
        assert_eq!(WorkerStatus::from(PlateStatus::Blocked), WorkerStatus::Blocked);
    }

    #[test]
    fn test_default_output_is_starting() {
        let output = WorkerOutput::default();
        assert_eq!(output.status, WorkerStatus::Starting);
        assert!(output.last_frame.is_none());
    }
}
