//! Camera worker loop

use super::{Registry, WorkerOutput, WorkerStatus};
use crate::access_store::Camera;
use crate::decision_stage::DecisionStage;
use crate::frame_source::{overlay, CaptureBackend, Frame, FrameSource};
use crate::plate_reader::PlateReaderHandle;
use crate::realtime_hub::{CameraStatusMessage, HubMessage};
use crate::result_sink::ResultSink;
use bytes::Bytes;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

pub(super) struct Worker {
    pub camera: Camera,
    pub backend: Arc<dyn CaptureBackend>,
    pub reader: PlateReaderHandle,
    pub decision: Arc<DecisionStage>,
    pub sink: Arc<ResultSink>,
    pub output: Arc<RwLock<WorkerOutput>>,
    pub registry: Registry,
    pub cancel: CancellationToken,
    pub detect_every_n_frames: u64,
    pub preview_jpeg_quality: u8,
}

impl Worker {
    pub async fn run(self) {
        let camera_id = self.camera.camera_id.clone();
        let pacing = Duration::from_secs_f64(1.0 / self.camera.effective_fps() as f64);

        let mut source = tokio::select! {
            _ = self.cancel.cancelled() => return,
            source = FrameSource::open(self.backend.as_ref(), &self.camera) => source,
        };
        let simulated = source.is_simulated();
        self.output.write().await.simulated = simulated;
        self.announce(true, simulated).await;

        let mut frame_count: u64 = 0;

        loop {
            if !self.still_registered().await {
                break;
            }

            let frame = tokio::select! {
                _ = self.cancel.cancelled() => break,
                frame = source.acquire() => Arc::new(frame),
            };

            let mut status = WorkerStatus::Monitoring;
            let mut annotated: Option<Frame> = None;

            if frame_count % self.detect_every_n_frames == 0 {
                if let Some(read) = self.reader.read(frame.clone()).await {
                    let decision = self.decision.decide(&read, &camera_id, &frame).await;
                    status = decision.event.status.into();
                    annotated = Some(decision.annotated);
                    self.sink.record(decision.event).await;
                }
            }

            let published = annotated.as_ref().unwrap_or(frame.as_ref());
            let jpeg = match overlay::encode_jpeg(published, self.preview_jpeg_quality) {
                Ok(jpeg) => Some(Bytes::from(jpeg)),
                Err(e) => {
                    tracing::warn!(camera_id = %camera_id, error = %e, "Preview encode failed");
                    None
                }
            };

            frame_count += 1;
            {
                let mut output = self.output.write().await;
                if jpeg.is_some() {
                    output.last_frame = jpeg;
                    output.last_frame_at = Some(Utc::now());
                }
                output.status = status;
                output.frame_count = frame_count;
                output.simulated = source.is_simulated();
            }

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(pacing) => {}
            }
        }

        source.release().await;
        self.announce(false, source.is_simulated()).await;
        tracing::info!(camera_id = %camera_id, frames = frame_count, "Camera stream stopped");
    }

    /// Registry membership plus the explicit token
    async fn still_registered(&self) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        self.registry.read().await.contains_key(&self.camera.camera_id)
    }

    async fn announce(&self, active: bool, simulated: bool) {
        self.sink
            .realtime_hub()
            .broadcast(HubMessage::CameraStatus(CameraStatusMessage {
                camera_id: self.camera.camera_id.clone(),
                active,
                simulated,
                timestamp: Utc::now().to_rfc3339(),
            }))
            .await;
    }
}
