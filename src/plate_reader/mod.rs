//! PlateReader - Throttled Plate Detection and Recognition
//!
//! ## Responsibilities
//!
//! - Global detection cooldown shared by every camera worker
//! - Lazy detector initialization
//! - Best-region selection, crop, OCR preprocessing and text extraction
//! - Plate normalization / correction
//!
//! The reader runs as a single actor task. Workers submit frames through a
//! bounded queue and await a oneshot reply, so the cooldown check and the
//! detector calls are serialized across all cameras.

pub mod normalize;
pub mod preprocess;

pub use normalize::normalize_plate;

use crate::ai_client::{DetectorLoader, PlateBox, PlateDetector, TextRecognizer, PLATE_CHARSET};
use crate::error::{Error, Result};
use crate::frame_source::Frame;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

/// Accepted plate read
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlateRead {
    pub plate: String,
    pub confidence: f32,
    /// (x1, y1, x2, y2) clipped to the frame
    pub bbox: (u32, u32, u32, u32),
}

/// Reader tuning
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// Minimum time between accepted reads, system-wide
    pub cooldown: Duration,
    pub min_confidence: f32,
    /// Pending frames before submitters wait
    pub queue_depth: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(1),
            min_confidence: 0.4,
            queue_depth: 8,
        }
    }
}

struct ReadRequest {
    frame: Arc<Frame>,
    reply: oneshot::Sender<Option<PlateRead>>,
}

/// Reader state; owned by the actor task once spawned
pub struct PlateReader {
    loader: Arc<dyn DetectorLoader>,
    detector: Option<Arc<dyn PlateDetector>>,
    ocr: Arc<dyn TextRecognizer>,
    config: ReaderConfig,
    last_accepted: Option<Instant>,
    /// Consecutive failed detector loads
    load_failures: u32,
}

impl PlateReader {
    pub fn new(
        loader: Arc<dyn DetectorLoader>,
        ocr: Arc<dyn TextRecognizer>,
        config: ReaderConfig,
    ) -> Self {
        Self {
            loader,
            detector: None,
            ocr,
            config,
            last_accepted: None,
            load_failures: 0,
        }
    }

    /// Start the actor task
    pub fn spawn(mut self) -> PlateReaderHandle {
        let (tx, mut rx) = mpsc::channel::<ReadRequest>(self.config.queue_depth.max(1));

        tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                let result = self.read(&request.frame).await;
                // Submitter may have gone away (worker stopped)
                let _ = request.reply.send(result);
            }
            tracing::debug!("Plate reader stopped");
        });

        PlateReaderHandle { tx }
    }

    /// One read attempt; never fails, errors count as "no read"
    pub async fn read(&mut self, frame: &Frame) -> Option<PlateRead> {
        if let Some(last) = self.last_accepted {
            if last.elapsed() < self.config.cooldown {
                return None;
            }
        }

        let detector = self.ensure_detector().await?;

        match self.recognize(detector.as_ref(), frame).await {
            Ok(Some(read)) => {
                // Cooldown runs from acceptance, not from the start of the read
                self.last_accepted = Some(Instant::now());
                tracing::debug!(
                    plate = %read.plate,
                    confidence = read.confidence,
                    "Plate accepted"
                );
                Some(read)
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, "Plate recognition failed");
                None
            }
        }
    }

    async fn ensure_detector(&mut self) -> Option<Arc<dyn PlateDetector>> {
        if let Some(ref detector) = self.detector {
            return Some(detector.clone());
        }

        match self.loader.load().await {
            Ok(detector) => {
                if self.load_failures > 0 {
                    tracing::info!(
                        failed_attempts = self.load_failures,
                        "Plate detector initialized after failures"
                    );
                }
                self.load_failures = 0;
                self.detector = Some(detector.clone());
                Some(detector)
            }
            Err(e) => {
                if self.load_failures == 0 {
                    tracing::warn!(error = %e, "Plate detector initialization failed");
                } else {
                    tracing::debug!(
                        error = %e,
                        failed_attempts = self.load_failures + 1,
                        "Plate detector still unavailable"
                    );
                }
                self.load_failures += 1;
                None
            }
        }
    }

    async fn recognize(
        &self,
        detector: &dyn PlateDetector,
        frame: &Frame,
    ) -> Result<Option<PlateRead>> {
        let boxes = detector.detect(frame, self.config.min_confidence).await?;

        let Some(best) = best_box(&boxes) else {
            return Ok(None);
        };

        let Some(bbox) = preprocess::clip_box(&best, frame.width(), frame.height()) else {
            return Ok(None);
        };

        let plate_img = preprocess::crop(frame, bbox);
        let prepared = tokio::task::spawn_blocking(move || preprocess::prepare_for_ocr(&plate_img))
            .await
            .map_err(|e| Error::Internal(format!("OCR preprocessing panicked: {}", e)))?;

        let raw = self.ocr.extract_text(&prepared, PLATE_CHARSET).await?;
        let text: String = raw
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect::<String>()
            .to_uppercase();

        match normalize_plate(&text) {
            Some(plate) => Ok(Some(PlateRead {
                plate,
                confidence: best.confidence,
                bbox,
            })),
            None => {
                tracing::trace!(raw = %text, "OCR text rejected by plate format");
                Ok(None)
            }
        }
    }
}

/// Highest-confidence region; the first one wins ties
fn best_box(boxes: &[PlateBox]) -> Option<PlateBox> {
    let mut best: Option<PlateBox> = None;
    for b in boxes {
        if best.map_or(true, |cur| b.confidence > cur.confidence) {
            best = Some(*b);
        }
    }
    best
}

/// Cloneable submitter for the reader actor
#[derive(Clone)]
pub struct PlateReaderHandle {
    tx: mpsc::Sender<ReadRequest>,
}

impl PlateReaderHandle {
    /// Submit a frame and wait for the outcome
    pub async fn read(&self, frame: Arc<Frame>) -> Option<PlateRead> {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(ReadRequest { frame, reply }).await.is_err() {
            tracing::warn!("Plate reader is not running");
            return None;
        }
        rx.await.ok().flatten()
    }
}
