//! AIClient - Detection and OCR Capability Adapters
//!
//! ## Responsibilities
//!
//! - Plate region detection via the inference server (HTTP, multipart)
//! - Lazy detector loading with a health check
//! - Text extraction via the tesseract CLI
//!
//! Both capabilities sit behind traits so the plate reader can be driven by
//! fakes in tests.

mod tesseract;

pub use tesseract::TesseractOcr;

use crate::error::{Error, Result};
use crate::frame_source::{overlay, Frame};
use async_trait::async_trait;
use image::GrayImage;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Characters the OCR engine may emit for a plate
pub const PLATE_CHARSET: &str = "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// JPEG quality for frames sent to the detector
const DETECT_JPEG_QUALITY: u8 = 90;

/// Plate region returned by the detector, in frame pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlateBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
}

/// License plate region detection
#[async_trait]
pub trait PlateDetector: Send + Sync {
    /// Regions with at least `min_confidence`
    async fn detect(&self, frame: &Frame, min_confidence: f32) -> Result<Vec<PlateBox>>;
}

/// Produces a ready detector; may fail while the backend is unavailable
#[async_trait]
pub trait DetectorLoader: Send + Sync {
    async fn load(&self) -> Result<Arc<dyn PlateDetector>>;
}

/// Text extraction from a preprocessed plate crop
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    async fn extract_text(&self, image: &GrayImage, whitelist: &str) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct DetectResponse {
    #[serde(default)]
    detections: Vec<PlateBox>,
}

/// Inference server client
pub struct HttpPlateDetector {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPlateDetector {
    /// Create new detector client
    pub fn new(base_url: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Check inference server health
    pub async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/healthz", self.base_url);
        match self.client.get(&url).send().await {
            Ok(resp) => Ok(resp.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl PlateDetector for HttpPlateDetector {
    async fn detect(&self, frame: &Frame, min_confidence: f32) -> Result<Vec<PlateBox>> {
        let url = format!("{}/v1/detect", self.base_url);
        let jpeg = overlay::encode_jpeg(frame, DETECT_JPEG_QUALITY)?;

        let form = Form::new()
            .part(
                "image",
                Part::bytes(jpeg)
                    .file_name("frame.jpg")
                    .mime_str("image/jpeg")?,
            )
            .text("min_confidence", min_confidence.to_string());

        let resp = self.client.post(&url).multipart(form).send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Capability(format!(
                "Plate detection failed: {} - {}",
                status, body
            )));
        }

        let result: DetectResponse = resp.json().await?;
        Ok(result
            .detections
            .into_iter()
            .filter(|d| d.confidence >= min_confidence)
            .collect())
    }
}

/// Loads [`HttpPlateDetector`] once the inference server reports healthy
pub struct HttpDetectorLoader {
    base_url: String,
    timeout: Duration,
}

impl HttpDetectorLoader {
    pub fn new(base_url: String, timeout: Duration) -> Self {
        Self { base_url, timeout }
    }
}

#[async_trait]
impl DetectorLoader for HttpDetectorLoader {
    async fn load(&self) -> Result<Arc<dyn PlateDetector>> {
        let detector = HttpPlateDetector::new(self.base_url.clone(), self.timeout)?;
        if !detector.health_check().await? {
            return Err(Error::Capability(format!(
                "Inference server not healthy at {}",
                detector.base_url()
            )));
        }
        tracing::info!(base_url = %detector.base_url(), "Plate detector ready");
        Ok(Arc::new(detector))
    }
}
