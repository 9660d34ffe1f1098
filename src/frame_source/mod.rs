//! FrameSource - Frame Acquisition per Camera
//!
//! ## Responsibilities
//!
//! - Open the camera origin once when a worker starts
//! - Read frames normalized to the pipeline resolution
//! - Fall back to a deterministic placeholder when the origin is unreachable
//!
//! Once a source has fallen back it stays simulated for the rest of the
//! worker's lifetime; restarting the worker is the only way to retry.

mod ffmpeg;
pub mod overlay;
mod simulated;

pub use ffmpeg::FfmpegBackend;
pub use simulated::{placeholder_color, placeholder_frame};

use crate::access_store::Camera;
use crate::error::Result;
use async_trait::async_trait;
use image::RgbImage;

/// Pipeline frame width
pub const FRAME_WIDTH: u32 = 640;
/// Pipeline frame height
pub const FRAME_HEIGHT: u32 = 480;

/// RGB frame at the pipeline resolution
pub type Frame = RgbImage;

/// An opened real origin
#[async_trait]
pub trait Capture: Send {
    async fn read_frame(&mut self) -> Result<Frame>;

    /// Release the underlying handle; later reads fail
    async fn release(&mut self);
}

/// Opens real origins
#[async_trait]
pub trait CaptureBackend: Send + Sync {
    async fn open(&self, camera: &Camera) -> Result<Box<dyn Capture>>;
}

enum Mode {
    Live(Box<dyn Capture>),
    Simulated(Frame),
}

/// Frame source owned by one worker
pub struct FrameSource {
    camera: Camera,
    mode: Mode,
}

impl FrameSource {
    /// Open the camera origin, falling back to simulated mode on failure
    pub async fn open(backend: &dyn CaptureBackend, camera: &Camera) -> Self {
        let mode = match backend.open(camera).await {
            Ok(capture) => {
                tracing::info!(
                    camera_id = %camera.camera_id,
                    origin_kind = %camera.origin_kind,
                    "Camera origin opened"
                );
                Mode::Live(capture)
            }
            Err(e) => {
                tracing::warn!(
                    camera_id = %camera.camera_id,
                    origin = %camera.origin,
                    error = %e,
                    "Camera origin not accessible, using simulated frames"
                );
                Mode::Simulated(placeholder_frame(camera))
            }
        };

        Self {
            camera: camera.clone(),
            mode,
        }
    }

    pub fn is_simulated(&self) -> bool {
        matches!(self.mode, Mode::Simulated(_))
    }

    /// Next frame; a failed read switches to simulated mode for good
    pub async fn acquire(&mut self) -> Frame {
        match &mut self.mode {
            Mode::Simulated(frame) => frame.clone(),
            Mode::Live(capture) => match capture.read_frame().await {
                Ok(frame) => overlay::normalize_frame(frame),
                Err(e) => {
                    tracing::warn!(
                        camera_id = %self.camera.camera_id,
                        error = %e,
                        "Frame read failed, switching to simulated frames"
                    );
                    capture.release().await;
                    let frame = placeholder_frame(&self.camera);
                    self.mode = Mode::Simulated(frame.clone());
                    frame
                }
            },
        }
    }

    /// Release the real origin if one is open
    pub async fn release(&mut self) {
        if let Mode::Live(capture) = &mut self.mode {
            capture.release().await;
            tracing::debug!(camera_id = %self.camera.camera_id, "Camera origin released");
        }
    }
}
