//! ffmpeg capture backend
//!
//! One long-running ffmpeg child per live camera, decoding the origin to raw
//! RGB24 at the pipeline resolution on stdout. The child is spawned with
//! kill_on_drop so a cancelled or dropped worker never leaves it behind.

use super::{Capture, CaptureBackend, Frame, FRAME_HEIGHT, FRAME_WIDTH};
use crate::access_store::{Camera, OriginKind};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};

const FRAME_BYTES: usize = (FRAME_WIDTH * FRAME_HEIGHT * 3) as usize;

/// Spawns ffmpeg per opened camera
#[derive(Debug, Clone)]
pub struct FfmpegBackend {
    ffmpeg_bin: String,
    open_timeout: Duration,
    read_timeout: Duration,
}

impl FfmpegBackend {
    pub fn new(ffmpeg_bin: impl Into<String>, open_timeout: Duration, read_timeout: Duration) -> Self {
        Self {
            ffmpeg_bin: ffmpeg_bin.into(),
            open_timeout,
            read_timeout,
        }
    }

    /// Input arguments for the camera origin
    fn input_args(camera: &Camera) -> Vec<String> {
        let origin = camera.origin.trim();
        match camera.origin_kind {
            OriginKind::Device => {
                let device = if origin.chars().all(|c| c.is_ascii_digit()) && !origin.is_empty() {
                    format!("/dev/video{}", origin)
                } else {
                    origin.to_string()
                };
                vec!["-f".into(), "v4l2".into(), "-i".into(), device]
            }
            OriginKind::NetworkStream => {
                let mut args = Vec::new();
                if origin.starts_with("rtsp://") || origin.starts_with("rtsps://") {
                    args.extend(["-rtsp_transport".to_string(), "tcp".to_string()]);
                }
                args.extend(["-i".to_string(), origin.to_string()]);
                args
            }
        }
    }

    fn build_args(camera: &Camera) -> Vec<String> {
        let filter = format!(
            "fps={},scale={}:{}",
            camera.effective_fps(),
            FRAME_WIDTH,
            FRAME_HEIGHT
        );
        let mut args = vec!["-loglevel".to_string(), "error".to_string()];
        args.extend(Self::input_args(camera));
        args.extend(
            [
                "-an",
                "-vf",
                filter.as_str(),
                "-pix_fmt",
                "rgb24",
                "-f",
                "rawvideo",
                "-",
            ]
            .iter()
            .map(|s| s.to_string()),
        );
        args
    }
}

#[async_trait]
impl CaptureBackend for FfmpegBackend {
    async fn open(&self, camera: &Camera) -> Result<Box<dyn Capture>> {
        let mut child = Command::new(&self.ffmpeg_bin)
            .args(Self::build_args(camera))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Capture(format!("ffmpeg spawn failed: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Capture("ffmpeg stdout not captured".to_string()))?;

        let mut capture = FfmpegCapture {
            child,
            stdout,
            pending: None,
            read_timeout: self.read_timeout,
        };

        // The origin counts as open once the first frame has been decoded
        match tokio::time::timeout(self.open_timeout, capture.read_raw()).await {
            Ok(Ok(frame)) => {
                capture.pending = Some(frame);
                Ok(Box::new(capture))
            }
            Ok(Err(e)) => {
                capture.release().await;
                Err(e)
            }
            Err(_) => {
                capture.release().await;
                Err(Error::Capture(format!(
                    "No frame from {} within {}s",
                    camera.origin,
                    self.open_timeout.as_secs()
                )))
            }
        }
    }
}

/// Live ffmpeg child decoding one origin
struct FfmpegCapture {
    child: Child,
    stdout: ChildStdout,
    pending: Option<Frame>,
    read_timeout: Duration,
}

impl FfmpegCapture {
    async fn read_raw(&mut self) -> Result<Frame> {
        let mut buf = vec![0u8; FRAME_BYTES];
        self.stdout
            .read_exact(&mut buf)
            .await
            .map_err(|e| Error::Capture(format!("ffmpeg stream ended: {}", e)))?;

        Frame::from_raw(FRAME_WIDTH, FRAME_HEIGHT, buf)
            .ok_or_else(|| Error::Capture("Short frame buffer".to_string()))
    }
}

#[async_trait]
impl Capture for FfmpegCapture {
    async fn read_frame(&mut self) -> Result<Frame> {
        if let Some(frame) = self.pending.take() {
            return Ok(frame);
        }

        match tokio::time::timeout(self.read_timeout, self.read_raw()).await {
            Ok(result) => result,
            Err(_) => Err(Error::Capture(format!(
                "Frame read timeout ({}s)",
                self.read_timeout.as_secs()
            ))),
        }
    }

    async fn release(&mut self) {
        if let Err(e) = self.child.kill().await {
            tracing::debug!(error = %e, "ffmpeg already exited");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera(kind: OriginKind, origin: &str) -> Camera {
        Camera {
            camera_id: "cam-1".to_string(),
            name: "Gate".to_string(),
            origin_kind: kind,
            origin: origin.to_string(),
            door_id: None,
            fps: 10,
            enabled: true,
            position: 0,
        }
    }

    #[test]
    fn test_device_index_maps_to_v4l2_node() {
        let args = FfmpegBackend::build_args(&camera(OriginKind::Device, "2"));
        let joined = args.join(" ");
        assert!(joined.contains("-f v4l2 -i /dev/video2"));
        assert!(joined.contains("fps=10,scale=640:480"));
        assert!(joined.ends_with("-f rawvideo -"));
    }

    #[test]
    fn test_rtsp_uses_tcp_transport() {
        let args = FfmpegBackend::build_args(&camera(OriginKind::NetworkStream, "rtsp://10.0.0.9/live"));
        let joined = args.join(" ");
        assert!(joined.contains("-rtsp_transport tcp -i rtsp://10.0.0.9/live"));

        let args = FfmpegBackend::build_args(&camera(OriginKind::NetworkStream, "http://10.0.0.9/mjpg"));
        assert!(!args.join(" ").contains("rtsp_transport"));
    }

    #[tokio::test]
    async fn test_missing_binary_fails_to_open() {
        let backend = FfmpegBackend::new(
            "/nonexistent/ffmpeg",
            Duration::from_secs(1),
            Duration::from_secs(1),
        );
        let result = backend.open(&camera(OriginKind::Device, "0")).await;
        assert!(matches!(result, Err(Error::Capture(_))));
    }
}
