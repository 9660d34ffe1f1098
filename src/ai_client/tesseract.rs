//! tesseract CLI text recognizer
//!
//! The crop is written to stdin as PNG; recognized text is read from stdout.

use super::TextRecognizer;
use crate::error::{Error, Result};
use async_trait::async_trait;
use image::{GrayImage, ImageFormat};
use std::io::Cursor;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Single text line, LSTM engine
const PAGE_SEG_MODE: &str = "7";
const ENGINE_MODE: &str = "3";

pub struct TesseractOcr {
    bin: String,
    langs: String,
    timeout: Duration,
}

impl TesseractOcr {
    pub fn new(bin: impl Into<String>, langs: impl Into<String>, timeout: Duration) -> Self {
        Self {
            bin: bin.into(),
            langs: langs.into(),
            timeout,
        }
    }

    fn build_args(&self, whitelist: &str) -> Vec<String> {
        vec![
            "stdin".to_string(),
            "stdout".to_string(),
            "--psm".to_string(),
            PAGE_SEG_MODE.to_string(),
            "--oem".to_string(),
            ENGINE_MODE.to_string(),
            "-l".to_string(),
            self.langs.clone(),
            "-c".to_string(),
            format!("tessedit_char_whitelist={}", whitelist),
        ]
    }

    async fn run(&self, png: Vec<u8>, whitelist: &str) -> Result<String> {
        let mut child = Command::new(&self.bin)
            .args(self.build_args(whitelist))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Capability(format!("tesseract spawn failed: {}", e)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Capability("tesseract stdin not captured".to_string()))?;
        stdin.write_all(&png).await?;
        drop(stdin);

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Capability(format!(
                "tesseract failed: {}",
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl TextRecognizer for TesseractOcr {
    async fn extract_text(&self, image: &GrayImage, whitelist: &str) -> Result<String> {
        let mut png = Vec::new();
        image.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;

        // Dropping the future on timeout kills the child via kill_on_drop
        match tokio::time::timeout(self.timeout, self.run(png, whitelist)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Capability(format!(
                "tesseract timeout ({}s)",
                self.timeout.as_secs()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai_client::PLATE_CHARSET;

    #[test]
    fn test_args_restrict_charset() {
        let ocr = TesseractOcr::new("tesseract", "tur+eng", Duration::from_secs(5));
        let args = ocr.build_args(PLATE_CHARSET).join(" ");
        assert!(args.starts_with("stdin stdout --psm 7 --oem 3 -l tur+eng"));
        assert!(args.ends_with("tessedit_char_whitelist=0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_capability_error() {
        let ocr = TesseractOcr::new("/nonexistent/tesseract", "eng", Duration::from_secs(1));
        let img = GrayImage::new(20, 10);
        let result = ocr.extract_text(&img, PLATE_CHARSET).await;
        assert!(matches!(result, Err(Error::Capability(_))));
    }
}
