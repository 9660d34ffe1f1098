//! Placeholder frames for unreachable origins

use super::overlay::draw_text;
use super::{Frame, FRAME_HEIGHT, FRAME_WIDTH};
use crate::access_store::Camera;
use image::Rgb;
use sha2::{Digest, Sha256};

const TEXT_SCALE: u32 = 2;

/// Background color derived from the camera id; stable across restarts
pub fn placeholder_color(camera_id: &str) -> Rgb<u8> {
    let digest = Sha256::digest(camera_id.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    let h = u64::from_be_bytes(prefix);

    let channel = |k: u64| (h.wrapping_mul(k) % 100 + 50) as u8;
    Rgb([channel(1), channel(2), channel(3)])
}

/// Demo frame annotated with the camera name and origin
pub fn placeholder_frame(camera: &Camera) -> Frame {
    let mut frame = Frame::from_pixel(FRAME_WIDTH, FRAME_HEIGHT, placeholder_color(&camera.camera_id));
    let white = Rgb([255, 255, 255]);

    let lines = [
        format!("DEMO MODE - {}", camera.name),
        "Camera not accessible".to_string(),
        format!("URL: {}", camera.origin),
    ];
    for (i, line) in lines.iter().enumerate() {
        draw_text(&mut frame, line, 10, 14 + 30 * i as i32, TEXT_SCALE, white);
    }
    frame
}
