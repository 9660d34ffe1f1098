//! Plate crop preparation for OCR

use crate::ai_client::PlateBox;
use crate::frame_source::Frame;
use image::imageops::{self, FilterType};
use image::{GrayImage, RgbImage};
use imageproc::contrast::adaptive_threshold;
use imageproc::distance_transform::Norm;
use imageproc::filter::bilateral_filter;
use imageproc::morphology;

/// Crop height handed to OCR
pub const OCR_TARGET_HEIGHT: u32 = 100;

/// Widest crop handed to OCR; wider aspect ratios are squeezed
pub const MAX_OCR_WIDTH: u32 = OCR_TARGET_HEIGHT * 8;

const BILATERAL_WINDOW: u32 = 9;
const BILATERAL_SIGMA_COLOR: f32 = 75.0;
const BILATERAL_SIGMA_SPATIAL: f32 = 75.0;
const THRESHOLD_BLOCK_RADIUS: u32 = 5;
const OPEN_RADIUS: u8 = 1;

/// Detector box truncated to integer pixels and clipped to the frame.
/// `None` when nothing of the box remains inside the frame.
pub fn clip_box(bbox: &PlateBox, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
    let clamp = |v: f32, max: u32| -> u32 {
        if v.is_nan() || v <= 0.0 {
            0
        } else {
            (v as u32).min(max)
        }
    };

    let x1 = clamp(bbox.x1, width);
    let y1 = clamp(bbox.y1, height);
    let x2 = clamp(bbox.x2, width);
    let y2 = clamp(bbox.y2, height);

    if x2 <= x1 || y2 <= y1 {
        return None;
    }
    Some((x1, y1, x2, y2))
}

pub fn crop(frame: &Frame, bbox: (u32, u32, u32, u32)) -> RgbImage {
    let (x1, y1, x2, y2) = bbox;
    imageops::crop_imm(frame, x1, y1, x2 - x1, y2 - y1).to_image()
}

/// Upscale, grayscale, denoise, binarize, invert and despeckle a plate crop
pub fn prepare_for_ocr(plate: &RgbImage) -> GrayImage {
    let (width, height) = plate.dimensions();
    let scale = OCR_TARGET_HEIGHT as f32 / height.max(1) as f32;
    let target_width = ((width as f32 * scale) as u32).clamp(1, MAX_OCR_WIDTH);

    let resized = imageops::resize(plate, target_width, OCR_TARGET_HEIGHT, FilterType::CatmullRom);
    let gray = imageops::grayscale(&resized);
    let denoised = bilateral_filter(
        &gray,
        BILATERAL_WINDOW,
        BILATERAL_SIGMA_COLOR,
        BILATERAL_SIGMA_SPATIAL,
    );
    let mut binary = adaptive_threshold(&denoised, THRESHOLD_BLOCK_RADIUS);
    imageops::invert(&mut binary);
    morphology::open(&binary, Norm::LInf, OPEN_RADIUS)
}
