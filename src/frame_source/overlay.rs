//! Frame drawing and encoding helpers
//!
//! Text is rendered from the 8x8 bitmap font, scaled by an integer factor.

use super::{Frame, FRAME_HEIGHT, FRAME_WIDTH};
use crate::error::Result;
use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::Rgb;
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

/// Glyph cell size before scaling
const GLYPH_SIZE: u32 = 8;

/// Resize to the pipeline resolution when needed
pub fn normalize_frame(frame: Frame) -> Frame {
    if frame.dimensions() == (FRAME_WIDTH, FRAME_HEIGHT) {
        frame
    } else {
        imageops::resize(&frame, FRAME_WIDTH, FRAME_HEIGHT, FilterType::Triangle)
    }
}

/// Draw `text` with its top-left corner at (x, y). Pixels outside the
/// frame are clipped. Characters missing from the font are skipped.
pub fn draw_text(frame: &mut Frame, text: &str, x: i32, y: i32, scale: u32, color: Rgb<u8>) {
    let scale = scale.max(1);
    let advance = (GLYPH_SIZE * scale) as i32;
    let (width, height) = frame.dimensions();

    for (i, ch) in text.chars().enumerate() {
        let Some(glyph) = BASIC_FONTS.get(ch) else {
            continue;
        };
        let origin_x = x + i as i32 * advance;

        for (row, bits) in glyph.iter().enumerate() {
            for col in 0..GLYPH_SIZE {
                if bits & (1 << col) == 0 {
                    continue;
                }
                for dy in 0..scale {
                    for dx in 0..scale {
                        let px = origin_x + (col * scale + dx) as i32;
                        let py = y + (row as u32 * scale + dy) as i32;
                        if px >= 0 && py >= 0 && (px as u32) < width && (py as u32) < height {
                            frame.put_pixel(px as u32, py as u32, color);
                        }
                    }
                }
            }
        }
    }
}

/// Hollow rectangle with the given stroke, drawn inwards from the box edge
pub fn draw_box(frame: &mut Frame, bbox: (u32, u32, u32, u32), thickness: u32, color: Rgb<u8>) {
    let (x1, y1, x2, y2) = bbox;
    if x2 <= x1 || y2 <= y1 {
        return;
    }
    let (w, h) = (x2 - x1, y2 - y1);
    for t in 0..thickness {
        if 2 * t >= w || 2 * t >= h {
            break;
        }
        let rect = Rect::at((x1 + t) as i32, (y1 + t) as i32).of_size(w - 2 * t, h - 2 * t);
        draw_hollow_rect_mut(frame, rect, color);
    }
}

/// Encode as baseline JPEG
pub fn encode_jpeg(frame: &Frame, quality: u8) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100));
    encoder.encode_image(frame)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    #[test]
    fn test_normalize_frame_resizes() {
        let frame = RgbImage::new(1280, 720);
        let out = normalize_frame(frame);
        assert_eq!(out.dimensions(), (FRAME_WIDTH, FRAME_HEIGHT));
    }

    #[test]
    fn test_draw_text_clips_and_marks_pixels() {
        let mut frame = RgbImage::new(40, 20);
        let white = Rgb([255, 255, 255]);
        draw_text(&mut frame, "AB", 30, 5, 2, white);
        assert!(frame.pixels().any(|p| *p == white));

        let mut blank = RgbImage::new(40, 20);
        draw_text(&mut blank, "AB", -100, -100, 1, white);
        assert!(blank.pixels().all(|p| *p == Rgb([0, 0, 0])));
    }

    #[test]
    fn test_draw_box_thickness() {
        let mut frame = RgbImage::new(50, 50);
        let green = Rgb([0, 255, 0]);
        draw_box(&mut frame, (10, 10, 40, 40), 3, green);
        assert_eq!(*frame.get_pixel(10, 20), green);
        assert_eq!(*frame.get_pixel(12, 20), green);
        assert_eq!(*frame.get_pixel(13, 20), Rgb([0, 0, 0]));
        assert_eq!(*frame.get_pixel(25, 25), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_encode_jpeg_produces_jpeg_magic() {
        let frame = RgbImage::from_pixel(16, 16, Rgb([120, 60, 30]));
        let jpeg = encode_jpeg(&frame, 50).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }
}
