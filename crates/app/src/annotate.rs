//! Frame annotation: detection boxes, class labels, and the signal overlay.
//!
//! Deliberately cosmetic. Drawing is done on a plain RGBA buffer with a tiny
//! built-in 5x7 glyph font, then encoded to JPEG for the preview stream.

use anyhow::{Result, anyhow};
use image::{DynamicImage, ImageBuffer, Rgba, codecs::jpeg::JpegEncoder};
use video_capture::Frame;

use crate::{
    data::{FramePacket, TrafficState},
    filter::VehicleDetection,
};

const BOX_COLOR: Rgba<u8> = Rgba([0, 255, 0, 255]);
const SIGNAL_COLOR: Rgba<u8> = Rgba([255, 64, 64, 255]);
const COUNT_COLOR: Rgba<u8> = Rgba([255, 255, 0, 255]);
const BACKDROP: Rgba<u8> = Rgba([0, 0, 0, 180]);

/// Draw boxes, labels, and the current signal/count onto `frame`, then JPEG
/// encode the result into a [`FramePacket`] carrying the snapshot it was
/// rendered from.
pub fn annotate_frame(
    frame: &Frame,
    vehicles: &[VehicleDetection],
    state: TrafficState,
    frame_number: u64,
    fps: f32,
    jpeg_quality: i32,
) -> Result<FramePacket> {
    let width = frame.width as u32;
    let height = frame.height as u32;
    let rgba = bgr_to_rgba(&frame.data);
    let mut image = ImageBuffer::<Rgba<u8>, Vec<u8>>::from_vec(width, height, rgba)
        .ok_or_else(|| anyhow!("failed to convert frame into image buffer"))?;

    for vehicle in vehicles {
        let left = vehicle.bbox[0].clamp(0.0, (width - 1) as f32);
        let top = vehicle.bbox[1].clamp(0.0, (height - 1) as f32);
        let right = vehicle.bbox[2].clamp(0.0, (width - 1) as f32);
        let bottom = vehicle.bbox[3].clamp(0.0, (height - 1) as f32);
        draw_rectangle(
            &mut image,
            left.round() as i32,
            top.round() as i32,
            right.round() as i32,
            bottom.round() as i32,
            BOX_COLOR,
        );

        let label = vehicle.class.label();
        let label_x = left.round() as i32;
        let label_y = (top.round() as i32 - 10).max(0);
        let text_width = label.chars().count() as i32 * 6;
        fill_rect(
            &mut image,
            label_x,
            label_y,
            label_x + text_width,
            label_y + 8,
            BACKDROP,
        );
        draw_label(&mut image, label_x, label_y, label, BOX_COLOR);
    }

    let signal_line = format!("SIGNAL {}", state.signal.as_str());
    let count_line = format!("VEHICLES {}", state.vehicle_count);
    draw_banner(&mut image, 20, 20, &signal_line, SIGNAL_COLOR);
    draw_banner(&mut image, 20, 32, &count_line, COUNT_COLOR);

    let info = format!("FRAME {:06}  FPS {:4.1}", frame_number, fps);
    let info_width = (info.chars().count() as i32 * 6).min(width as i32);
    let info_x = (width as i32 - info_width - 4).max(0);
    let info_y = (height as i32 - 12).max(0);
    draw_banner(&mut image, info_x, info_y, &info, Rgba([255, 255, 255, 255]));

    let rgb = DynamicImage::ImageRgba8(image).to_rgb8();
    let mut buffer = Vec::new();
    let quality = jpeg_quality.clamp(1, 100) as u8;
    JpegEncoder::new_with_quality(&mut buffer, quality)
        .encode_image(&rgb)
        .map_err(|err| anyhow!("JPEG encode failed: {err}"))?;

    Ok(FramePacket {
        jpeg: buffer,
        state,
        frame_number,
        fps,
        timestamp_ms: frame.timestamp_ms,
    })
}

/// Text on a dark backdrop.
fn draw_banner(
    image: &mut ImageBuffer<Rgba<u8>, Vec<u8>>,
    x: i32,
    y: i32,
    text: &str,
    color: Rgba<u8>,
) {
    let text_width = text.chars().count() as i32 * 6;
    fill_rect(image, x - 2, y - 1, x + text_width + 2, y + 8, BACKDROP);
    draw_label(image, x, y, text, color);
}

fn bgr_to_rgba(input: &[u8]) -> Vec<u8> {
    let pixels = input.len() / 3;
    let mut output = Vec::with_capacity(pixels * 4);
    for chunk in input.chunks_exact(3) {
        output.push(chunk[2]);
        output.push(chunk[1]);
        output.push(chunk[0]);
        output.push(255);
    }
    output
}

fn draw_rectangle(
    image: &mut ImageBuffer<Rgba<u8>, Vec<u8>>,
    left: i32,
    top: i32,
    right: i32,
    bottom: i32,
    color: Rgba<u8>,
) {
    let width = image.width() as i32;
    let height = image.height() as i32;
    let left = left.clamp(0, width.saturating_sub(1));
    let right = right.clamp(0, width.saturating_sub(1));
    let top = top.clamp(0, height.saturating_sub(1));
    let bottom = bottom.clamp(0, height.saturating_sub(1));

    for x in left..=right {
        *image.get_pixel_mut(x as u32, top as u32) = color;
        *image.get_pixel_mut(x as u32, bottom as u32) = color;
    }
    for y in top..=bottom {
        *image.get_pixel_mut(left as u32, y as u32) = color;
        *image.get_pixel_mut(right as u32, y as u32) = color;
    }
}

fn fill_rect(
    image: &mut ImageBuffer<Rgba<u8>, Vec<u8>>,
    left: i32,
    top: i32,
    right: i32,
    bottom: i32,
    color: Rgba<u8>,
) {
    let width = image.width() as i32;
    let height = image.height() as i32;
    let left = left.clamp(0, width.saturating_sub(1));
    let right = right.clamp(0, width.saturating_sub(1));
    let top = top.clamp(0, height.saturating_sub(1));
    let bottom = bottom.clamp(0, height.saturating_sub(1));

    for y in top..=bottom {
        for x in left..=right {
            *image.get_pixel_mut(x as u32, y as u32) = color;
        }
    }
}

fn draw_label(
    image: &mut ImageBuffer<Rgba<u8>, Vec<u8>>,
    mut x: i32,
    y: i32,
    text: &str,
    color: Rgba<u8>,
) {
    let height = image.height() as i32;
    for ch in text.chars().flat_map(|c| c.to_uppercase()) {
        if let Some(glyph) = glyph_bits(ch) {
            for (row, pattern) in glyph.iter().enumerate() {
                let py = y + row as i32;
                if py < 0 || py >= height {
                    continue;
                }
                for col in 0..5 {
                    if (pattern >> (4 - col)) & 1 == 1 {
                        let px = x + col as i32;
                        if px >= 0 && px < image.width() as i32 {
                            *image.get_pixel_mut(px as u32, py as u32) = color;
                        }
                    }
                }
            }
        }
        x += 6;
    }
}

fn glyph_bits(ch: char) -> Option<[u8; 7]> {
    match ch {
        'A' => Some([
            0b01110, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001,
        ]),
        'B' => Some([
            0b11110, 0b10001, 0b10001, 0b11110, 0b10001, 0b10001, 0b11110,
        ]),
        'C' => Some([
            0b01110, 0b10001, 0b10000, 0b10000, 0b10000, 0b10001, 0b01110,
        ]),
        'D' => Some([
            0b11110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b11110,
        ]),
        'E' => Some([
            0b11111, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000, 0b11111,
        ]),
        'F' => Some([
            0b11111, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000, 0b10000,
        ]),
        'G' => Some([
            0b01110, 0b10001, 0b10000, 0b10111, 0b10001, 0b10001, 0b01110,
        ]),
        'H' => Some([
            0b10001, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001,
        ]),
        'I' => Some([
            0b01110, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110,
        ]),
        'K' => Some([
            0b10001, 0b10010, 0b10100, 0b11000, 0b10100, 0b10010, 0b10001,
        ]),
        'L' => Some([
            0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b11111,
        ]),
        'M' => Some([
            0b10001, 0b11011, 0b10101, 0b10101, 0b10001, 0b10001, 0b10001,
        ]),
        'N' => Some([
            0b10001, 0b11001, 0b10101, 0b10101, 0b10011, 0b10001, 0b10001,
        ]),
        'O' => Some([
            0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110,
        ]),
        'P' => Some([
            0b11110, 0b10001, 0b10001, 0b11110, 0b10000, 0b10000, 0b10000,
        ]),
        'R' => Some([
            0b11110, 0b10001, 0b10001, 0b11110, 0b10100, 0b10010, 0b10001,
        ]),
        'S' => Some([
            0b01111, 0b10000, 0b01110, 0b00001, 0b00001, 0b10001, 0b01110,
        ]),
        'T' => Some([
            0b11111, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100,
        ]),
        'U' => Some([
            0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110,
        ]),
        'V' => Some([
            0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01010, 0b00100,
        ]),
        'W' => Some([
            0b10001, 0b10001, 0b10001, 0b10101, 0b10101, 0b10101, 0b01010,
        ]),
        'Y' => Some([
            0b10001, 0b10001, 0b01010, 0b00100, 0b00100, 0b00100, 0b00100,
        ]),
        '0' => Some([
            0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110,
        ]),
        '1' => Some([
            0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110,
        ]),
        '2' => Some([
            0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111,
        ]),
        '3' => Some([
            0b11110, 0b00001, 0b00001, 0b01110, 0b00001, 0b00001, 0b11110,
        ]),
        '4' => Some([
            0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010,
        ]),
        '5' => Some([
            0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110,
        ]),
        '6' => Some([
            0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110,
        ]),
        '7' => Some([
            0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000,
        ]),
        '8' => Some([
            0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110,
        ]),
        '9' => Some([
            0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100,
        ]),
        '.' => Some([0, 0, 0, 0, 0, 0b00110, 0b00110]),
        ' ' => Some([0, 0, 0, 0, 0, 0, 0]),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use video_capture::{Frame, FrameFormat};

    use super::*;
    use crate::{
        data::SignalPhase,
        filter::{VehicleClass, VehicleDetection},
    };

    fn frame(width: i32, height: i32) -> Frame {
        Frame {
            data: vec![0x40; (width * height * 3) as usize],
            width,
            height,
            timestamp_ms: 1_000,
            format: FrameFormat::Bgr8,
        }
    }

    fn state() -> TrafficState {
        TrafficState {
            signal: SignalPhase::Green,
            timer: Duration::from_secs(15),
            last_change: Instant::now(),
            vehicle_count: 3,
        }
    }

    #[test]
    fn produces_a_jpeg_with_the_snapshot_attached() {
        let vehicles = vec![VehicleDetection {
            class: VehicleClass::Car,
            bbox: [8.0, 8.0, 40.0, 30.0],
        }];
        let packet = annotate_frame(&frame(64, 48), &vehicles, state(), 7, 12.5, 80).unwrap();
        assert_eq!(&packet.jpeg[..2], &[0xFF, 0xD8], "missing JPEG SOI marker");
        assert_eq!(packet.frame_number, 7);
        assert_eq!(packet.state.signal, SignalPhase::Green);
        assert_eq!(packet.state.vehicle_count, 3);
        assert_eq!(packet.timestamp_ms, 1_000);
    }

    #[test]
    fn out_of_frame_boxes_are_clamped_not_panicking() {
        let vehicles = vec![VehicleDetection {
            class: VehicleClass::Truck,
            bbox: [-10.0, -10.0, 500.0, 500.0],
        }];
        let packet = annotate_frame(&frame(32, 32), &vehicles, state(), 1, 0.0, 80).unwrap();
        assert!(!packet.jpeg.is_empty());
    }
}
