use std::io::Cursor;
use anyhow::Result;
use base64::{Engine as _, engine::general_purpose};
use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};
use attendance_backend_sqlite::pipeline::FaceEncoder;

pub const RED: [u8; 3] = [255, 0, 0];
pub const GREEN: [u8; 3] = [0, 255, 0];
pub const BLUE: [u8; 3] = [0, 0, 255];
pub const BLACK: [u8; 3] = [0, 0, 0];

/// Deterministic encoder: every non-black pixel in the top row is a face and
/// its colour, scaled to 0..1, is the embedding.
pub struct PixelEncoder;

impl FaceEncoder for PixelEncoder {
    fn encode(&self, image: &DynamicImage) -> Result<Vec<Vec<f32>>> {
        let rgb = image.to_rgb8();
        Ok((0..rgb.width())
            .map(|x| rgb.get_pixel(x, 0))
            .filter(|p| p.0 != [0, 0, 0])
            .map(|p| p.0.iter().map(|&c| c as f32 / 255.0).collect())
            .collect())
    }
}

/// PNG data URL with one pixel per entry in `pixels`.
pub fn png_data_url(pixels: &[[u8; 3]]) -> String {
    let mut img = RgbImage::new(pixels.len().max(1) as u32, 1);
    for (x, p) in pixels.iter().enumerate() {
        img.put_pixel(x as u32, 0, Rgb(*p));
    }
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buf), ImageOutputFormat::Png)
        .unwrap();
    format!("data:image/png;base64,{}", general_purpose::STANDARD.encode(&buf))
}
