use anyhow::{Context, Result};
use base64::{engine::general_purpose, Engine as _};
use image::DynamicImage;

/// Decode a browser data URL (`data:image/jpeg;base64,<payload>`) into an image.
///
/// Only the part after the first comma is used; the header is not inspected.
pub fn decode_data_url(data_url: &str) -> Result<DynamicImage> {
    let bytes = data_url_bytes(data_url)?;
    image::load_from_memory(&bytes).context("Failed to decode image")
}

pub fn data_url_bytes(data_url: &str) -> Result<Vec<u8>> {
    let (_, payload) = data_url
        .split_once(',')
        .context("Invalid image data: expected '<header>,<base64 payload>'")?;
    let payload: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    general_purpose::STANDARD
        .decode(payload.as_bytes())
        .context("Invalid base64 image payload")
}
