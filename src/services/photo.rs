// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Chore proof photos: shrink before upload.
//!
//! Photos travel as base64 inside a JSON body, so they are downscaled and
//! re-encoded as JPEG to land around 100-300 KB.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;

/// Backend payload ceiling; anything larger is refused outright.
pub const MAX_INPUT_BYTES: usize = 50 * 1024 * 1024;

/// Upper bound of the size target.
pub const TARGET_MAX_BYTES: usize = 300 * 1024;

/// Longest edge after downscaling, in pixels.
pub const MAX_EDGE_PX: u32 = 1600;

/// JPEG qualities tried in order until the target is met.
const QUALITY_STEPS: [u8; 4] = [85, 70, 55, 40];

#[derive(Debug, thiserror::Error)]
pub enum PhotoError {
    #[error("Photo is {0} bytes, over the 50 MB limit")]
    TooLarge(usize),

    #[error("Unsupported or corrupt image: {0}")]
    Image(#[from] image::ImageError),
}

/// JPEG ready for upload.
#[derive(Debug, Clone)]
pub struct PreparedPhoto {
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
    pub width: u32,
    pub height: u32,
    pub quality: u8,
}

impl PreparedPhoto {
    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.bytes)
    }
}

/// Decode, downscale and re-encode `input`.
///
/// If even the lowest quality step misses the target, that smallest
/// attempt is returned anyway.
pub fn prepare_photo(input: &[u8]) -> Result<PreparedPhoto, PhotoError> {
    if input.len() > MAX_INPUT_BYTES {
        return Err(PhotoError::TooLarge(input.len()));
    }

    let mut img = image::load_from_memory(input)?;
    if img.width().max(img.height()) > MAX_EDGE_PX {
        img = img.resize(MAX_EDGE_PX, MAX_EDGE_PX, FilterType::Triangle);
    }
    let rgb = img.to_rgb8();

    let mut photo = encode_jpeg(&rgb, QUALITY_STEPS[0])?;
    for &quality in &QUALITY_STEPS[1..] {
        if photo.bytes.len() <= TARGET_MAX_BYTES {
            break;
        }
        photo = encode_jpeg(&rgb, quality)?;
    }

    if photo.bytes.len() > TARGET_MAX_BYTES {
        tracing::warn!(
            size = photo.bytes.len(),
            target = TARGET_MAX_BYTES,
            "Photo still above size target at lowest quality"
        );
    } else {
        tracing::debug!(
            size = photo.bytes.len(),
            quality = photo.quality,
            width = photo.width,
            height = photo.height,
            "Photo prepared"
        );
    }
    Ok(photo)
}

fn encode_jpeg(rgb: &image::RgbImage, quality: u8) -> Result<PreparedPhoto, PhotoError> {
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, quality).encode_image(rgb)?;
    Ok(PreparedPhoto {
        bytes,
        mime_type: "image/jpeg",
        width: rgb.width(),
        height: rgb.height(),
        quality,
    })
}
