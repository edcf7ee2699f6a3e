//! Image preprocessing: arbitrary raster → fixed-size JPEG upload.
//!
//! Both providers receive a 1024×1024 init image; SDXL rejects any other
//! dimension outright. The resize is a plain stretch to the target square
//! (no crop, no padding), so non-square photos come out distorted.

use crate::config::Provider;
use crate::error::TransformError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;
use tracing::debug;

/// Square edge length every provider receives.
pub const TARGET_SIZE: u32 = 1024;

/// JPEG quality of the re-encoded upload.
pub const JPEG_QUALITY: u8 = 90;

/// Output dimensions and encoding a provider mandates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageSpec {
    pub width: u32,
    pub height: u32,
    pub jpeg_quality: u8,
}

impl ImageSpec {
    pub fn for_provider(provider: Provider) -> Self {
        match provider {
            Provider::Stability | Provider::Leonardo => Self {
                width: TARGET_SIZE,
                height: TARGET_SIZE,
                jpeg_quality: JPEG_QUALITY,
            },
        }
    }
}

/// A re-encoded image ready for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedImage {
    bytes: Vec<u8>,
    width: u32,
    height: u32,
}

impl PreparedImage {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn mime(&self) -> &'static str {
        "image/jpeg"
    }

    /// Standard base64 of the JPEG bytes, without a `data:` prefix.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }
}

/// Decode `raw`, stretch it to `spec`'s dimensions and re-encode as JPEG.
///
/// `raw` is only read; the result is a fresh buffer.
pub fn prepare_image(raw: &[u8], spec: ImageSpec) -> Result<PreparedImage, TransformError> {
    let img = image::load_from_memory(raw).map_err(|e| TransformError::Decode {
        detail: e.to_string(),
    })?;
    debug!(
        "Decoded {}×{} source image ({} bytes)",
        img.width(),
        img.height(),
        raw.len()
    );

    // JPEG has no alpha channel; flatten before encoding.
    let resized = img
        .resize_exact(spec.width, spec.height, FilterType::Lanczos3)
        .to_rgb8();

    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buf, spec.jpeg_quality);
    DynamicImage::ImageRgb8(resized)
        .write_with_encoder(encoder)
        .map_err(|e| TransformError::Encode {
            detail: e.to_string(),
        })?;

    debug!(
        "Re-encoded to {}×{} JPEG q{} → {} bytes",
        spec.width,
        spec.height,
        spec.jpeg_quality,
        buf.len()
    );

    Ok(PreparedImage {
        bytes: buf,
        width: spec.width,
        height: spec.height,
    })
}

/// [`prepare_image`] on the blocking pool.
///
/// Decoding and Lanczos resampling a 12-megapixel photo takes hundreds of
/// milliseconds of pure CPU.
pub async fn prepare_image_blocking(
    raw: Vec<u8>,
    spec: ImageSpec,
) -> Result<PreparedImage, TransformError> {
    tokio::task::spawn_blocking(move || prepare_image(&raw, spec))
        .await
        .map_err(|e| TransformError::Internal(format!("preprocess task failed: {e}")))?
}
