//! Input resolution: turn a user-supplied path, URL or data URL into bytes.
//!
//! The orchestrator itself only ever sees bytes. This stage is what a front
//! end runs before it: read the file, enforce the upload limit, and make
//! sure the bytes at least *look* like an image so the user hears about a
//! wrong file before an API key is even checked.

use crate::config::TransformConfig;
use crate::error::TransformError;
use crate::output::sniff_mime;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Where the image came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    Local(PathBuf),
    Url(String),
    DataUrl,
}

/// Raw image bytes plus their sniffed MIME type.
#[derive(Debug, Clone)]
pub struct LoadedImage {
    pub bytes: Vec<u8>,
    pub mime: &'static str,
    pub source: InputSource,
}

/// Check if the input string looks like an HTTP(S) URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Check if the input string is a `data:` URL.
pub fn is_data_url(input: &str) -> bool {
    input.starts_with("data:")
}

/// Load an image from a local path, an HTTP(S) URL, or a base64 data URL.
pub async fn load_image(input: &str, config: &TransformConfig) -> Result<LoadedImage, TransformError> {
    let (bytes, source) = if is_data_url(input) {
        (decode_data_url(input)?, InputSource::DataUrl)
    } else if is_url(input) {
        (download(input, config).await?, InputSource::Url(input.to_string()))
    } else {
        let path = PathBuf::from(input);
        (read_local(&path, config).await?, InputSource::Local(path))
    };

    let mime = check_image_bytes(&bytes, config.max_input_bytes)?;
    debug!("Loaded {} bytes ({}) from {:?}", bytes.len(), mime, source);
    Ok(LoadedImage {
        bytes,
        mime,
        source,
    })
}

/// Enforce the size limit and that the bytes sniff as a supported image.
pub fn check_image_bytes(bytes: &[u8], max_bytes: usize) -> Result<&'static str, TransformError> {
    if bytes.is_empty() {
        return Err(TransformError::validation("image required"));
    }
    if bytes.len() > max_bytes {
        return Err(TransformError::InputTooLarge {
            size: bytes.len(),
            limit: max_bytes,
        });
    }
    sniff_mime(bytes).ok_or_else(|| {
        TransformError::validation("Please upload an image file (JPEG, PNG, WebP)")
    })
}

async fn read_local(path: &Path, config: &TransformConfig) -> Result<Vec<u8>, TransformError> {
    let meta = tokio::fs::metadata(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => {
            TransformError::validation(format!("Image file not found: '{}'", path.display()))
        }
        std::io::ErrorKind::PermissionDenied => {
            TransformError::validation(format!("Permission denied reading '{}'", path.display()))
        }
        _ => TransformError::validation(format!("Cannot read '{}': {e}", path.display())),
    })?;

    if !meta.is_file() {
        return Err(TransformError::validation(format!(
            "'{}' is not a file",
            path.display()
        )));
    }
    // Refuse before reading a huge file into memory.
    if meta.len() as usize > config.max_input_bytes {
        return Err(TransformError::InputTooLarge {
            size: meta.len() as usize,
            limit: config.max_input_bytes,
        });
    }

    tokio::fs::read(path).await.map_err(|e| {
        TransformError::validation(format!("Cannot read '{}': {e}", path.display()))
    })
}

async fn download(url: &str, config: &TransformConfig) -> Result<Vec<u8>, TransformError> {
    info!("Downloading image from: {}", url);
    let failed = |reason: String| {
        TransformError::validation(format!("Failed to download '{url}': {reason}"))
    };

    let client = reqwest::Client::builder()
        .timeout(config.api_timeout())
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| failed(e.to_string()))?;
    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }
    let limit = config.max_input_bytes;
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(TransformError::InputTooLarge {
                size: len as usize,
                limit,
            });
        }
    }

    // Chunked responses carry no length; enforce the limit as bytes arrive.
    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| failed(e.to_string()))?;
        if bytes.len() + chunk.len() > limit {
            return Err(TransformError::InputTooLarge {
                size: bytes.len() + chunk.len(),
                limit,
            });
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}

/// Decode `data:image/...;base64,<payload>`.
fn decode_data_url(input: &str) -> Result<Vec<u8>, TransformError> {
    let (header, payload) = input
        .split_once(',')
        .ok_or_else(|| TransformError::validation("Malformed data URL: missing ','"))?;
    if !header.starts_with("data:image/") || !header.ends_with(";base64") {
        return Err(TransformError::validation(
            "Only base64 image data URLs are supported",
        ));
    }
    STANDARD
        .decode(payload.trim())
        .map_err(|e| TransformError::validation(format!("Malformed data URL: {e}")))
}
