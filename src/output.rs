//! Result types produced by a transformation.
//!
//! A call always yields exactly one [`TransformationResult`]. On success it
//! carries a [`TransformOutput`]: the [`GeneratedImage`] plus timing stats.

use crate::config::{Provider, TransformConfig};
use crate::error::{ErrorKind, TransformError};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Serialize;
use tracing::{debug, info};

/// The stylised image returned by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GeneratedImage {
    /// Image bytes delivered in the response body (Stability).
    Inline {
        #[serde(skip)]
        bytes: Vec<u8>,
        mime: String,
    },
    /// Image hosted by the provider (Leonardo).
    Remote { url: String },
}

impl GeneratedImage {
    /// Render an inline image as a `data:` URL; remote images return their URL.
    pub fn data_url(&self) -> String {
        match self {
            GeneratedImage::Inline { bytes, mime } => {
                format!("data:{};base64,{}", mime, STANDARD.encode(bytes))
            }
            GeneratedImage::Remote { url } => url.clone(),
        }
    }

    /// Bytes of the image, downloading it first when it is remote.
    ///
    /// Returns the bytes together with their MIME type.
    pub async fn fetch(&self, config: &TransformConfig) -> Result<(Vec<u8>, String), TransformError> {
        let url = match self {
            GeneratedImage::Inline { bytes, mime } => return Ok((bytes.clone(), mime.clone())),
            GeneratedImage::Remote { url } => url,
        };

        info!("Downloading generated image from: {}", url);
        let network = |e: reqwest::Error| TransformError::Network {
            provider: Provider::Leonardo,
            detail: e.to_string(),
        };

        let client = reqwest::Client::builder()
            .timeout(config.api_timeout())
            .build()
            .map_err(network)?;
        let response = client.get(url).send().await.map_err(network)?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransformError::Provider {
                provider: Provider::Leonardo,
                status: status.as_u16(),
                message: format!("download of {url} failed"),
            });
        }

        let bytes = response.bytes().await.map_err(network)?.to_vec();
        let mime = sniff_mime(&bytes).ok_or_else(|| TransformError::MalformedResponse {
            provider: Provider::Leonardo,
            detail: format!("{url} did not return an image"),
        })?;
        debug!("Downloaded {} bytes ({})", bytes.len(), mime);
        Ok((bytes, mime.to_string()))
    }

    /// File extension matching the image type, without the dot.
    pub fn extension(&self) -> &str {
        match self {
            GeneratedImage::Inline { mime, .. } => mime_extension(mime),
            GeneratedImage::Remote { url } => url
                .rsplit('/')
                .next()
                .and_then(|name| name.split('?').next())
                .and_then(|name| name.rsplit_once('.').map(|(_, ext)| ext))
                .filter(|ext| !ext.is_empty() && ext.len() <= 4)
                .unwrap_or("png"),
        }
    }
}

/// MIME type of encoded image bytes, if they look like a supported format.
pub fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    match image::guess_format(bytes).ok()? {
        image::ImageFormat::Png => Some("image/png"),
        image::ImageFormat::Jpeg => Some("image/jpeg"),
        image::ImageFormat::WebP => Some("image/webp"),
        _ => None,
    }
}

/// File extension for a MIME type.
pub fn mime_extension(mime: &str) -> &'static str {
    match mime {
        "image/jpeg" => "jpg",
        "image/webp" => "webp",
        _ => "png",
    }
}

/// Timing and bookkeeping for one successful transformation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TransformStats {
    /// Size of the caller's image.
    pub input_bytes: usize,
    /// Size of the re-encoded upload.
    pub prepared_bytes: usize,
    pub preprocess_duration_ms: u64,
    /// Time from submission to a terminal answer (including polling).
    pub generation_duration_ms: u64,
    /// Status checks issued; zero for synchronous providers.
    pub polls: u32,
    pub total_duration_ms: u64,
}

/// A successful transformation.
#[derive(Debug, Clone, Serialize)]
pub struct TransformOutput {
    pub provider: Provider,
    pub image: GeneratedImage,
    /// Provider-issued job id, for asynchronous providers.
    pub session_id: Option<String>,
    pub stats: TransformStats,
}

/// The single terminal outcome of a transformation.
#[derive(Debug, Clone)]
pub enum TransformationResult {
    Success(TransformOutput),
    Failure(TransformError),
}

impl TransformationResult {
    pub fn is_success(&self) -> bool {
        matches!(self, TransformationResult::Success(_))
    }

    /// Error category, or `None` on success.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            TransformationResult::Success(_) => None,
            TransformationResult::Failure(e) => Some(e.kind()),
        }
    }

    /// Convert into a standard `Result` for `?`-style callers.
    pub fn into_result(self) -> Result<TransformOutput, TransformError> {
        match self {
            TransformationResult::Success(out) => Ok(out),
            TransformationResult::Failure(e) => Err(e),
        }
    }

    pub fn error(&self) -> Option<&TransformError> {
        match self {
            TransformationResult::Success(_) => None,
            TransformationResult::Failure(e) => Some(e),
        }
    }
}

impl From<Result<TransformOutput, TransformError>> for TransformationResult {
    fn from(r: Result<TransformOutput, TransformError>) -> Self {
        match r {
            Ok(out) => TransformationResult::Success(out),
            Err(e) => TransformationResult::Failure(e),
        }
    }
}
