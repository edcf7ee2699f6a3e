//! Error types for the ghiblify library.
//!
//! [`TransformError`] carries the full diagnostic detail of a failure
//! (upstream status, session id, byte counts). [`ErrorKind`] collapses
//! those variants onto the categories a caller actually branches on:
//!
//! | Kind | Network call made? | Typical cause |
//! |------|--------------------|---------------|
//! | `Validation` | never | empty/malformed credential, empty or oversized image |
//! | `Decode` | never | bytes are not a supported raster image |
//! | `Network` | attempted | DNS, TLS, connection reset, HTTP timeout |
//! | `Provider` | yes | non-2xx status, failed job, unparseable body |
//! | `Timeout` | yes | polling budget exhausted |
//! | `Cancelled` | yes | caller fired the cancellation token |
//! | `Internal` | maybe | worker task panicked, runtime could not start |
//!
//! No error escapes [`crate::transform::transform`]: every one of these is
//! folded into [`crate::output::TransformationResult::Failure`].

use crate::config::Provider;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Every failure a transformation can end in.
#[derive(Debug, Clone, Error)]
pub enum TransformError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Credential or image rejected before any network activity.
    #[error("{reason}")]
    Validation { reason: String },

    /// Input image exceeds the configured upload limit.
    #[error("Image is too large: {size} bytes (limit {limit} bytes)\nUpload an image smaller than {} MB.", .limit / (1024 * 1024))]
    InputTooLarge { size: usize, limit: usize },

    /// Input bytes could not be interpreted as a raster image.
    #[error("Could not decode image: {detail}\nSupported formats: JPEG, PNG, WebP.")]
    Decode { detail: String },

    /// Re-encoding the resized image failed.
    #[error("Could not re-encode image: {detail}")]
    Encode { detail: String },

    // ── Transport errors ──────────────────────────────────────────────────
    /// Transport-level failure reaching the provider.
    #[error("Could not reach {provider}: {detail}\nCheck your internet connection.")]
    Network { provider: Provider, detail: String },

    // ── Provider errors ───────────────────────────────────────────────────
    /// Provider answered with a non-success status. `message` is the
    /// upstream text verbatim.
    #[error("{provider} returned HTTP {status}: {message}")]
    Provider {
        provider: Provider,
        status: u16,
        message: String,
    },

    /// A 2xx response whose body did not have the documented shape.
    #[error("{provider} sent an unexpected response: {detail}")]
    MalformedResponse { provider: Provider, detail: String },

    /// The provider accepted the job but reported that generation failed.
    #[error("{provider} generation failed: {detail}")]
    GenerationFailed { provider: Provider, detail: String },

    // ── Polling errors ────────────────────────────────────────────────────
    /// Polling budget exhausted before a terminal upstream status.
    #[error("Image generation timed out after {budget:?} ({polls} status checks for job {session_id})\nPlease try again.")]
    Timeout {
        session_id: String,
        budget: Duration,
        polls: u32,
    },

    /// Caller fired the cancellation token. `session_id` is set when a job
    /// had already been queued upstream.
    #[error(
        "Transformation cancelled{}",
        .session_id.as_deref().map(|id| format!(" (job {id})")).unwrap_or_default()
    )]
    Cancelled { session_id: Option<String> },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TransformError {
    /// Shorthand for a [`TransformError::Validation`].
    pub fn validation(reason: impl Into<String>) -> Self {
        TransformError::Validation {
            reason: reason.into(),
        }
    }

    /// The taxonomy bucket this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransformError::Validation { .. }
            | TransformError::InputTooLarge { .. }
            | TransformError::InvalidConfig(_) => ErrorKind::Validation,
            TransformError::Decode { .. } | TransformError::Encode { .. } => ErrorKind::Decode,
            TransformError::Network { .. } => ErrorKind::Network,
            TransformError::Provider { .. }
            | TransformError::MalformedResponse { .. }
            | TransformError::GenerationFailed { .. } => ErrorKind::Provider,
            TransformError::Timeout { .. } => ErrorKind::Timeout,
            TransformError::Cancelled { .. } => ErrorKind::Cancelled,
            TransformError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Upstream HTTP status, when the provider sent one.
    pub fn status(&self) -> Option<u16> {
        match self {
            TransformError::Provider { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Coarse error category surfaced to the UI collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Decode,
    Network,
    Provider,
    Timeout,
    Cancelled,
    Internal,
}

impl ErrorKind {
    /// One-line headline suitable for a toast or status bar.
    pub fn user_message(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "Please check your API key and image before trying again.",
            ErrorKind::Decode => "That file could not be read as an image (JPEG, PNG).",
            ErrorKind::Network => "Could not reach the image service.",
            ErrorKind::Provider => "The image service rejected the request.",
            ErrorKind::Timeout => "Image generation timed out. Please try again.",
            ErrorKind::Cancelled => "Transformation cancelled.",
            ErrorKind::Internal => "Something went wrong. Please try again.",
        }
    }
}
