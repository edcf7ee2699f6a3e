//! The per-call input: raw image, provider, credential, style.

use crate::config::{Provider, StyleParams};
use std::fmt;

/// A provider API key.
///
/// Wrapped so that `Debug` output, `tracing` fields, and panic messages can
/// never leak the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// The secret with surrounding whitespace removed, for building the
    /// `Authorization` header.
    pub fn expose(&self) -> &str {
        self.0.trim()
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

impl From<&str> for Credential {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Credential {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Everything one call to [`crate::transform::transform`] needs.
#[derive(Debug, Clone)]
pub struct TransformationRequest {
    /// Encoded source image (JPEG, PNG, WebP).
    pub image: Vec<u8>,
    pub provider: Provider,
    pub credential: Credential,
    pub style: StyleParams,
}

impl TransformationRequest {
    /// A request using the provider's fixed default style.
    pub fn new(image: Vec<u8>, provider: Provider, credential: impl Into<Credential>) -> Self {
        Self {
            image,
            provider,
            credential: credential.into(),
            style: StyleParams::for_provider(provider),
        }
    }

    pub fn with_style(mut self, style: StyleParams) -> Self {
        self.style = style;
        self
    }
}
