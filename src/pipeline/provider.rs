//! The provider seam: one capability, one implementation per service.
//!
//! Every image-generation service is driven through [`ProviderClient`]:
//!
//! * [`ProviderClient::submit`] sends the prepared image and answers either
//!   with the finished image ([`Submission::Complete`]) or with a job id to
//!   poll ([`Submission::Queued`]).
//! * [`ProviderClient::check_status`] reports on a queued job.
//!
//! The orchestrator never branches on the provider itself; it only reacts
//! to the `Submission` variant. Adding a service means adding one more
//! implementation and one more arm in [`build_client`].

use crate::config::{Provider, StyleParams, TransformConfig};
use crate::error::TransformError;
use crate::output::GeneratedImage;
use crate::pipeline::leonardo::LeonardoClient;
use crate::pipeline::preprocess::PreparedImage;
use crate::pipeline::stability::StabilityClient;
use crate::prompts::STABILITY_KEY_PREFIX;
use crate::request::Credential;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

/// What a provider answered to a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// The response already carried the generated image.
    Complete(GeneratedImage),
    /// The provider queued a job; poll `session_id` for the result.
    Queued { session_id: String },
}

/// What a provider reported for a queued job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStatus {
    /// Still running. `status` is the upstream status word.
    Pending { status: String },
    /// Finished; the image is ready.
    Complete(GeneratedImage),
    /// The job ended without an image.
    Failed { status: String, detail: String },
}

impl PollStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PollStatus::Pending { .. })
    }
}

/// A client for one image-generation service.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// The service this client talks to.
    fn provider(&self) -> Provider;

    /// Reject malformed credentials without touching the network.
    fn validate_credential(&self, credential: &Credential) -> Result<(), TransformError> {
        validate_credential(self.provider(), credential)
    }

    /// Send the generation request.
    async fn submit(
        &self,
        image: &PreparedImage,
        style: &StyleParams,
        credential: &Credential,
    ) -> Result<Submission, TransformError>;

    /// Ask for the state of a queued job.
    async fn check_status(
        &self,
        session_id: &str,
        credential: &Credential,
    ) -> Result<PollStatus, TransformError>;
}

/// Basic format check for `provider`'s API keys.
///
/// * every provider: non-blank, no embedded whitespace
/// * Stability AI: must start with `sk-`
pub fn validate_credential(provider: Provider, credential: &Credential) -> Result<(), TransformError> {
    if credential.is_blank() {
        return Err(TransformError::validation("credential required"));
    }
    let secret = credential.expose();
    if secret.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(TransformError::validation(
            "credential must not contain whitespace",
        ));
    }
    if provider == Provider::Stability && !secret.starts_with(STABILITY_KEY_PREFIX) {
        return Err(TransformError::validation(format!(
            "{provider} keys start with '{STABILITY_KEY_PREFIX}'"
        )));
    }
    Ok(())
}

/// Instantiate the built-in client for `provider`.
pub fn build_client(
    provider: Provider,
    config: &TransformConfig,
) -> Result<Arc<dyn ProviderClient>, TransformError> {
    let http = http_client(provider, config)?;
    let base_url = config.base_url(provider).trim_end_matches('/').to_string();
    Ok(match provider {
        Provider::Stability => Arc::new(StabilityClient::new(http, base_url)),
        Provider::Leonardo => Arc::new(LeonardoClient::new(http, base_url)),
    })
}

// ── Shared HTTP helpers ──────────────────────────────────────────────────

fn http_client(provider: Provider, config: &TransformConfig) -> Result<reqwest::Client, TransformError> {
    reqwest::Client::builder()
        .timeout(config.api_timeout())
        .user_agent(concat!("ghiblify/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| network_error(provider, e))
}

pub(crate) fn network_error(provider: Provider, e: reqwest::Error) -> TransformError {
    TransformError::Network {
        provider,
        detail: e.to_string(),
    }
}

/// Turn a non-2xx response into a [`TransformError::Provider`].
pub(crate) async fn error_from_response(
    provider: Provider,
    response: reqwest::Response,
) -> TransformError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = upstream_message(&body).unwrap_or_else(|| {
        status
            .canonical_reason()
            .unwrap_or("Failed to generate image")
            .to_string()
    });
    warn!("{} answered HTTP {}: {}", provider, status.as_u16(), message);
    TransformError::Provider {
        provider,
        status: status.as_u16(),
        message,
    }
}

/// Pull the human-readable message out of an error body.
///
/// Stability sends `{"message": "..."}`; Leonardo sends `{"error": "..."}`;
/// some gateways nest it as `{"error": {"message": "..."}}`. Plain-text
/// bodies are passed through.
pub(crate) fn upstream_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    let Ok(json) = serde_json::from_str::<serde_json::Value>(trimmed) else {
        return Some(trimmed.to_string());
    };
    json.get("message")
        .and_then(|m| m.as_str())
        .or_else(|| json.get("error").and_then(|e| e.as_str()))
        .or_else(|| {
            json.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
        })
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_credential_is_required() {
        for provider in [Provider::Stability, Provider::Leonardo] {
            let err = validate_credential(provider, &Credential::new("")).unwrap_err();
            assert_eq!(err.to_string(), "credential required");
            let err = validate_credential(provider, &Credential::new("  \n")).unwrap_err();
            assert_eq!(err.to_string(), "credential required");
        }
    }

    #[test]
    fn stability_needs_sk_prefix() {
        assert!(validate_credential(Provider::Stability, &Credential::new("sk-abc123")).is_ok());
        let err = validate_credential(Provider::Stability, &Credential::new("abc123")).unwrap_err();
        assert!(err.to_string().contains("sk-"), "got: {err}");
    }

    #[test]
    fn leonardo_has_no_prefix_rule() {
        assert!(validate_credential(
            Provider::Leonardo,
            &Credential::new("3f2b9c1e-0000-4000-8000-123456789abc")
        )
        .is_ok());
    }

    #[test]
    fn embedded_whitespace_is_rejected() {
        let err = validate_credential(Provider::Leonardo, &Credential::new("abc def")).unwrap_err();
        assert!(err.to_string().contains("whitespace"));
    }

    #[test]
    fn surrounding_whitespace_is_trimmed() {
        assert!(validate_credential(Provider::Stability, &Credential::new(" sk-abc\n")).is_ok());
    }

    #[test]
    fn upstream_message_shapes() {
        assert_eq!(
            upstream_message(r#"{"id":"x","name":"insufficient_balance","message":"insufficient credits"}"#),
            Some("insufficient credits".into())
        );
        assert_eq!(
            upstream_message(r#"{"error":"invalid api key","code":"invalid-jwt"}"#),
            Some("invalid api key".into())
        );
        assert_eq!(
            upstream_message(r#"{"error":{"message":"nested"}}"#),
            Some("nested".into())
        );
        assert_eq!(upstream_message("Bad Gateway"), Some("Bad Gateway".into()));
        assert_eq!(upstream_message("   "), None);
        assert_eq!(upstream_message(r#"{"unrelated":true}"#), None);
    }

    #[test]
    fn poll_status_terminality() {
        assert!(!PollStatus::Pending { status: "PENDING".into() }.is_terminal());
        assert!(PollStatus::Failed {
            status: "FAILED".into(),
            detail: String::new()
        }
        .is_terminal());
    }
}
