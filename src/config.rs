//! Configuration types for photo-to-illustration transformation.
//!
//! Two layers of settings exist because they change at different rates:
//!
//! * [`TransformConfig`] — endpoints, timeouts, polling cadence, injected
//!   collaborators. Built once and shared across many calls.
//! * [`StyleParams`] — the generation knobs for one request. Every provider
//!   ships a fixed default set via [`StyleParams::for_provider`].

use crate::error::TransformError;
use crate::pipeline::poll::{PollPolicy, MAX_POLL_BUDGET};
use crate::pipeline::provider::ProviderClient;
use crate::progress::ProgressCallback;
use crate::prompts::{
    GHIBLI_NEGATIVE_PROMPT, GHIBLI_PROMPT, LEONARDO_GHIBLI_PROMPT, LEONARDO_MODEL_ID,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Default Stability AI API root.
pub const DEFAULT_STABILITY_BASE_URL: &str = "https://api.stability.ai";

/// Default Leonardo AI REST root.
pub const DEFAULT_LEONARDO_BASE_URL: &str = "https://cloud.leonardo.ai/api/rest/v1";

/// Configuration shared by every transformation.
///
/// Built via [`TransformConfig::builder()`] or using
/// [`TransformConfig::default()`].
///
/// # Example
/// ```rust
/// use ghiblify::TransformConfig;
///
/// let config = TransformConfig::builder()
///     .api_timeout_secs(90)
///     .poll_interval_ms(2000)
///     .poll_budget_secs(45)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct TransformConfig {
    /// Stability AI API root. Default: [`DEFAULT_STABILITY_BASE_URL`].
    pub stability_base_url: String,

    /// Leonardo AI REST root. Default: [`DEFAULT_LEONARDO_BASE_URL`].
    pub leonardo_base_url: String,

    /// Per-HTTP-call timeout in seconds. Default: 60.
    ///
    /// SDXL image-to-image at 40 steps routinely takes 10–20 s server-side,
    /// so this must stay well above that.
    pub api_timeout_secs: u64,

    /// Delay between two status checks of a queued job. Default: 2000.
    pub poll_interval_ms: u64,

    /// Total time a queued job may stay pending before the transformation
    /// fails with a timeout. Default: 30.
    pub poll_budget_secs: u64,

    /// Largest raw image accepted, in bytes. Default: 10 MiB.
    pub max_input_bytes: usize,

    /// Pre-constructed provider client. Takes precedence over the built-in
    /// client for the request's [`Provider`].
    pub provider_client: Option<Arc<dyn ProviderClient>>,

    /// Receives stage and poll events while a transformation runs.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            stability_base_url: DEFAULT_STABILITY_BASE_URL.to_string(),
            leonardo_base_url: DEFAULT_LEONARDO_BASE_URL.to_string(),
            api_timeout_secs: 60,
            poll_interval_ms: 2000,
            poll_budget_secs: 30,
            max_input_bytes: 10 * 1024 * 1024,
            provider_client: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for TransformConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformConfig")
            .field("stability_base_url", &self.stability_base_url)
            .field("leonardo_base_url", &self.leonardo_base_url)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("poll_budget_secs", &self.poll_budget_secs)
            .field("max_input_bytes", &self.max_input_bytes)
            .field(
                "provider_client",
                &self.provider_client.as_ref().map(|_| "<dyn ProviderClient>"),
            )
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn TransformProgressCallback>"),
            )
            .finish()
    }
}

impl TransformConfig {
    /// Create a new builder for `TransformConfig`.
    pub fn builder() -> TransformConfigBuilder {
        TransformConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn poll_budget(&self) -> Duration {
        Duration::from_secs(self.poll_budget_secs)
    }

    /// Cadence and budget for polling sessions opened under this config.
    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: self.poll_interval(),
            budget: self.poll_budget(),
        }
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }

    /// API root for the given provider.
    pub fn base_url(&self, provider: Provider) -> &str {
        match provider {
            Provider::Stability => &self.stability_base_url,
            Provider::Leonardo => &self.leonardo_base_url,
        }
    }
}

/// Builder for [`TransformConfig`].
#[derive(Debug)]
pub struct TransformConfigBuilder {
    config: TransformConfig,
}

impl TransformConfigBuilder {
    pub fn stability_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.stability_base_url = url.into();
        self
    }

    pub fn leonardo_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.leonardo_base_url = url.into();
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs.max(1);
        self
    }

    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms;
        self
    }

    pub fn poll_budget_secs(mut self, secs: u64) -> Self {
        self.config.poll_budget_secs = secs;
        self
    }

    pub fn max_input_bytes(mut self, bytes: usize) -> Self {
        self.config.max_input_bytes = bytes;
        self
    }

    pub fn provider_client(mut self, client: Arc<dyn ProviderClient>) -> Self {
        self.config.provider_client = Some(client);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<TransformConfig, TransformError> {
        let c = &self.config;
        if c.poll_interval_ms == 0 {
            return Err(TransformError::InvalidConfig(
                "Poll interval must be ≥ 1ms".into(),
            ));
        }
        if c.poll_budget_secs == 0 {
            return Err(TransformError::InvalidConfig(
                "Poll budget must be ≥ 1s".into(),
            ));
        }
        if c.poll_budget() > MAX_POLL_BUDGET {
            return Err(TransformError::InvalidConfig(format!(
                "Poll budget ({}s) exceeds the maximum of {}s",
                c.poll_budget_secs,
                MAX_POLL_BUDGET.as_secs()
            )));
        }
        if c.poll_interval() > c.poll_budget() {
            return Err(TransformError::InvalidConfig(format!(
                "Poll interval ({}ms) exceeds the poll budget ({}s)",
                c.poll_interval_ms, c.poll_budget_secs
            )));
        }
        if c.max_input_bytes == 0 {
            return Err(TransformError::InvalidConfig(
                "Max input size must be ≥ 1 byte".into(),
            ));
        }
        for (name, url) in [
            ("stability", &c.stability_base_url),
            ("leonardo", &c.leonardo_base_url),
        ] {
            if reqwest::Url::parse(url).is_err() {
                return Err(TransformError::InvalidConfig(format!(
                    "Invalid {name} base URL: '{url}'"
                )));
            }
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Which image-generation service handles the request.
///
/// | Provider | Protocol | Result |
/// |----------|----------|--------|
/// | `Stability` | one multipart POST, answer carries the image | inline bytes |
/// | `Leonardo` | JSON job submission, then status polling | remote URL |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Stability AI SDXL image-to-image. (default)
    #[default]
    Stability,
    /// Leonardo AI queued generations.
    Leonardo,
}

impl Provider {
    /// Whether the provider answers with a job id that must be polled.
    pub fn is_async(&self) -> bool {
        matches!(self, Provider::Leonardo)
    }

    /// Environment variable the CLI reads the credential from.
    pub fn env_var(&self) -> &'static str {
        match self {
            Provider::Stability => "STABILITY_API_KEY",
            Provider::Leonardo => "LEONARDO_API_KEY",
        }
    }

    /// Lowercase identifier, as accepted by [`FromStr`].
    pub fn id(&self) -> &'static str {
        match self {
            Provider::Stability => "stability",
            Provider::Leonardo => "leonardo",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Stability => f.write_str("Stability AI"),
            Provider::Leonardo => f.write_str("Leonardo AI"),
        }
    }
}

impl FromStr for Provider {
    type Err = TransformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "stability" | "stability-ai" | "stabilityai" => Ok(Provider::Stability),
            "leonardo" | "leonardo-ai" | "leonardoai" => Ok(Provider::Leonardo),
            other => Err(TransformError::InvalidConfig(format!(
                "Unknown provider '{other}' (expected 'stability' or 'leonardo')"
            ))),
        }
    }
}

/// Generation knobs for one request.
///
/// Not every field applies to every provider: Stability reads the prompt
/// weights, strength, cfg scale, steps, preset and seed; Leonardo reads the
/// prompts, model id and `alchemy`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleParams {
    /// Positive style prompt (weight 1).
    pub prompt: String,

    /// Things the model should steer away from.
    pub negative_prompt: Option<String>,

    /// Weight of the negative prompt. Clamped to −1.0..=−0.5. Default: −1.0.
    pub negative_weight: f32,

    /// How much of the source image survives, 0–1. Default: 0.35.
    ///
    /// Lower values hand more control to the prompt, so 0.35 gives a strong
    /// restyle while keeping the subject's pose and face recognisable.
    pub image_strength: f32,

    /// Classifier-free guidance scale. Default: 7.
    pub cfg_scale: u32,

    /// Diffusion steps. Default: 40.
    pub steps: u32,

    /// Stability style preset tag, e.g. `anime`.
    pub style_preset: Option<String>,

    /// Fixed seed for reproducible output.
    pub seed: Option<u32>,

    /// Leonardo model identifier.
    pub model_id: String,

    /// Leonardo quality-enhancement flag.
    pub alchemy: Option<bool>,
}

impl StyleParams {
    /// The fixed defaults for `provider`.
    pub fn for_provider(provider: Provider) -> Self {
        let prompt = match provider {
            Provider::Stability => GHIBLI_PROMPT,
            Provider::Leonardo => LEONARDO_GHIBLI_PROMPT,
        };
        Self {
            prompt: prompt.to_string(),
            negative_prompt: None,
            negative_weight: -1.0,
            image_strength: 0.35,
            cfg_scale: 7,
            steps: 40,
            style_preset: None,
            seed: None,
            model_id: LEONARDO_MODEL_ID.to_string(),
            alchemy: None,
        }
    }

    /// Use the built-in negative prompt.
    pub fn with_default_negative(mut self) -> Self {
        self.negative_prompt = Some(GHIBLI_NEGATIVE_PROMPT.to_string());
        self
    }

    pub fn negative_prompt(mut self, text: impl Into<String>, weight: f32) -> Self {
        self.negative_prompt = Some(text.into());
        self.negative_weight = weight.clamp(-1.0, -0.5);
        self
    }

    pub fn image_strength(mut self, strength: f32) -> Self {
        self.image_strength = strength.clamp(0.0, 1.0);
        self
    }

    pub fn style_preset(mut self, preset: impl Into<String>) -> Self {
        self.style_preset = Some(preset.into());
        self
    }

    pub fn seed(mut self, seed: u32) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn alchemy(mut self, on: bool) -> Self {
        self.alchemy = Some(on);
        self
    }
}

impl Default for StyleParams {
    fn default() -> Self {
        Self::for_provider(Provider::default())
    }
}
