//! Fixed style prompts and provider constants.
//!
//! The prompts are part of the product, not a user setting: every request
//! for a provider starts from the same text via
//! [`crate::config::StyleParams::for_provider`]. Keeping them here lets
//! tests assert on the exact wording that goes over the wire.

/// Positive prompt sent to Stability AI (weight 1).
pub const GHIBLI_PROMPT: &str = "Convert this image to Studio Ghibli style animation, soft colors, hand-drawn feel, whimsical, dreamy Hayao Miyazaki style";

/// Positive prompt sent to Leonardo AI.
///
/// Leonardo's content filter is stricter about named artists, so the
/// director's name is left out.
pub const LEONARDO_GHIBLI_PROMPT: &str = "Convert this image to Studio Ghibli style animation, soft colors, hand-drawn feel, whimsical, dreamy";

/// Optional negative prompt, opt-in via
/// [`crate::config::StyleParams::with_default_negative`].
pub const GHIBLI_NEGATIVE_PROMPT: &str = "photorealistic, 3d render, harsh shadows, oversaturated, deformed face, extra limbs, text, watermark";

/// Leonardo "creative" model used for every submission.
pub const LEONARDO_MODEL_ID: &str = "6bef9f1b-29cb-40c7-b9df-32b51c1f67d3";

/// Stability SDXL engine that accepts 1024×1024 init images.
pub const STABILITY_ENGINE: &str = "stable-diffusion-xl-1024-v1-0";

/// Prefix every Stability AI secret key carries.
pub const STABILITY_KEY_PREFIX: &str = "sk-";
