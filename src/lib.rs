//! # ghiblify
//!
//! Turn a photograph into a Studio Ghibli style illustration using a hosted
//! image-to-image model (Stability AI or Leonardo AI).
//!
//! ## Why this crate?
//!
//! The two services disagree on almost everything: Stability answers a
//! multipart request with the finished image, Leonardo takes JSON, queues a
//! job and expects you to come back later. This crate hides both behind one
//! call that always yields exactly one [`TransformationResult`], with a
//! bounded polling loop that cannot outlive its caller's interest.
//!
//! ## Pipeline Overview
//!
//! ```text
//! photo bytes
//!  │
//!  ├─ 1. Validate    credential format, non-empty image (no network)
//!  ├─ 2. Preprocess  decode → 1024×1024 → JPEG q90 (CPU-bound, spawn_blocking)
//!  ├─ 3. Submit      Stability multipart | Leonardo JSON job
//!  ├─ 4. Poll        queued jobs only: every 2s, at most 30s
//!  └─ 5. Result      inline bytes (Stability) or hosted URL (Leonardo)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ghiblify::{transform, Provider, TransformConfig, TransformationRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let photo = std::fs::read("portrait.jpg")?;
//!     let key = std::env::var(Provider::Leonardo.env_var())?;
//!     let request = TransformationRequest::new(photo, Provider::Leonardo, key);
//!
//!     let output = transform(request, &TransformConfig::default())
//!         .await
//!         .into_result()?;
//!     println!("{}", output.image.data_url());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `ghiblify` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! ghiblify = { version = "0.1", default-features = false }
//! ```
//!
//! ## Providers
//!
//! | Provider | Flow | Result | Key |
//! |----------|------|--------|-----|
//! | [`Provider::Stability`] | synchronous multipart | inline PNG bytes | `STABILITY_API_KEY` (`sk-…`) |
//! | [`Provider::Leonardo`]  | queued job + polling | hosted image URL | `LEONARDO_API_KEY` |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod request;
pub mod transform;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{Provider, StyleParams, TransformConfig, TransformConfigBuilder};
pub use error::{ErrorKind, TransformError};
pub use output::{GeneratedImage, TransformOutput, TransformStats, TransformationResult};
pub use pipeline::input::{load_image, LoadedImage};
pub use pipeline::poll::{PollPolicy, PollState};
pub use pipeline::provider::{PollStatus, ProviderClient, Submission};
pub use progress::{NoopProgressCallback, ProgressCallback, Stage, TransformProgressCallback};
pub use request::{Credential, TransformationRequest};
pub use tokio_util::sync::CancellationToken;
pub use transform::{transform, transform_sync, transform_with_cancel};
