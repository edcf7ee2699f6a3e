//! Pipeline stages for photo-to-illustration transformation.
//!
//! Each submodule implements exactly one step, so each can be tested on its
//! own and a provider can be swapped without touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ preprocess ──▶ provider.submit ──┬──▶ Complete(image)
//! (path/URL)  (1024² JPEG)   (stability |    │
//!                             leonardo)      └──▶ Queued(id) ──▶ poll ──▶ image
//! ```
//!
//! 1. [`input`]      — load bytes from a path, URL or data URL (front-end helper)
//! 2. [`preprocess`] — decode, stretch to 1024×1024, re-encode as JPEG q90;
//!    runs in `spawn_blocking` because it is pure CPU
//! 3. [`provider`]   — the [`provider::ProviderClient`] seam and credential check
//! 4. [`stability`]  — synchronous multipart image-to-image
//! 5. [`leonardo`]   — queued JSON submission plus status endpoint
//! 6. [`poll`]       — bounded polling state machine for queued jobs

pub mod input;
pub mod leonardo;
pub mod poll;
pub mod preprocess;
pub mod provider;
pub mod stability;
