//! Progress-callback trait for transformation events.
//!
//! Inject an [`Arc<dyn TransformProgressCallback>`] via
//! [`crate::config::TransformConfigBuilder::progress_callback`] to follow a
//! transformation as it moves through preprocessing, submission and polling.
//!
//! # Example
//!
//! ```rust
//! use ghiblify::{PollStatus, TransformConfig, TransformProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicU32, Ordering}};
//!
//! struct PollCounter {
//!     polls: AtomicU32,
//! }
//!
//! impl TransformProgressCallback for PollCounter {
//!     fn on_poll(&self, attempt: u32, status: &PollStatus) {
//!         self.polls.store(attempt, Ordering::SeqCst);
//!         eprintln!("check #{attempt}: {status:?}");
//!     }
//! }
//!
//! let config = TransformConfig::builder()
//!     .progress_callback(Arc::new(PollCounter { polls: AtomicU32::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use crate::pipeline::provider::PollStatus;
use std::sync::Arc;

/// Coarse phase of a transformation, reported in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Decoding, resizing and re-encoding the source image.
    Preprocessing,
    /// Sending the generation request.
    Submitting,
    /// Waiting on a queued job.
    Polling,
}

/// Called by the orchestrator as a transformation progresses.
///
/// Implementations must be `Send + Sync` because independent transformations
/// may share one callback across tasks. All methods default to no-ops.
pub trait TransformProgressCallback: Send + Sync {
    /// Called when a new stage begins.
    fn on_stage(&self, stage: Stage) {
        let _ = stage;
    }

    /// Called after each status check of a queued job.
    ///
    /// # Arguments
    /// * `attempt` — 1-based check number
    /// * `status`  — what the provider reported
    fn on_poll(&self, attempt: u32, status: &PollStatus) {
        let _ = (attempt, status);
    }

    /// Called exactly once with the terminal outcome.
    fn on_complete(&self, success: bool) {
        let _ = success;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl TransformProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::TransformConfig`].
pub type ProgressCallback = Arc<dyn TransformProgressCallback>;
