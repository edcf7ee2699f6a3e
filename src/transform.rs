//! The transformation orchestrator.
//!
//! [`transform`] is the only entry point a front end needs: hand it the
//! raw photo, the chosen provider and the user's key, and it returns
//! exactly one [`TransformationResult`]. Internally it runs, strictly in
//! this order:
//!
//! 1. credential and image validation (no network)
//! 2. preprocessing to a 1024×1024 JPEG
//! 3. submission through the provider's [`ProviderClient`]
//! 4. polling, only when the provider queued the job
//!
//! Nothing is shared between calls except the read-only config, so any
//! number of transformations can run concurrently on one runtime.

use crate::config::{Provider, TransformConfig};
use crate::error::TransformError;
use crate::output::{TransformOutput, TransformStats, TransformationResult};
use crate::pipeline::poll::{self, PollingSession};
use crate::pipeline::preprocess::{self, ImageSpec};
use crate::pipeline::provider::{build_client, ProviderClient, Submission};
use crate::progress::Stage;
use crate::request::TransformationRequest;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Transform a photo into a Ghibli-style illustration.
///
/// Never returns an error directly: every failure is folded into
/// [`TransformationResult::Failure`].
///
/// # Example
/// ```rust,no_run
/// use ghiblify::{transform, Provider, TransformConfig, TransformationRequest, TransformationResult};
///
/// # #[tokio::main]
/// # async fn main() {
/// let photo = std::fs::read("selfie.jpg").unwrap();
/// let request = TransformationRequest::new(photo, Provider::Stability, "sk-...");
///
/// match transform(request, &TransformConfig::default()).await {
///     TransformationResult::Success(out) => println!("{}", out.image.data_url().len()),
///     TransformationResult::Failure(e) => eprintln!("{}: {}", e.kind().user_message(), e),
/// }
/// # }
/// ```
pub async fn transform(request: TransformationRequest, config: &TransformConfig) -> TransformationResult {
    transform_with_cancel(request, config, &CancellationToken::new()).await
}

/// [`transform`] with a caller-held cancellation token.
///
/// Firing `cancel` at any point ends the call with
/// [`TransformError::Cancelled`]. A token that fires before submission
/// means no request reaches the provider; one that fires while a request
/// or a status check is in flight drops it, and no further calls follow.
pub async fn transform_with_cancel(
    request: TransformationRequest,
    config: &TransformConfig,
    cancel: &CancellationToken,
) -> TransformationResult {
    let provider = request.provider;
    let result = run(request, config, cancel).await;

    match &result {
        Ok(out) => info!(
            "{} transformation complete in {}ms",
            provider, out.stats.total_duration_ms
        ),
        Err(e) => warn!("{} transformation failed ({:?}): {}", provider, e.kind(), e),
    }
    if let Some(ref cb) = config.progress_callback {
        cb.on_complete(result.is_ok());
    }

    result.into()
}

/// Synchronous wrapper around [`transform`].
///
/// Creates a temporary tokio runtime internally.
pub fn transform_sync(request: TransformationRequest, config: &TransformConfig) -> TransformationResult {
    match tokio::runtime::Runtime::new() {
        Ok(rt) => rt.block_on(transform(request, config)),
        Err(e) => TransformationResult::Failure(TransformError::Internal(format!(
            "Failed to create tokio runtime: {e}"
        ))),
    }
}

async fn run(
    request: TransformationRequest,
    config: &TransformConfig,
    cancel: &CancellationToken,
) -> Result<TransformOutput, TransformError> {
    let total_start = Instant::now();
    let TransformationRequest {
        image,
        provider,
        credential,
        style,
    } = request;
    info!("Starting {} transformation", provider);

    // ── Step 1: Validate ─────────────────────────────────────────────────
    let client = resolve_client(provider, config)?;
    client.validate_credential(&credential)?;
    if image.is_empty() {
        return Err(TransformError::validation("image required"));
    }
    if image.len() > config.max_input_bytes {
        return Err(TransformError::InputTooLarge {
            size: image.len(),
            limit: config.max_input_bytes,
        });
    }

    // ── Step 2: Preprocess ───────────────────────────────────────────────
    ensure_not_cancelled(cancel)?;
    emit(config, Stage::Preprocessing);
    let preprocess_start = Instant::now();
    let input_bytes = image.len();
    let prepared = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(cancelled()),
        r = preprocess::prepare_image_blocking(image, ImageSpec::for_provider(provider)) => r?,
    };
    let preprocess_duration_ms = preprocess_start.elapsed().as_millis() as u64;
    debug!(
        "Prepared {}×{} upload: {} → {} bytes in {}ms",
        prepared.width(),
        prepared.height(),
        input_bytes,
        prepared.bytes().len(),
        preprocess_duration_ms
    );

    // ── Step 3: Submit ───────────────────────────────────────────────────
    emit(config, Stage::Submitting);
    let generation_start = Instant::now();
    ensure_not_cancelled(cancel)?;
    let submission = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            info!("{} submission abandoned: cancelled", provider);
            return Err(cancelled());
        }
        r = client.submit(&prepared, &style, &credential) => r?,
    };

    // ── Step 4: Poll queued jobs ─────────────────────────────────────────
    let (image, session_id, polls) = match submission {
        Submission::Complete(image) => (image, None, 0),
        Submission::Queued { session_id } => {
            emit(config, Stage::Polling);
            let session = PollingSession::start(session_id.clone(), config.poll_policy());
            let done = poll::run_session(
                session,
                client.as_ref(),
                &credential,
                cancel,
                config.progress_callback.as_ref(),
            )
            .await?;
            (done.image, Some(session_id), done.polls)
        }
    };

    let stats = TransformStats {
        input_bytes,
        prepared_bytes: prepared.bytes().len(),
        preprocess_duration_ms,
        generation_duration_ms: generation_start.elapsed().as_millis() as u64,
        polls,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };

    Ok(TransformOutput {
        provider,
        image,
        session_id,
        stats,
    })
}

/// Resolve the provider client, from most-specific to least-specific.
///
/// 1. **Injected client** (`config.provider_client`): used as-is. This is
///    how tests and callers with custom middleware take over the transport.
/// 2. **Built-in client** for the request's [`Provider`], pointed at the
///    configured base URL.
///
/// Building a client never touches the network.
fn resolve_client(
    provider: Provider,
    config: &TransformConfig,
) -> Result<Arc<dyn ProviderClient>, TransformError> {
    if let Some(ref client) = config.provider_client {
        if client.provider() != provider {
            warn!(
                "Injected {} client handles a {} request",
                client.provider(),
                provider
            );
        }
        return Ok(Arc::clone(client));
    }
    build_client(provider, config)
}

fn cancelled() -> TransformError {
    TransformError::Cancelled { session_id: None }
}

fn ensure_not_cancelled(cancel: &CancellationToken) -> Result<(), TransformError> {
    if cancel.is_cancelled() {
        return Err(cancelled());
    }
    Ok(())
}

fn emit(config: &TransformConfig, stage: Stage) {
    if let Some(ref cb) = config.progress_callback {
        cb.on_stage(stage);
    }
}
