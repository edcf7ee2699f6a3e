//! Polling controller for queued generation jobs.
//!
//! ## State machine
//!
//! ```text
//!                ┌──────── check: PENDING ────────┐
//!                ▼                                │
//! submit ──▶ Polling ──── tick ──▶ check_status ──┘
//!                │
//!                ├── check: COMPLETE ─────────▶ Succeeded
//!                ├── check: FAILED / error ───▶ Failed
//!                ├── now ≥ deadline ──────────▶ TimedOut
//!                └── cancellation token ──────▶ Cancelled
//! ```
//!
//! One task owns the session and drives it with a single `select!` over
//! the cancellation token, the deadline and the next tick. A status check
//! that is still in flight when the deadline or the token fires is dropped,
//! so its answer can never be observed: once timed out, a late COMPLETE is
//! ignored. Every terminal transition consumes the [`PollingSession`], which
//! makes a second transition (or another tick) unrepresentable.

use crate::error::TransformError;
use crate::output::GeneratedImage;
use crate::pipeline::provider::{PollStatus, ProviderClient};
use crate::progress::ProgressCallback;
use crate::request::Credential;
use std::time::Duration;
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Cadence and total budget of a polling session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub budget: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            budget: Duration::from_secs(30),
        }
    }
}

/// Longest budget a session accepts; larger policies are clamped to it.
pub const MAX_POLL_BUDGET: Duration = Duration::from_secs(60 * 60);

/// Lifecycle state of a [`PollingSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Polling,
    Succeeded,
    Failed,
    TimedOut,
    Cancelled,
}

impl PollState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PollState::Polling)
    }
}

/// One queued job being watched.
#[derive(Debug)]
pub struct PollingSession {
    session_id: String,
    created_at: Instant,
    interval: Duration,
    deadline: Instant,
    budget: Duration,
    state: PollState,
    polls: u32,
}

/// A session that reached `Succeeded`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedSession {
    pub image: GeneratedImage,
    pub polls: u32,
    pub elapsed: Duration,
}

impl PollingSession {
    /// Open a session now; the deadline is `now + policy.budget`.
    ///
    /// The budget is clamped to [`MAX_POLL_BUDGET`] and the interval to
    /// `1ms..=budget`, so any policy yields a valid deadline and ticker.
    pub fn start(session_id: impl Into<String>, policy: PollPolicy) -> Self {
        let created_at = Instant::now();
        let budget = policy.budget.min(MAX_POLL_BUDGET);
        let interval = policy.interval.clamp(Duration::from_millis(1), budget.max(Duration::from_millis(1)));
        Self {
            session_id: session_id.into(),
            created_at,
            interval,
            deadline: created_at + budget,
            budget,
            state: PollState::Polling,
            polls: 0,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    pub fn polls(&self) -> u32 {
        self.polls
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    fn transition(&mut self, to: PollState) {
        debug_assert_eq!(self.state, PollState::Polling, "session already terminal");
        debug!(
            "Session {}: {:?} → {:?} after {} checks",
            self.session_id, self.state, to, self.polls
        );
        self.state = to;
    }

    fn succeed(mut self, image: GeneratedImage) -> Result<CompletedSession, TransformError> {
        self.transition(PollState::Succeeded);
        let elapsed = self.created_at.elapsed();
        info!(
            "Generation {} complete after {} checks ({}ms)",
            self.session_id,
            self.polls,
            elapsed.as_millis()
        );
        Ok(CompletedSession {
            image,
            polls: self.polls,
            elapsed,
        })
    }

    fn fail(mut self, error: TransformError) -> Result<CompletedSession, TransformError> {
        self.transition(PollState::Failed);
        warn!("Generation {} failed: {}", self.session_id, error);
        Err(error)
    }

    fn time_out(mut self) -> Result<CompletedSession, TransformError> {
        self.transition(PollState::TimedOut);
        warn!(
            "Generation {} timed out after {:?} ({} checks)",
            self.session_id, self.budget, self.polls
        );
        Err(TransformError::Timeout {
            session_id: self.session_id,
            budget: self.budget,
            polls: self.polls,
        })
    }

    fn cancel(mut self) -> Result<CompletedSession, TransformError> {
        self.transition(PollState::Cancelled);
        info!("Generation {} cancelled by caller", self.session_id);
        Err(TransformError::Cancelled {
            session_id: Some(self.session_id),
        })
    }
}

/// Poll `session` until it reaches a terminal state.
///
/// The first check happens one interval after the session was opened, and
/// then once per interval. No check is issued, and no answer is read, after
/// this function returns.
pub async fn run_session(
    mut session: PollingSession,
    client: &dyn ProviderClient,
    credential: &Credential,
    cancel: &CancellationToken,
    progress: Option<&ProgressCallback>,
) -> Result<CompletedSession, TransformError> {
    let deadline = sleep_until(session.deadline);
    tokio::pin!(deadline);

    let mut ticker = interval_at(session.created_at + session.interval, session.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return session.cancel(),
            _ = &mut deadline => return session.time_out(),
            _ = ticker.tick() => {}
        }

        session.polls += 1;
        let attempt = session.polls;
        debug!("Session {}: status check #{}", session.session_id, attempt);

        let checked = tokio::select! {
            biased;
            _ = cancel.cancelled() => return session.cancel(),
            _ = &mut deadline => return session.time_out(),
            r = client.check_status(&session.session_id, credential) => r,
        };

        // An answer that raced the deadline loses.
        if Instant::now() >= session.deadline {
            return session.time_out();
        }

        let status = match checked {
            Ok(status) => status,
            Err(e) => return session.fail(e),
        };
        if let Some(cb) = progress {
            cb.on_poll(attempt, &status);
        }

        match status {
            PollStatus::Pending { .. } => continue,
            PollStatus::Complete(image) => return session.succeed(image),
            PollStatus::Failed { status, detail } => {
                let provider = client.provider();
                return session.fail(TransformError::GenerationFailed {
                    provider,
                    detail: format!("{detail} (status {status})"),
                });
            }
        }
    }
}
