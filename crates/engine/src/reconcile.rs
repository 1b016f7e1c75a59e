// crates/engine/src/reconcile.rs
//! The single serialized gate through which every update must pass.
//!
//! Both channels (push and poll) funnel into [`Reconciler::apply`] /
//! [`Reconciler::apply_by_remote_id`], which mutate the registry under one
//! write lock. Two gates make the engine safe against reordering and
//! duplication without per-update sequence numbers:
//!
//! 1. membership — the language/remote id must exist in the *current*
//!    generation's registry, which silently drops anything stale;
//! 2. terminal-lock — Completed/Failed is never overwritten, which makes
//!    duplicate terminal delivery idempotent and settles races between a
//!    late poll response and a pushed terminal update.

use tokio::sync::broadcast;
use tracing::{debug, warn};

use polydub_types::{JobStatus, StatusUpdate};

use crate::aggregate;
use crate::events::BatchEvent;
use crate::registry::{BatchState, SharedBatch};

/// What happened to one update at the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Written to the registry; aggregate recomputed and broadcast.
    Applied { batch_complete: bool },
    /// No job in the current generation matches — stale or unknown, dropped.
    Stale,
    /// Terminal-locked or a backward transition; dropped.
    Ignored,
    /// Data-integrity violation (Completed without a result URL); the job's
    /// prior state is retained.
    Rejected,
}

impl ApplyOutcome {
    pub fn accepted(self) -> bool {
        matches!(self, ApplyOutcome::Applied { .. })
    }
}

/// Sole writer of job status/progress/result after creation.
pub struct Reconciler {
    state: SharedBatch,
    events: broadcast::Sender<BatchEvent>,
}

impl Reconciler {
    pub(crate) fn new(state: SharedBatch, events: broadcast::Sender<BatchEvent>) -> Self {
        Self { state, events }
    }

    /// Apply an update addressed by language code.
    pub async fn apply(&self, language: &str, update: StatusUpdate) -> ApplyOutcome {
        let mut state = self.state.write().await;
        self.apply_locked(&mut state, language, update)
    }

    /// Apply an update addressed by remote id. Resolution happens under the
    /// same write lock as the mutation, so a reset between lookup and apply
    /// cannot let a stale update through.
    pub async fn apply_by_remote_id(&self, remote_id: &str, update: StatusUpdate) -> ApplyOutcome {
        let mut state = self.state.write().await;
        let Some(language) = state
            .find_by_remote_id(remote_id)
            .map(|job| job.language.clone())
        else {
            debug!(%remote_id, "update for untracked remote id, dropping");
            return ApplyOutcome::Stale;
        };
        self.apply_locked(&mut state, &language, update)
    }

    /// Global failure: fail every non-terminal job and broadcast once.
    ///
    /// Completed jobs keep their delivered results — the per-job terminal
    /// invariant outranks a connection-level error report. With no tracked
    /// jobs this is a stale frame from a superseded session and does nothing.
    pub async fn fail_all(&self, reason: &str) {
        let mut state = self.state.write().await;
        if state.jobs().is_empty() {
            debug!("global error with no tracked jobs, dropping");
            return;
        }
        let was_complete = state.all_terminal();
        let mut changed = false;
        for job in state.jobs_mut().values_mut() {
            if !job.status.is_terminal() {
                job.status = JobStatus::Failed;
                job.progress = 0;
                job.error_reason = Some(reason.to_string());
                changed = true;
            }
        }

        let _ = self.events.send(BatchEvent::GlobalError {
            message: reason.to_string(),
        });
        if changed {
            let snap = aggregate::snapshot(&state);
            let _ = self.events.send(BatchEvent::Snapshot(snap.clone()));
            if !was_complete {
                let _ = self.events.send(BatchEvent::BatchComplete(snap));
            }
        }
    }

    fn apply_locked(
        &self,
        state: &mut BatchState,
        language: &str,
        update: StatusUpdate,
    ) -> ApplyOutcome {
        let was_complete = state.all_terminal();

        let Some(job) = state.get_mut(language) else {
            debug!(%language, "update for untracked language, dropping");
            return ApplyOutcome::Stale;
        };
        if job.status.is_terminal() {
            debug!(%language, status = ?job.status, "job already terminal, dropping update");
            return ApplyOutcome::Ignored;
        }
        if !job.status.can_advance_to(update.status) {
            debug!(
                %language,
                from = ?job.status,
                to = ?update.status,
                "backward status transition, dropping"
            );
            return ApplyOutcome::Ignored;
        }

        match update.status {
            JobStatus::Completed => {
                let Some(url) = update.result_url else {
                    warn!(%language, "completed update without result URL, retaining prior state");
                    return ApplyOutcome::Rejected;
                };
                job.status = JobStatus::Completed;
                job.progress = 100;
                job.result_url = Some(url);
            }
            JobStatus::Failed => {
                job.status = JobStatus::Failed;
                job.progress = 0;
                job.error_reason = update
                    .error_reason
                    .or_else(|| Some("translation failed".to_string()));
            }
            status => {
                job.status = status;
                job.progress = update.progress.unwrap_or(0).min(100);
            }
        }

        let snap = aggregate::snapshot(state);
        let batch_complete = snap.batch_complete;
        let _ = self.events.send(BatchEvent::Snapshot(snap.clone()));
        if batch_complete && !was_complete {
            let _ = self.events.send(BatchEvent::BatchComplete(snap));
        }
        ApplyOutcome::Applied { batch_complete }
    }
}
