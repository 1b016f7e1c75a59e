// crates/engine/src/poll.rs
//! Fixed-interval poll scheduler.
//!
//! `Idle -> Running -> Idle`. One cycle snapshots the live registry's
//! remote-id set, queries every job concurrently, waits for all outcomes,
//! and feeds successes through the reconciler. Transport errors are logged
//! and retried next cycle; they never become job failures. Cycles never
//! overlap — the single task awaits a full cycle before the next tick.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use polydub_types::JobStatusReport;

use crate::reconcile::{ApplyOutcome, Reconciler};
use crate::registry::SharedBatch;

/// Per-job status queries, keyed by remote id. Implemented by the HTTP
/// client; tests script it.
#[async_trait]
pub trait StatusSource: Send + Sync + 'static {
    async fn job_status(&self, remote_id: &str) -> anyhow::Result<JobStatusReport>;
}

#[derive(Default)]
struct Slot {
    epoch: u64,
    token: Option<CancellationToken>,
}

/// Owns the poll timer. `start` replaces any previous run; `stop` is
/// idempotent and safe while a cycle is in flight — the in-flight cycle
/// drains and its late results die at the reconciler's membership gate.
pub struct PollScheduler {
    slot: Arc<Mutex<Slot>>,
}

impl Default for PollScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl PollScheduler {
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Mutex::new(Slot::default())),
        }
    }

    /// Begin polling: an immediate first cycle, then one per `interval`.
    pub fn start(
        &self,
        interval: Duration,
        state: SharedBatch,
        source: Arc<dyn StatusSource>,
        reconciler: Arc<Reconciler>,
    ) {
        let token = CancellationToken::new();
        let epoch = {
            let mut slot = match self.slot.lock() {
                Ok(slot) => slot,
                Err(e) => {
                    error!("poll slot mutex poisoned: {e}");
                    return;
                }
            };
            if let Some(old) = slot.token.take() {
                old.cancel();
            }
            slot.epoch += 1;
            slot.token = Some(token.clone());
            slot.epoch
        };

        let slot_handle = Arc::clone(&self.slot);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                if run_cycle(&state, &source, &reconciler).await {
                    info!("batch terminal, polling stopped");
                    break;
                }
            }
            // Mark Idle, unless a newer run already took the slot.
            match slot_handle.lock() {
                Ok(mut slot) => {
                    if slot.epoch == epoch {
                        slot.token = None;
                    }
                }
                Err(e) => error!("poll slot mutex poisoned: {e}"),
            }
        });
    }

    /// Cancel the timer. No-op when already idle.
    pub fn stop(&self) {
        match self.slot.lock() {
            Ok(mut slot) => {
                if let Some(token) = slot.token.take() {
                    token.cancel();
                }
            }
            Err(e) => error!("poll slot mutex poisoned: {e}"),
        }
    }

    pub fn is_running(&self) -> bool {
        self.slot
            .lock()
            .map(|slot| slot.token.is_some())
            .unwrap_or(false)
    }
}

/// One poll cycle. Returns true when the batch is terminal and polling
/// should end.
async fn run_cycle(
    state: &SharedBatch,
    source: &Arc<dyn StatusSource>,
    reconciler: &Arc<Reconciler>,
) -> bool {
    // Re-read the live registry every cycle — never a cached set from start
    // time — so jobs are not polled past a terminal state or a reset.
    let targets = state.read().await.poll_targets();
    if targets.is_empty() {
        return state.read().await.all_terminal();
    }
    debug!(jobs = targets.len(), "poll cycle");

    let queries = targets.into_iter().map(|(language, remote_id)| {
        let source = Arc::clone(source);
        async move {
            match source.job_status(&remote_id).await {
                Ok(report) => Some((remote_id, report)),
                Err(error) => {
                    warn!(%language, %remote_id, %error, "status query failed, retrying next cycle");
                    None
                }
            }
        }
    });

    let mut batch_complete = false;
    for (remote_id, report) in join_all(queries).await.into_iter().flatten() {
        if let ApplyOutcome::Applied {
            batch_complete: complete,
        } = reconciler
            .apply_by_remote_id(&remote_id, report.into())
            .await
        {
            batch_complete = complete;
        }
    }
    batch_complete
}
