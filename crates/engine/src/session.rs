// crates/engine/src/session.rs
//! Batch lifecycle controller.
//!
//! `BatchTracker` owns the registry, the reconciler and the poll scheduler
//! for one batch at a time. Submitting a new batch or resetting bumps the
//! generation, which retroactively invalidates every in-flight update from
//! the previous batch at the reconciler's membership gate.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info};

use polydub_types::{BatchSnapshot, CreationOutcome, PushMessage, StatusUpdate};

use crate::events::BatchEvent;
use crate::poll::{PollScheduler, StatusSource};
use crate::reconcile::{ApplyOutcome, Reconciler};
use crate::registry::{BatchState, SharedBatch};

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Gap between poll cycles.
    pub poll_interval: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(3),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    /// The creation response started no jobs at all.
    #[error("no translation jobs were started")]
    NothingStarted,
}

pub struct BatchTracker {
    state: SharedBatch,
    reconciler: Arc<Reconciler>,
    poller: PollScheduler,
    source: Arc<dyn StatusSource>,
    events: broadcast::Sender<BatchEvent>,
    poll_interval: Duration,
}

impl BatchTracker {
    pub fn new(source: Arc<dyn StatusSource>, config: TrackerConfig) -> Arc<Self> {
        let state: SharedBatch = Arc::new(RwLock::new(BatchState::default()));
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let reconciler = Arc::new(Reconciler::new(state.clone(), events.clone()));
        Arc::new(Self {
            state,
            reconciler,
            poller: PollScheduler::new(),
            source,
            events,
            poll_interval: config.poll_interval,
        })
    }

    /// Seed a new batch from a creation response and start polling.
    /// Returns the new generation.
    pub async fn start_batch(
        &self,
        requested: &[String],
        outcome: CreationOutcome,
    ) -> Result<u64, TrackerError> {
        // Stop the old run first so its in-flight cycle cannot race the
        // reseed; late results for the old generation are dropped by the
        // membership gate anyway.
        self.poller.stop();

        let generation = {
            let mut state = self.state.write().await;
            let generation = state.generation() + 1;
            state.seed(generation, requested, &outcome);
            if state.jobs().is_empty() {
                return Err(TrackerError::NothingStarted);
            }
            generation
        };
        info!(generation, jobs = outcome.jobs.len(), "batch started");

        let initial = self.snapshot().await;
        let already_complete = initial.batch_complete;
        let _ = self.events.send(BatchEvent::Snapshot(initial.clone()));
        if already_complete {
            // Every creation entry arrived terminal; there is nothing to
            // poll, but observers still need the completion edge.
            info!(generation, "batch terminal at creation");
            let _ = self.events.send(BatchEvent::BatchComplete(initial));
        } else {
            self.poller.start(
                self.poll_interval,
                self.state.clone(),
                Arc::clone(&self.source),
                Arc::clone(&self.reconciler),
            );
        }
        Ok(generation)
    }

    /// Abandon the current batch: stop polling, clear the registry, bump
    /// the generation so stragglers from the old batch are dropped.
    pub async fn reset(&self) {
        self.poller.stop();
        let mut state = self.state.write().await;
        let generation = state.generation() + 1;
        state.clear(generation);
        info!(generation, "batch reset");
    }

    /// Route one parsed push frame into the reconciler.
    pub async fn handle_push(&self, message: PushMessage) {
        match message {
            PushMessage::Event(event) => {
                let remote_id = event.remote_id.clone();
                let outcome = self
                    .reconciler
                    .apply_by_remote_id(&remote_id, StatusUpdate::from(event))
                    .await;
                if let ApplyOutcome::Applied {
                    batch_complete: true,
                } = outcome
                {
                    self.poller.stop();
                }
            }
            PushMessage::LegacyCompletion {
                language,
                result_url,
            } => {
                let outcome = self
                    .reconciler
                    .apply(&language, StatusUpdate::completed(result_url))
                    .await;
                if let ApplyOutcome::Applied {
                    batch_complete: true,
                } = outcome
                {
                    self.poller.stop();
                }
            }
            PushMessage::GlobalError {
                message,
                error_code,
            } => {
                let reason = match error_code {
                    Some(code) => format!("{message} (code {code})"),
                    None => message,
                };
                self.poller.stop();
                self.reconciler.fail_all(&reason).await;
            }
            PushMessage::Other => {
                debug!("unrecognized push frame, ignoring");
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BatchEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> BatchSnapshot {
        crate::aggregate::snapshot(&*self.state.read().await)
    }

    pub fn is_polling(&self) -> bool {
        self.poller.is_running()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use tokio::task::yield_now;

    use polydub_types::{CreatedJob, JobStatus, JobStatusReport};

    /// Source that always reports Processing; keeps polling alive so tests
    /// drive state through push frames.
    struct HoldingSource;

    #[async_trait]
    impl StatusSource for HoldingSource {
        async fn job_status(&self, _remote_id: &str) -> anyhow::Result<JobStatusReport> {
            Ok(JobStatusReport {
                status: JobStatus::Processing,
                progress: 10,
                result_url: None,
                error_reason: None,
            })
        }
    }

    fn outcome(entries: &[(&str, &str)]) -> CreationOutcome {
        CreationOutcome {
            jobs: entries
                .iter()
                .map(|(language, remote_id)| CreatedJob {
                    language: language.to_string(),
                    remote_id: remote_id.to_string(),
                    status: JobStatus::Queued,
                    progress: 0,
                })
                .collect(),
        }
    }

    fn tracker() -> Arc<BatchTracker> {
        BatchTracker::new(Arc::new(HoldingSource), TrackerConfig::default())
    }

    async fn settle(tracker: &BatchTracker) {
        for _ in 0..100 {
            if !tracker.is_polling() {
                return;
            }
            yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn start_batch_seeds_registry_and_begins_polling() {
        let tracker = tracker();
        let requested = vec!["es".to_string(), "fr".to_string(), "de".to_string()];

        let generation = tracker
            .start_batch(&requested, outcome(&[("es", "r1"), ("fr", "r2")]))
            .await
            .unwrap();

        assert_eq!(generation, 1);
        let snap = tracker.snapshot().await;
        assert_eq!(snap.jobs.len(), 2);
        assert_eq!(snap.not_started, vec!["de".to_string()]);
        assert!(tracker.is_polling());
        tracker.reset().await;
    }

    #[tokio::test(start_paused = true)]
    async fn batch_terminal_at_seed_emits_batch_complete_without_polling() {
        let tracker = tracker();
        let mut rx = tracker.subscribe();

        // The creation response can report a job already failed; honor it.
        let outcome = CreationOutcome {
            jobs: vec![CreatedJob {
                language: "es".to_string(),
                remote_id: "r1".to_string(),
                status: JobStatus::Failed,
                progress: 0,
            }],
        };
        tracker
            .start_batch(&["es".to_string()], outcome)
            .await
            .unwrap();

        assert!(!tracker.is_polling());
        let mut saw_complete = false;
        while let Ok(event) = rx.try_recv() {
            if let BatchEvent::BatchComplete(snap) = event {
                assert!(snap.batch_complete);
                assert_eq!(snap.jobs["es"].status, JobStatus::Failed);
                saw_complete = true;
            }
        }
        assert!(saw_complete);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_creation_response_is_an_error() {
        let tracker = tracker();
        let result = tracker
            .start_batch(&["es".to_string()], CreationOutcome::default())
            .await;
        assert!(matches!(result, Err(TrackerError::NothingStarted)));
        assert!(!tracker.is_polling());
    }

    #[tokio::test(start_paused = true)]
    async fn push_completion_of_last_job_stops_polling() {
        let tracker = tracker();
        tracker
            .start_batch(&["es".to_string()], outcome(&[("es", "r1")]))
            .await
            .unwrap();

        tracker
            .handle_push(
                PushMessage::parse(
                    r#"{"type":"event","data":{"_id":"r1","video_status":3,"progress":100,"url":"https://cdn/es.mp4"}}"#,
                )
                .unwrap(),
            )
            .await;

        let snap = tracker.snapshot().await;
        assert!(snap.batch_complete);
        assert_eq!(
            snap.jobs["es"].result_url.as_deref(),
            Some("https://cdn/es.mp4")
        );
        settle(&tracker).await;
        assert!(!tracker.is_polling());
    }

    #[tokio::test(start_paused = true)]
    async fn legacy_completion_frame_is_applied_by_language() {
        let tracker = tracker();
        tracker
            .start_batch(&["es".to_string()], outcome(&[("es", "r1")]))
            .await
            .unwrap();

        tracker
            .handle_push(
                PushMessage::parse(
                    r#"{"type":"event","data":{"url":"https://cdn/es.mp4","language_code":"es"}}"#,
                )
                .unwrap(),
            )
            .await;

        let snap = tracker.snapshot().await;
        assert_eq!(snap.jobs["es"].status, JobStatus::Completed);
        assert_eq!(snap.jobs["es"].progress, 100);
        settle(&tracker).await;
    }

    #[tokio::test(start_paused = true)]
    async fn global_error_fails_batch_and_stops_polling() {
        let tracker = tracker();
        tracker
            .start_batch(
                &["es".to_string(), "fr".to_string()],
                outcome(&[("es", "r1"), ("fr", "r2")]),
            )
            .await
            .unwrap();
        let mut rx = tracker.subscribe();

        tracker
            .handle_push(
                PushMessage::parse(r#"{"type":"error","message":"quota exceeded","error_code":429}"#)
                    .unwrap(),
            )
            .await;

        let snap = tracker.snapshot().await;
        assert!(snap.batch_complete);
        assert!(snap
            .jobs
            .values()
            .all(|job| job.status == JobStatus::Failed));
        assert_eq!(
            snap.jobs["es"].error_reason.as_deref(),
            Some("quota exceeded (code 429)")
        );

        let mut saw_global_error = false;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, BatchEvent::GlobalError { .. }) {
                saw_global_error = true;
            }
        }
        assert!(saw_global_error);
        settle(&tracker).await;
        assert!(!tracker.is_polling());
    }

    #[tokio::test(start_paused = true)]
    async fn new_batch_drops_stale_updates_from_previous_generation() {
        let tracker = tracker();
        tracker
            .start_batch(&["es".to_string()], outcome(&[("es", "r1")]))
            .await
            .unwrap();
        tracker.reset().await;
        tracker
            .start_batch(&["fr".to_string()], outcome(&[("fr", "r9")]))
            .await
            .unwrap();

        // Straggler addressed to the old batch's remote id.
        tracker
            .handle_push(
                PushMessage::parse(
                    r#"{"type":"event","data":{"_id":"r1","video_status":3,"progress":100,"url":"https://cdn/old.mp4"}}"#,
                )
                .unwrap(),
            )
            .await;

        let snap = tracker.snapshot().await;
        assert_eq!(snap.generation, 3);
        assert_eq!(snap.jobs.len(), 1);
        assert_eq!(snap.jobs["fr"].status, JobStatus::Queued);
        tracker.reset().await;
        settle(&tracker).await;
    }
}
