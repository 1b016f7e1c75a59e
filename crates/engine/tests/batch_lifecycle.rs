// crates/engine/tests/batch_lifecycle.rs
//! End-to-end batch lifecycles through the public `BatchTracker` surface:
//! poll-driven completion, push/poll interleaving, all-failed batches, and
//! duplicate-delivery idempotency.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use tokio::time::timeout;

use polydub_engine::{BatchEvent, BatchTracker, StatusSource, TrackerConfig};
use polydub_types::{BatchSnapshot, CreatedJob, CreationOutcome, JobStatus, JobStatusReport, PushMessage};

/// Per-remote-id script of poll responses. Each query pops the next report;
/// the final report repeats for the rest of the run. Unknown ids error, which
/// exercises the retry-next-cycle path.
struct ScriptedSource {
    scripts: Mutex<HashMap<String, VecDeque<JobStatusReport>>>,
}

impl ScriptedSource {
    fn new(scripts: &[(&str, Vec<JobStatusReport>)]) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(
                scripts
                    .iter()
                    .map(|(id, reports)| (id.to_string(), reports.iter().cloned().collect()))
                    .collect(),
            ),
        })
    }
}

#[async_trait]
impl StatusSource for ScriptedSource {
    async fn job_status(&self, remote_id: &str) -> anyhow::Result<JobStatusReport> {
        let mut scripts = self.scripts.lock().unwrap();
        let queue = scripts
            .get_mut(remote_id)
            .ok_or_else(|| anyhow::anyhow!("503 service unavailable"))?;
        if queue.len() > 1 {
            Ok(queue.pop_front().unwrap())
        } else {
            queue
                .front()
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("503 service unavailable"))
        }
    }
}

fn processing(progress: u8) -> JobStatusReport {
    JobStatusReport {
        status: JobStatus::Processing,
        progress,
        result_url: None,
        error_reason: None,
    }
}

fn completed(url: &str) -> JobStatusReport {
    JobStatusReport {
        status: JobStatus::Completed,
        progress: 100,
        result_url: Some(url.to_string()),
        error_reason: None,
    }
}

fn failed(reason: &str) -> JobStatusReport {
    JobStatusReport {
        status: JobStatus::Failed,
        progress: 0,
        result_url: None,
        error_reason: Some(reason.to_string()),
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

fn config() -> TrackerConfig {
    TrackerConfig {
        poll_interval: Duration::from_secs(3),
    }
}

async fn wait_for_completion(
    rx: &mut tokio::sync::broadcast::Receiver<BatchEvent>,
) -> BatchSnapshot {
    timeout(Duration::from_secs(120), async {
        loop {
            if let BatchEvent::BatchComplete(snapshot) = rx.recv().await.unwrap() {
                return snapshot;
            }
        }
    })
    .await
    .expect("batch never completed")
}

#[tokio::test(start_paused = true)]
async fn poll_alone_drives_batch_to_completion() {
    let source = ScriptedSource::new(&[
        ("r1", vec![processing(40), completed("https://cdn/es.mp4")]),
        (
            "r2",
            vec![processing(10), processing(70), completed("https://cdn/fr.mp4")],
        ),
    ]);
    let tracker = BatchTracker::new(source, config());
    let mut rx = tracker.subscribe();

    tracker
        .start_batch(
            &["es".to_string(), "fr".to_string()],
            outcome(&[("es", "r1"), ("fr", "r2")]),
        )
        .await
        .unwrap();

    let snapshot = wait_for_completion(&mut rx).await;
    assert!(snapshot.batch_complete);
    assert_eq!(snapshot.overall_progress, 100);
    assert_eq!(
        snapshot.jobs["es"].result_url.as_deref(),
        Some("https://cdn/es.mp4")
    );
    assert_eq!(
        snapshot.jobs["fr"].result_url.as_deref(),
        Some("https://cdn/fr.mp4")
    );
}

#[tokio::test(start_paused = true)]
async fn push_and_poll_interleave_without_conflict() {
    // es completes over push before polling ever reports it done; fr only
    // completes through polling.
    let source = ScriptedSource::new(&[
        ("r1", vec![processing(40)]),
        ("r2", vec![processing(60), completed("https://cdn/fr.mp4")]),
    ]);
    let tracker = BatchTracker::new(source, config());
    let mut rx = tracker.subscribe();

    tracker
        .start_batch(
            &["es".to_string(), "fr".to_string()],
            outcome(&[("es", "r1"), ("fr", "r2")]),
        )
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

    let snapshot = wait_for_completion(&mut rx).await;
    assert_eq!(snapshot.jobs["es"].status, JobStatus::Completed);
    assert_eq!(
        snapshot.jobs["es"].result_url.as_deref(),
        Some("https://cdn/es.mp4")
    );
    assert_eq!(snapshot.jobs["fr"].status, JobStatus::Completed);

    // Polling, once stopped, must not resurrect; the terminal lock also
    // rejects this stale poll-style downgrade if one slips through.
    tracker
        .handle_push(
            PushMessage::parse(r#"{"type":"event","data":{"_id":"r1","video_status":2,"progress":50}}"#)
                .unwrap(),
        )
        .await;
    let after = tracker.snapshot().await;
    assert_eq!(after.jobs["es"].status, JobStatus::Completed);
    assert_eq!(after.jobs["es"].progress, 100);
}

#[tokio::test(start_paused = true)]
async fn all_failed_batch_is_complete_with_zero_progress() {
    let source = ScriptedSource::new(&[
        ("r1", vec![processing(20), failed("face detection failed")]),
        ("r2", vec![processing(50)]),
    ]);
    let tracker = BatchTracker::new(source, config());
    let mut rx = tracker.subscribe();

    tracker
        .start_batch(
            &["es".to_string(), "fr".to_string()],
            outcome(&[("es", "r1"), ("fr", "r2")]),
        )
        .await
        .unwrap();

    // fr fails over push while es fails through polling.
    tracker
        .handle_push(
            PushMessage::parse(r#"{"type":"event","data":{"_id":"r2","video_status":4}}"#).unwrap(),
        )
        .await;

    let snapshot = wait_for_completion(&mut rx).await;
    assert!(snapshot.batch_complete);
    assert_eq!(snapshot.overall_progress, 0);
    assert_eq!(snapshot.jobs["es"].status, JobStatus::Failed);
    assert_eq!(
        snapshot.jobs["es"].error_reason.as_deref(),
        Some("face detection failed")
    );
    assert_eq!(snapshot.jobs["fr"].status, JobStatus::Failed);
    assert_eq!(snapshot.jobs["fr"].progress, 0);
}

#[tokio::test(start_paused = true)]
async fn duplicate_completion_delivery_emits_one_batch_complete() {
    let source = ScriptedSource::new(&[("r1", vec![processing(40)])]);
    let tracker = BatchTracker::new(source, config());
    let mut rx = tracker.subscribe();

    tracker
        .start_batch(&["es".to_string()], outcome(&[("es", "r1")]))
        .await
        .unwrap();

    let frame = r#"{"type":"event","data":{"_id":"r1","video_status":3,"progress":100,"url":"https://cdn/es.mp4"}}"#;
    tracker.handle_push(PushMessage::parse(frame).unwrap()).await;
    // Same completion again: push redelivery and a late poll result both
    // land here in practice.
    tracker.handle_push(PushMessage::parse(frame).unwrap()).await;

    let mut completions = 0;
    while let Ok(event) = rx.try_recv() {
        if matches!(event, BatchEvent::BatchComplete(_)) {
            completions += 1;
        }
    }
    assert_eq!(completions, 1);

    let snapshot = tracker.snapshot().await;
    assert_eq!(snapshot.jobs["es"].progress, 100);
    assert!(snapshot.batch_complete);
}
