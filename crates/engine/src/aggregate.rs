// crates/engine/src/aggregate.rs
//! Derived batch state: overall progress and the completion signal.
//!
//! Pure functions over the registry, recomputed synchronously after every
//! accepted update so observers never see the aggregate drift from the
//! per-job state.

use std::collections::HashMap;

use polydub_types::{BatchSnapshot, JobStatus, TranslationJob};

use crate::registry::BatchState;

/// Rounded mean progress over all jobs that have not failed.
///
/// Failed jobs are excluded so a single failure doesn't crater the visible
/// progress of healthy jobs; if every job has failed (or there are none),
/// the answer is 0.
pub fn overall_progress(jobs: &HashMap<String, TranslationJob>) -> u8 {
    let active: Vec<u8> = jobs
        .values()
        .filter(|job| job.status != JobStatus::Failed)
        .map(|job| job.progress)
        .collect();
    if active.is_empty() {
        return 0;
    }
    let mean = active.iter().map(|&p| p as f64).sum::<f64>() / active.len() as f64;
    mean.round().clamp(0.0, 100.0) as u8
}

/// Build the read-only view broadcast to observers.
pub fn snapshot(state: &BatchState) -> BatchSnapshot {
    BatchSnapshot {
        generation: state.generation(),
        jobs: state.jobs().clone(),
        not_started: state.not_started().to_vec(),
        overall_progress: overall_progress(state.jobs()),
        batch_complete: state.all_terminal(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::state_with_jobs;
    use pretty_assertions::assert_eq;

    fn job(language: &str, status: JobStatus, progress: u8) -> TranslationJob {
        TranslationJob::new(language, format!("r-{language}"), status, progress)
    }

    #[test]
    fn test_overall_progress_mean() {
        let state = state_with_jobs(vec![
            job("es", JobStatus::Processing, 40),
            job("fr", JobStatus::Processing, 60),
        ]);
        assert_eq!(overall_progress(state.jobs()), 50);
    }

    #[test]
    fn test_overall_progress_excludes_failed() {
        // {A: Processing@40, B: Failed} must read 40, not 20.
        let state = state_with_jobs(vec![
            job("es", JobStatus::Processing, 40),
            job("fr", JobStatus::Failed, 0),
        ]);
        assert_eq!(overall_progress(state.jobs()), 40);
    }

    #[test]
    fn test_overall_progress_all_failed_is_zero() {
        let state = state_with_jobs(vec![
            job("es", JobStatus::Failed, 0),
            job("fr", JobStatus::Failed, 0),
        ]);
        assert_eq!(overall_progress(state.jobs()), 0);
    }

    #[test]
    fn test_overall_progress_rounds() {
        let state = state_with_jobs(vec![
            job("es", JobStatus::Processing, 33),
            job("fr", JobStatus::Processing, 34),
            job("de", JobStatus::Processing, 34),
        ]);
        // mean = 33.666… → 34
        assert_eq!(overall_progress(state.jobs()), 34);
    }

    #[test]
    fn test_overall_progress_empty_is_zero() {
        assert_eq!(overall_progress(&HashMap::new()), 0);
    }

    #[test]
    fn test_snapshot_reflects_completion() {
        let state = state_with_jobs(vec![
            job("es", JobStatus::Completed, 100),
            job("fr", JobStatus::Failed, 0),
        ]);
        let snap = snapshot(&state);
        assert!(snap.batch_complete);
        assert_eq!(snap.overall_progress, 100);
        assert_eq!(snap.generation, 1);
    }
}
