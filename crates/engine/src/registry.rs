// crates/engine/src/registry.rs
//! Generation-scoped job registry.
//!
//! One [`BatchState`] holds the jobs of the current submission session,
//! keyed by target language code. A job never survives a generation bump;
//! membership in the live map is what marks an update as belonging to the
//! current session — no generation tag travels on the wire.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::warn;

use polydub_types::{CreationOutcome, TranslationJob};

/// The shared registry: one logical critical section for all mutation.
pub type SharedBatch = Arc<RwLock<BatchState>>;

/// Mutable state for one batch generation.
#[derive(Debug, Default)]
pub struct BatchState {
    generation: u64,
    jobs: HashMap<String, TranslationJob>,
    not_started: Vec<String>,
}

impl BatchState {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn jobs(&self) -> &HashMap<String, TranslationJob> {
        &self.jobs
    }

    /// Languages the creation call never started (reported to the user as
    /// "not started", distinct from Failed).
    pub fn not_started(&self) -> &[String] {
        &self.not_started
    }

    pub fn get(&self, language: &str) -> Option<&TranslationJob> {
        self.jobs.get(language)
    }

    pub(crate) fn get_mut(&mut self, language: &str) -> Option<&mut TranslationJob> {
        self.jobs.get_mut(language)
    }

    pub(crate) fn jobs_mut(&mut self) -> &mut HashMap<String, TranslationJob> {
        &mut self.jobs
    }

    /// Resolve a push/poll update's remote id back to its language code.
    /// Linear scan — batches are a handful of languages.
    pub fn find_by_remote_id(&self, remote_id: &str) -> Option<&TranslationJob> {
        self.jobs.values().find(|job| job.remote_id == remote_id)
    }

    /// True iff the map is non-empty and every job is Completed or Failed.
    pub fn all_terminal(&self) -> bool {
        !self.jobs.is_empty() && self.jobs.values().all(|job| job.status.is_terminal())
    }

    /// `(language, remote_id)` pairs still worth polling. Terminal jobs are
    /// excluded so they are never queried past their final state.
    pub fn poll_targets(&self) -> Vec<(String, String)> {
        self.jobs
            .values()
            .filter(|job| !job.status.is_terminal())
            .map(|job| (job.language.clone(), job.remote_id.clone()))
            .collect()
    }

    /// Replace the registry with a fresh generation seeded from a creation
    /// response. Requested languages missing from the response are recorded
    /// as not-started; languages the service started beyond the request are
    /// trusted and registered.
    pub(crate) fn seed(
        &mut self,
        generation: u64,
        requested: &[String],
        outcome: &CreationOutcome,
    ) {
        self.generation = generation;
        self.jobs.clear();
        self.not_started.clear();

        for created in &outcome.jobs {
            if self.jobs.contains_key(&created.language) {
                warn!(
                    language = %created.language,
                    remote_id = %created.remote_id,
                    "duplicate language in creation response, keeping first"
                );
                continue;
            }
            if self.find_by_remote_id(&created.remote_id).is_some() {
                warn!(
                    remote_id = %created.remote_id,
                    language = %created.language,
                    "duplicate remote id in creation response, keeping first"
                );
                continue;
            }
            self.jobs.insert(
                created.language.clone(),
                TranslationJob::new(
                    created.language.clone(),
                    created.remote_id.clone(),
                    created.status,
                    created.progress,
                ),
            );
        }

        for language in requested {
            if !self.jobs.contains_key(language) {
                self.not_started.push(language.clone());
            }
        }
    }

    /// Drop all jobs and move to a new generation. In-flight updates for the
    /// old generation die at the membership check when they arrive.
    pub(crate) fn clear(&mut self, generation: u64) {
        self.generation = generation;
        self.jobs.clear();
        self.not_started.clear();
    }
}

/// Seed helper shared by tests: a registry with ad-hoc jobs.
#[cfg(test)]
pub(crate) fn state_with_jobs(jobs: Vec<TranslationJob>) -> BatchState {
    let mut state = BatchState::default();
    state.generation = 1;
    for job in jobs {
        state.jobs.insert(job.language.clone(), job);
    }
    state
}
