//! Shared domain and wire types for polydub.
//!
//! Everything that crosses a crate boundary lives here: job status codes,
//! job records, batch snapshots, and the push/poll/creation message shapes
//! spoken by the remote translation service and the webhook bridge.

pub mod job;
pub mod status;
pub mod wire;

pub use job::{BatchSnapshot, TranslationJob};
pub use status::{JobStatus, UnknownStatusCode};
pub use wire::{
    CreatedJob, CreationOutcome, JobEvent, JobStatusReport, PushMessage, StatusUpdate, VideoRecord,
};
