//! Multi-job status reconciliation engine.
//!
//! One batch submission creates N independently-progressing remote jobs (one
//! per target language). Two unreliable channels report on them — an
//! asynchronous push stream and a fixed-interval poll — and this crate merges
//! both into one consistent view: a generation-scoped job registry mutated
//! only through a serialized reconciler, with aggregate progress and batch
//! completion derived after every accepted update.
//!
//! Entry point is [`session::BatchTracker`]; everything else is plumbing it
//! owns.

pub mod aggregate;
pub mod events;
pub mod poll;
pub mod reconcile;
pub mod registry;
pub mod session;

pub use events::BatchEvent;
pub use poll::{PollScheduler, StatusSource};
pub use reconcile::{ApplyOutcome, Reconciler};
pub use registry::{BatchState, SharedBatch};
pub use session::{BatchTracker, TrackerConfig, TrackerError};
