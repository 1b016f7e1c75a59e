// crates/engine/src/events.rs
//! Events broadcast to observers after registry changes.

use polydub_types::BatchSnapshot;

/// Broadcast to subscribers of a [`crate::session::BatchTracker`].
///
/// A `Snapshot` follows every accepted update (and the initial seed), so an
/// observer that only ever renders the latest snapshot is always consistent
/// with the registry. `BatchComplete` and `GlobalError` fire once per
/// occurrence for observers that need edges, not levels.
#[derive(Debug, Clone)]
pub enum BatchEvent {
    /// The registry changed; here is the new derived view.
    Snapshot(BatchSnapshot),
    /// Every job is terminal. Partial success is still complete.
    BatchComplete(BatchSnapshot),
    /// A connection-level failure with no job reference ended the batch.
    GlobalError { message: String },
}
