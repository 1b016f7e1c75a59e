// crates/bridge/src/state.rs

use std::sync::Arc;

use tokio::sync::broadcast;

const FANOUT_CAPACITY: usize = 256;

/// Shared bridge state: decryption credentials plus the fan-out channel
/// every WebSocket subscriber listens on.
#[derive(Clone)]
pub struct BridgeState {
    pub client_id: Arc<str>,
    pub client_secret: Arc<str>,
    /// Classified webhook frames, serialized JSON.
    pub frames: broadcast::Sender<String>,
}

impl BridgeState {
    pub fn new(client_id: impl Into<Arc<str>>, client_secret: impl Into<Arc<str>>) -> Self {
        let (frames, _) = broadcast::channel(FANOUT_CAPACITY);
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            frames,
        }
    }
}
