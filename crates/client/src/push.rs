// crates/client/src/push.rs
//! WebSocket client for the push channel. Connects to the bridge, parses
//! each text frame, and hands it to the tracker. Reconnects with doubling
//! backoff; the poll loop covers any updates missed while disconnected.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use polydub_engine::BatchTracker;
use polydub_types::PushMessage;

/// Configuration for the push feed.
pub struct PushFeedConfig {
    /// POLYDUB_PUSH_URL env var (e.g. ws://localhost:3007/ws). None = push
    /// disabled; polling alone still converges.
    pub push_url: Option<String>,
    pub max_reconnect_delay: Duration,
}

impl Default for PushFeedConfig {
    fn default() -> Self {
        Self {
            push_url: std::env::var("POLYDUB_PUSH_URL").ok(),
            max_reconnect_delay: Duration::from_secs(30),
        }
    }
}

/// Spawn the push feed as a background task. Returns a token that stops it.
pub fn spawn_push_feed(tracker: Arc<BatchTracker>, config: PushFeedConfig) -> CancellationToken {
    let token = CancellationToken::new();
    let task_token = token.clone();

    tokio::spawn(async move {
        let push_url = match config.push_url {
            Some(ref url) => url.clone(),
            None => {
                info!("POLYDUB_PUSH_URL not set — push channel disabled, polling only");
                return;
            }
        };

        let mut backoff = Duration::from_secs(1);

        loop {
            if task_token.is_cancelled() {
                return;
            }
            match connect_and_stream(&tracker, &push_url, &task_token).await {
                Ok(()) => {
                    info!("push connection closed cleanly");
                    backoff = Duration::from_secs(1);
                }
                Err(e) => {
                    warn!(backoff_secs = backoff.as_secs(), "push connection failed: {e}");
                }
            }

            tokio::select! {
                _ = task_token.cancelled() => return,
                _ = tokio::time::sleep(backoff) => {}
            }
            backoff = (backoff * 2).min(config.max_reconnect_delay);
        }
    });

    token
}

async fn connect_and_stream(
    tracker: &Arc<BatchTracker>,
    push_url: &str,
    token: &CancellationToken,
) -> Result<(), String> {
    let (ws_stream, _) = connect_async(push_url)
        .await
        .map_err(|e| format!("WS connect failed: {e}"))?;
    info!(%push_url, "push channel connected");

    let (mut sink, mut stream) = ws_stream.split();

    loop {
        let message = tokio::select! {
            _ = token.cancelled() => return Ok(()),
            message = stream.next() => message,
        };
        match message {
            Some(Ok(Message::Text(text))) => match PushMessage::parse(&text) {
                Ok(parsed) => tracker.handle_push(parsed).await,
                Err(e) => debug!("unparseable push frame, dropping: {e}"),
            },
            Some(Ok(Message::Ping(payload))) => {
                if sink.send(Message::Pong(payload)).await.is_err() {
                    return Ok(());
                }
            }
            Some(Ok(Message::Close(_))) | None => return Ok(()),
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(format!("WS read failed: {e}")),
        }
    }
}
