// crates/bridge/src/ws.rs

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::state::BridgeState;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<BridgeState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: BridgeState) {
    let (mut sink, mut stream) = socket.split();

    if sink
        .send(Message::Text(
            r#"{"type":"info","data":"Connected to server"}"#.into(),
        ))
        .await
        .is_err()
    {
        return;
    }
    info!("push subscriber connected");

    let mut frames = state.frames.subscribe();

    loop {
        tokio::select! {
            frame = frames.recv() => match frame {
                Ok(frame) => {
                    if sink.send(Message::Text(frame.into())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    // Dropped frames are recovered by the subscriber's poll
                    // loop; keep the connection.
                    warn!(skipped = n, "push subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                // Pong is handled automatically by axum; subscribers send
                // nothing else we act on.
                Some(Ok(_)) => {}
            },
        }
    }

    info!("push subscriber disconnected");
}
