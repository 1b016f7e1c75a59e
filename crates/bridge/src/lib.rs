// crates/bridge/src/lib.rs
//! Webhook-to-WebSocket bridge. The translation service can only notify a
//! public HTTPS endpoint; this server receives those encrypted webhooks,
//! decrypts and classifies them, and fans the resulting frames out to every
//! connected WebSocket subscriber.

pub mod crypto;
pub mod state;
pub mod webhook;
pub mod ws;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

use state::BridgeState;

pub fn app(state: BridgeState) -> Router {
    // The browser UI and the CLI connect cross-origin.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/webhook", post(webhook::handle_webhook))
        .route("/ws", get(ws::ws_handler))
        .layer(cors)
        .with_state(state)
}
