// crates/client/src/lib.rs
//! HTTP and WebSocket clients for the video-translation service: token
//! acquisition, catalog lookups, batch creation, per-job status queries,
//! and the reconnecting push feed.

pub mod api;
pub mod config;
pub mod push;

pub use api::{ClientError, LanguageOption, ServiceClient, TranslationRequest, VoiceOption};
pub use config::ClientConfig;
pub use push::{spawn_push_feed, PushFeedConfig};
