// crates/bridge/src/webhook.rs
//! Webhook intake: decrypt, classify, fan out.
//!
//! The service posts `{dataEncrypt}` for every job transition. Field names
//! vary by payload age, so each one is read through its aliases: status is
//! `status` or `video_status`, id is `_id` or `video_id`, URL is `video` or
//! `url`, failure reason is `error_reason` or `error_message`.

use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::crypto::decrypt_payload;
use crate::state::BridgeState;

const GENERIC_FAILURE: &str = "Video translation failed. This could be due to invalid video \
     format, network issues, or processing errors. Please try again or contact support if the \
     issue persists.";

#[derive(Deserialize)]
pub struct WebhookBody {
    #[serde(rename = "dataEncrypt", default)]
    data_encrypt: Option<String>,
}

fn first_str<'a>(payload: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|key| payload.get(*key)?.as_str())
}

fn first_u64(payload: &Value, keys: &[&str]) -> Option<u64> {
    keys.iter().find_map(|key| payload.get(*key)?.as_u64())
}

/// Map one decrypted notification to the frame broadcast to subscribers.
/// `None` means the payload carried no status at all.
fn classify(payload: &Value) -> Option<Value> {
    let status = first_u64(payload, &["status", "video_status"])?;
    let remote_id = first_str(payload, &["_id", "video_id"]);

    let frame = match status {
        3 => json!({
            "type": "event",
            "data": {
                "_id": remote_id,
                "video_status": 3,
                "progress": first_u64(payload, &["progress"]).unwrap_or(100),
                "url": first_str(payload, &["video", "url"]),
            },
        }),
        4 => json!({
            "type": "error",
            "message": first_str(payload, &["error_reason", "error_message"])
                .unwrap_or(GENERIC_FAILURE),
            "error_code": payload.get("error_code"),
            "data": payload,
        }),
        1 | 2 => json!({
            "type": "event",
            "data": {
                "_id": remote_id,
                "video_status": status,
                "progress": first_u64(payload, &["progress"]).unwrap_or(0),
            },
        }),
        other => {
            debug!(status = other, "unknown webhook status, forwarding as-is");
            json!({ "type": "status_update", "data": payload })
        }
    };
    Some(frame)
}

pub async fn handle_webhook(
    State(state): State<BridgeState>,
    Json(body): Json<WebhookBody>,
) -> (StatusCode, Json<Value>) {
    let Some(data_encrypt) = body.data_encrypt else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"message": "Missing dataEncrypt field"})),
        );
    };

    let decrypted = match decrypt_payload(&data_encrypt, &state.client_id, &state.client_secret) {
        Ok(text) => text,
        Err(e) => {
            warn!("webhook decrypt failed: {e}");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"message": format!("Error processing webhook: {e}")})),
            );
        }
    };

    let payload: Value = match serde_json::from_str(&decrypted) {
        Ok(value) => value,
        Err(e) => {
            warn!("decrypted webhook is not JSON: {e}");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"message": "Invalid JSON format in decrypted data"})),
            );
        }
    };

    let Some(frame) = classify(&payload) else {
        warn!("webhook payload missing status field");
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"message": "Invalid payload structure - missing status"})),
        );
    };

    debug!(subscribers = state.frames.receiver_count(), "webhook classified");
    // No subscribers is fine; the poll loop covers the gap.
    let _ = state.frames.send(frame.to_string());

    (
        StatusCode::OK,
        Json(json!({
            "message": "Webhook received and processed successfully",
            "decrypted_data": payload,
        })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_classify_completion_prefers_video_field() {
        let frame = classify(&json!({
            "_id": "r1",
            "status": 3,
            "video": "https://cdn/out.mp4",
            "url": "https://cdn/ignored.mp4",
        }))
        .unwrap();
        assert_eq!(frame["type"], "event");
        assert_eq!(frame["data"]["_id"], "r1");
        assert_eq!(frame["data"]["video_status"], 3);
        assert_eq!(frame["data"]["progress"], 100);
        assert_eq!(frame["data"]["url"], "https://cdn/out.mp4");
    }

    #[test]
    fn test_classify_failure_with_reason_aliases() {
        let frame = classify(&json!({
            "video_id": "r2",
            "video_status": 4,
            "error_message": "face not detected",
            "error_code": 3005,
        }))
        .unwrap();
        assert_eq!(frame["type"], "error");
        assert_eq!(frame["message"], "face not detected");
        assert_eq!(frame["error_code"], 3005);
    }

    #[test]
    fn test_classify_failure_falls_back_to_generic_reason() {
        let frame = classify(&json!({"_id": "r2", "status": 4})).unwrap();
        assert_eq!(frame["message"], GENERIC_FAILURE);
        assert_eq!(frame["error_code"], Value::Null);
    }

    #[test]
    fn test_classify_progress_defaults_to_zero() {
        let frame = classify(&json!({"_id": "r1", "status": 2})).unwrap();
        assert_eq!(frame["data"]["video_status"], 2);
        assert_eq!(frame["data"]["progress"], 0);
    }

    #[test]
    fn test_classify_unknown_status_forwards_payload() {
        let payload = json!({"_id": "r1", "status": 9, "note": "odd"});
        let frame = classify(&payload).unwrap();
        assert_eq!(frame["type"], "status_update");
        assert_eq!(frame["data"], payload);
    }

    #[test]
    fn test_classify_missing_status_is_none() {
        assert!(classify(&json!({"_id": "r1"})).is_none());
    }
}
