//! Test fixtures and event generators.

use chrono::Utc;
use engine_core::{Envelope, ParsedApiKey, UserEvent};
use serde_json::Map;
use uuid::Uuid;

pub const CHROME_MAC: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// A fresh API key.
pub fn api_key() -> ParsedApiKey {
    ParsedApiKey::from(Uuid::new_v4())
}

/// A valid event body for `app_id`.
pub fn event(app_id: Uuid, event_type: &str) -> serde_json::Value {
    serde_json::json!({
        "appId": app_id,
        "anonymousId": Uuid::new_v4(),
        "sessionId": Uuid::new_v4(),
        "timestamp": Utc::now().timestamp_millis(),
        "event": event_type,
        "source": "web",
        "metadata": { "path": "/pricing", "experiment": "b" }
    })
}

/// An event body missing the mandatory `source` field.
pub fn event_without_source(app_id: Uuid) -> serde_json::Value {
    serde_json::json!({
        "appId": app_id,
        "timestamp": Utc::now().to_rfc3339(),
        "event": "pageview"
    })
}

/// An otherwise valid event body with no `appId`.
pub fn event_without_app_id() -> serde_json::Value {
    let mut body = event(Uuid::nil(), "pageview");
    if let Some(fields) = body.as_object_mut() {
        fields.remove("appId");
    }
    body
}

/// An admitted envelope, as the consumer would read it from the event topic.
pub fn envelope(app_id: Uuid) -> Envelope {
    Envelope::wrap(
        UserEvent {
            app_id,
            anonymous_id: Some(Uuid::new_v4()),
            session_id: None,
            user_id: None,
            timestamp: Utc::now(),
            event_type: "pageview".into(),
            source: "web".into(),
            metadata: Map::new(),
        },
        None,
    )
}

pub fn envelopes(app_id: Uuid, n: usize) -> Vec<Envelope> {
    (0..n).map(|_| envelope(app_id)).collect()
}
