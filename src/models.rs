//! Shared wire types
//!
//! The event shape here is the push-channel contract: one JSON object per
//! detection, camelCase keys, `imageUrl` required on the kiosk side.

use serde::{Deserialize, Serialize};

/// A normalized detection record ready for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayEvent {
    /// Identity; synthesized when the source omits one
    pub id: String,
    /// Capture timestamp (epoch millis)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    /// Image to show on the card (usually a data: URL); absent when the
    /// source carried no decodable payload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<EventMeta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alt: Option<String>,
}

/// Card metadata: either a plain string or a key/value mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventMeta {
    Text(String),
    Fields(serde_json::Map<String, serde_json::Value>),
}

/// Body of the light trigger request fired when the window clears.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LightTriggerBody {
    /// Always "frame_cleared"
    pub event: String,
    /// Number of tiles cleared
    pub count: usize,
    /// RFC3339 timestamp of the clear
    pub at: String,
}

impl LightTriggerBody {
    pub const FRAME_CLEARED: &'static str = "frame_cleared";

    pub fn frame_cleared(count: usize, at: chrono::DateTime<chrono::Utc>) -> Self {
        Self {
            event: Self::FRAME_CLEARED.to_string(),
            count,
            at: at.to_rfc3339(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_event_wire_shape() {
        let json = r#"{
            "id": "topic-1700000000000-t1",
            "imageUrl": "data:image/jpeg;base64,/9j/abcd",
            "title": "Observe Human",
            "subtitle": "14:33:18",
            "meta": {"trackId": "t1", "topic": "object_recognition"}
        }"#;

        let event: DisplayEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.id, "topic-1700000000000-t1");
        assert!(event.timestamp.is_none());
        assert!(matches!(event.meta, Some(EventMeta::Fields(_))));

        let out = serde_json::to_value(&event).unwrap();
        assert_eq!(out["imageUrl"], "data:image/jpeg;base64,/9j/abcd");
        assert!(out.get("alt").is_none());
    }

    #[test]
    fn test_meta_accepts_plain_string() {
        let json = r#"{"id": "e1", "imageUrl": "u", "meta": "Camera 4A"}"#;
        let event: DisplayEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.meta, Some(EventMeta::Text("Camera 4A".to_string())));
    }

    #[test]
    fn test_image_url_is_optional_on_the_wire() {
        let json = r#"{"id": "e1", "title": "Observe Human"}"#;
        let event: DisplayEvent = serde_json::from_str(json).unwrap();
        assert!(event.image_url.is_none());

        let out = serde_json::to_value(&event).unwrap();
        assert!(out.get("imageUrl").is_none());
    }

    #[test]
    fn test_light_trigger_body() {
        let body = LightTriggerBody::frame_cleared(12, chrono::Utc::now());
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["event"], "frame_cleared");
        assert_eq!(json["count"], 12);
        assert!(json["at"].as_str().unwrap().contains('T'));
    }
}
