//! EventAdapter - raw detection payload normalization
//!
//! ## Responsibilities
//!
//! - Extract (class type, confidence) from either the singular `class`
//!   field or the best-scoring entry of a `classes` list
//! - Recency dedup over the last N accepted observation IDs
//! - Allow-list + confidence gating
//! - Base64 image payload -> data: URL (MIME sniffed from the prefix)
//!
//! The dedup is purely recency-based: an ID repeated after it has rotated
//! out of the ring is treated as a new observation.

use crate::models::{DisplayEvent, EventMeta};
use base64::Engine;
use chrono::{Local, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::collections::VecDeque;
use tokio::sync::Mutex;

/// Class type preferred when ranking `classes` entries
const HUMAN_TYPE: &str = "Human";

/// Raw observation message, as published on the broker topic.
///
/// Unknown fields are ignored; the shape is not versioned.
#[derive(Debug, Clone, Deserialize)]
pub struct RawObservation {
    #[serde(default)]
    pub class: Option<RawClass>,
    #[serde(default)]
    pub classes: Vec<RawClass>,
    /// Stable per-track ID; preferred over `id`
    #[serde(default)]
    pub track_id: Option<Value>,
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub image: Option<RawImage>,
    #[serde(default)]
    pub bounding_box: Option<Value>,
    #[serde(default)]
    pub observations: Option<Vec<Value>>,
    #[serde(default)]
    pub frame: Option<RawFrame>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawClass {
    #[serde(rename = "type", default)]
    pub class_type: Option<String>,
    #[serde(default)]
    pub score: Option<f64>,
    /// Some firmwares report `confidence` instead of `score`
    #[serde(default)]
    pub confidence: Option<f64>,
}

impl RawClass {
    fn score(&self) -> Option<f64> {
        self.score.or(self.confidence)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawImage {
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub bounding_box: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawFrame {
    #[serde(default)]
    pub timestamp: Option<i64>,
}

/// Bounded FIFO set of recently accepted observation IDs.
struct RecentIdBuffer {
    ids: VecDeque<String>,
    capacity: usize,
}

impl RecentIdBuffer {
    fn new(capacity: usize) -> Self {
        Self {
            ids: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record an ID; returns false when it was already in the window.
    ///
    /// Check and insert happen together so the gate cannot race its update.
    fn observe(&mut self, id: &str) -> bool {
        if self.ids.iter().any(|seen| seen == id) {
            return false;
        }
        self.ids.push_back(id.to_string());
        if self.ids.len() > self.capacity {
            self.ids.pop_front();
        }
        true
    }
}

/// EventAdapter instance
pub struct EventAdapter {
    allowed_classes: Vec<String>,
    min_confidence: f64,
    recent_ids: Mutex<RecentIdBuffer>,
}

impl EventAdapter {
    /// Create new EventAdapter
    pub fn new(allowed_classes: Vec<String>, min_confidence: f64, recent_ids_max: usize) -> Self {
        Self {
            allowed_classes,
            min_confidence,
            recent_ids: Mutex::new(RecentIdBuffer::new(recent_ids_max)),
        }
    }

    /// Normalize one raw broker message into a display event.
    ///
    /// Returns None for anything dropped: malformed JSON, missing identity,
    /// a recently seen ID, a class outside the allow-list, or a confidence
    /// below the threshold.
    pub async fn normalize(&self, topic: &str, payload: &[u8]) -> Option<DisplayEvent> {
        let obs: RawObservation = match serde_json::from_slice(payload) {
            Ok(obs) => obs,
            Err(e) => {
                tracing::error!(topic = %topic, error = %e, "Bad broker message, dropping");
                return None;
            }
        };
        self.normalize_observation(topic, &obs).await
    }

    async fn normalize_observation(&self, topic: &str, obs: &RawObservation) -> Option<DisplayEvent> {
        // Without a stable ID there is nothing to dedup against.
        let obs_id = obs
            .track_id
            .as_ref()
            .and_then(value_to_id)
            .or_else(|| obs.id.as_ref().and_then(value_to_id))?;

        {
            let mut recent = self.recent_ids.lock().await;
            if !recent.observe(&obs_id) {
                tracing::debug!(obs_id = %obs_id, "Duplicate observation, dropping");
                return None;
            }
        }

        let (class_type, score) = class_info(obs);

        let class_type = match class_type {
            Some(t) if self.allowed_classes.iter().any(|a| a == &t) => t,
            other => {
                tracing::debug!(obs_id = %obs_id, class = ?other, "Class not allowed, dropping");
                return None;
            }
        };

        if let Some(score) = score {
            if score < self.min_confidence {
                tracing::debug!(
                    obs_id = %obs_id,
                    score = score,
                    min = self.min_confidence,
                    "Below confidence threshold, dropping"
                );
                return None;
            }
        }

        let ts = obs
            .frame
            .as_ref()
            .and_then(|f| f.timestamp)
            .unwrap_or_else(|| Utc::now().timestamp_millis());

        // A failed decode is non-fatal; the event flows without a preview
        // and the kiosk decides what to do with it.
        let image_url = obs
            .image
            .as_ref()
            .and_then(|img| img.data.as_deref())
            .and_then(to_data_url);

        let mut meta = serde_json::Map::new();
        meta.insert("topic".into(), Value::from("object_recognition"));
        meta.insert("trackId".into(), Value::from(obs_id.clone()));
        meta.insert(
            "class".into(),
            serde_json::json!({ "type": class_type, "score": score }),
        );
        meta.insert(
            "observations".into(),
            Value::from(obs.observations.as_ref().map(|o| o.len()).unwrap_or(1).max(1)),
        );
        if let Some(bbox) = obs
            .bounding_box
            .clone()
            .or_else(|| obs.image.as_ref().and_then(|i| i.bounding_box.clone()))
        {
            meta.insert("bbox".into(), bbox);
        }

        tracing::info!(
            topic = %topic,
            obs_id = %obs_id,
            class = %class_type,
            score = ?score,
            "Observation accepted"
        );

        Some(DisplayEvent {
            id: format!("{}-{}-{}", topic, ts, obs_id),
            timestamp: Some(ts),
            image_url,
            title: Some(format!("Observe {}", class_type)),
            subtitle: Some(local_time_string(ts)),
            meta: Some(EventMeta::Fields(meta)),
            alt: None,
        })
    }
}

/// Extract (type, score) from a raw observation.
///
/// A singular `class` wins; otherwise the best-scoring entry of `classes`
/// is used, preferring Human-typed entries when any are present.
fn class_info(obs: &RawObservation) -> (Option<String>, Option<f64>) {
    if let Some(class) = &obs.class {
        if class.class_type.is_some() {
            return (class.class_type.clone(), class.score());
        }
    }

    if obs.classes.is_empty() {
        return (None, None);
    }

    let humans: Vec<&RawClass> = obs
        .classes
        .iter()
        .filter(|c| c.class_type.as_deref() == Some(HUMAN_TYPE))
        .collect();
    let pool: Vec<&RawClass> = if humans.is_empty() {
        obs.classes.iter().collect()
    } else {
        humans
    };

    let best = pool.iter().max_by(|a, b| {
        let sa = a.score().unwrap_or(0.0);
        let sb = b.score().unwrap_or(0.0);
        sa.partial_cmp(&sb).unwrap_or(std::cmp::Ordering::Equal)
    });

    match best {
        Some(class) => (class.class_type.clone(), class.score()),
        None => (None, None),
    }
}

/// Observation IDs arrive as strings or numbers depending on the firmware.
fn value_to_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Turn a base64 image payload into a data: URL.
///
/// JPEG base64 starts with `/9j/`; anything else gets a generic MIME since
/// some firmwares deliver PNG. Payloads that fail to decode are treated as
/// no image at all.
fn to_data_url(b64: &str) -> Option<String> {
    let trimmed = b64.trim();
    if trimmed.len() < 8 {
        return None;
    }

    let mut padded = trimmed.to_string();
    let rem = padded.len() % 4;
    if rem != 0 {
        padded.push_str(&"=".repeat(4 - rem));
    }

    if let Err(e) = base64::engine::general_purpose::STANDARD.decode(&padded) {
        tracing::debug!(error = %e, "Image payload not decodable, proceeding without preview");
        return None;
    }

    let mime = if padded.starts_with("/9j/") {
        "image/jpeg"
    } else {
        "image/*"
    };
    Some(format!("data:{};base64,{}", mime, padded))
}

fn local_time_string(ts_millis: i64) -> String {
    match Local.timestamp_millis_opt(ts_millis) {
        chrono::LocalResult::Single(dt) => dt.format("%H:%M:%S").to_string(),
        _ => Local::now().format("%H:%M:%S").to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const JPEG_B64: &str = "/9j/4AAQSkZJRg==";

    fn adapter() -> EventAdapter {
        EventAdapter::new(vec!["Human".to_string(), "Face".to_string()], 0.3, 10)
    }

    fn human_msg(track_id: &str, score: f64) -> Vec<u8> {
        serde_json::json!({
            "track_id": track_id,
            "class": { "type": "Human", "score": score },
            "image": { "data": JPEG_B64 },
            "frame": { "timestamp": 1700000000000i64 }
        })
        .to_string()
        .into_bytes()
    }

    #[tokio::test]
    async fn test_accepts_human_observation() {
        let adapter = adapter();
        let event = adapter.normalize("cam", &human_msg("t1", 0.9)).await.unwrap();

        assert_eq!(event.id, "cam-1700000000000-t1");
        assert_eq!(event.title.as_deref(), Some("Observe Human"));
        assert!(event
            .image_url
            .unwrap()
            .starts_with("data:image/jpeg;base64,/9j/"));
        match event.meta.unwrap() {
            EventMeta::Fields(fields) => {
                assert_eq!(fields["trackId"], "t1");
                assert_eq!(fields["topic"], "object_recognition");
                assert_eq!(fields["observations"], 1);
            }
            EventMeta::Text(_) => panic!("expected structured meta"),
        }
    }

    #[tokio::test]
    async fn test_duplicate_id_within_window_is_dropped() {
        let adapter = adapter();
        assert!(adapter.normalize("cam", &human_msg("t1", 0.9)).await.is_some());
        assert!(adapter.normalize("cam", &human_msg("t1", 0.9)).await.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_id_outside_window_passes() {
        let adapter = adapter();
        assert!(adapter.normalize("cam", &human_msg("t0", 0.9)).await.is_some());
        // rotate t0 out of the 10-slot ring
        for i in 1..=10 {
            adapter.normalize("cam", &human_msg(&format!("t{}", i), 0.9)).await;
        }
        assert!(adapter.normalize("cam", &human_msg("t0", 0.9)).await.is_some());
    }

    #[tokio::test]
    async fn test_observation_without_image_still_emits() {
        let adapter = adapter();
        let msg = serde_json::json!({
            "track_id": "t1",
            "class": { "type": "Human", "score": 0.9 },
            "frame": { "timestamp": 1700000000000i64 }
        });
        let event = adapter.normalize("cam", msg.to_string().as_bytes()).await.unwrap();
        assert_eq!(event.id, "cam-1700000000000-t1");
        assert!(event.image_url.is_none());
    }

    #[tokio::test]
    async fn test_undecodable_image_drops_only_the_preview() {
        let adapter = adapter();
        let msg = serde_json::json!({
            "track_id": "t1",
            "class": { "type": "Human", "score": 0.9 },
            "image": { "data": "!!!not-base64!!!" }
        });
        let event = adapter.normalize("cam", msg.to_string().as_bytes()).await.unwrap();
        assert!(event.image_url.is_none());
        assert_eq!(event.title.as_deref(), Some("Observe Human"));
    }

    #[tokio::test]
    async fn test_missing_id_is_dropped() {
        let adapter = adapter();
        let msg = serde_json::json!({
            "class": { "type": "Human", "score": 0.9 },
            "image": { "data": JPEG_B64 }
        });
        assert!(adapter.normalize("cam", msg.to_string().as_bytes()).await.is_none());
    }

    #[tokio::test]
    async fn test_low_confidence_is_dropped() {
        let adapter = adapter();
        assert!(adapter.normalize("cam", &human_msg("t1", 0.2)).await.is_none());
    }

    #[tokio::test]
    async fn test_missing_score_passes_gate() {
        let adapter = adapter();
        let msg = serde_json::json!({
            "track_id": "t1",
            "class": { "type": "Face" },
            "image": { "data": JPEG_B64 }
        });
        let event = adapter.normalize("cam", msg.to_string().as_bytes()).await.unwrap();
        assert_eq!(event.title.as_deref(), Some("Observe Face"));
    }

    #[tokio::test]
    async fn test_disallowed_class_is_dropped() {
        let adapter = adapter();
        let msg = serde_json::json!({
            "track_id": "t1",
            "class": { "type": "Vehicle", "score": 0.95 },
            "image": { "data": JPEG_B64 }
        });
        assert!(adapter.normalize("cam", msg.to_string().as_bytes()).await.is_none());
    }

    #[tokio::test]
    async fn test_filtered_message_still_occupies_dedup_slot() {
        let adapter = adapter();
        // first message fails the class filter but its ID is now recent
        let msg = serde_json::json!({
            "track_id": "t1",
            "class": { "type": "Vehicle", "score": 0.95 },
            "image": { "data": JPEG_B64 }
        });
        assert!(adapter.normalize("cam", msg.to_string().as_bytes()).await.is_none());
        assert!(adapter.normalize("cam", &human_msg("t1", 0.9)).await.is_none());
    }

    #[tokio::test]
    async fn test_malformed_json_is_dropped() {
        let adapter = adapter();
        assert!(adapter.normalize("cam", b"{not json").await.is_none());
    }

    #[tokio::test]
    async fn test_classes_list_prefers_human() {
        let adapter = adapter();
        let msg = serde_json::json!({
            "track_id": "t1",
            "classes": [
                { "type": "Vehicle", "score": 0.99 },
                { "type": "Human", "score": 0.6 },
                { "type": "Human", "confidence": 0.8 }
            ],
            "image": { "data": JPEG_B64 }
        });
        let event = adapter.normalize("cam", msg.to_string().as_bytes()).await.unwrap();
        match event.meta.unwrap() {
            EventMeta::Fields(fields) => assert_eq!(fields["class"]["score"], 0.8),
            EventMeta::Text(_) => panic!("expected structured meta"),
        }
    }

    #[tokio::test]
    async fn test_numeric_track_id() {
        let adapter = adapter();
        let msg = serde_json::json!({
            "track_id": 42,
            "class": { "type": "Human", "score": 0.9 },
            "image": { "data": JPEG_B64 },
            "frame": { "timestamp": 1700000000000i64 }
        });
        let event = adapter.normalize("cam", msg.to_string().as_bytes()).await.unwrap();
        assert_eq!(event.id, "cam-1700000000000-42");
    }

    #[test]
    fn test_data_url_repads_and_sniffs_jpeg() {
        // 14 chars, needs 2 padding chars
        let url = to_data_url("/9j/4AAQSkZJRg").unwrap();
        assert_eq!(url, "data:image/jpeg;base64,/9j/4AAQSkZJRg==");
    }

    #[test]
    fn test_data_url_generic_mime_for_unknown_prefix() {
        let url = to_data_url("iVBORw0KGgo=").unwrap();
        assert!(url.starts_with("data:image/*;base64,iVBORw0KGgo="));
    }

    #[test]
    fn test_data_url_rejects_short_or_invalid() {
        assert!(to_data_url("abc").is_none());
        assert!(to_data_url("!!!not-base64!!!").is_none());
    }

    #[test]
    fn test_recent_id_buffer_rotation() {
        let mut ring = RecentIdBuffer::new(2);
        assert!(ring.observe("a"));
        assert!(ring.observe("b"));
        assert!(!ring.observe("a"));
        assert!(ring.observe("c")); // evicts "a"
        assert!(ring.observe("a"));
    }
}
