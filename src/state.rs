//! Application state
//!
//! Holds the configuration surface and the components shared by handlers.

use crate::event_hub::EventHub;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Application configuration
///
/// Everything is a constant for one run; there is no dynamic config API.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// MQTT broker URL (mqtt://host:port)
    pub mqtt_url: String,
    /// MQTT topics to subscribe
    pub mqtt_topics: Vec<String>,
    /// SSE endpoint the kiosk engine consumes
    pub stream_url: String,
    /// Light trigger endpoint the kiosk engine posts to
    pub light_url: String,
    /// Visible window capacity
    pub batch_size: usize,
    /// Dwell before the clear animation starts
    pub pause_before_clear: Duration,
    /// Duration of the vanish animation
    pub clear_anim: Duration,
    /// Recent observation IDs kept for dedup
    pub recent_ids_max: usize,
    /// Minimum detection confidence (applied when a score is present)
    pub min_confidence: f64,
    /// Class types accepted by the adapter
    pub allowed_classes: Vec<String>,
    /// Narration text file
    pub narration_path: PathBuf,
    /// Run the kiosk engine in this process
    pub kiosk_enabled: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            mqtt_url: std::env::var("MQTT_URL")
                .unwrap_or_else(|_| "mqtt://localhost:1883".to_string()),
            mqtt_topics: std::env::var("MQTT_TOPICS")
                .unwrap_or_else(|_| "my_mqtt_topic".to_string())
                .split(',')
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
            stream_url: std::env::var("STREAM_URL")
                .unwrap_or_else(|_| "http://localhost:3000/stream".to_string()),
            light_url: std::env::var("LIGHT_URL")
                .unwrap_or_else(|_| "http://localhost:3000/light/on".to_string()),
            batch_size: std::env::var("BATCH_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(12),
            pause_before_clear: Duration::from_millis(
                std::env::var("PAUSE_BEFORE_CLEAR_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(1000),
            ),
            clear_anim: Duration::from_millis(
                std::env::var("CLEAR_ANIM_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(750),
            ),
            recent_ids_max: 10,
            min_confidence: std::env::var("MIN_CONFIDENCE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0.3),
            allowed_classes: vec!["Human".to_string(), "Face".to_string()],
            narration_path: std::env::var("NARRATION_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("narration.txt")),
            kiosk_enabled: std::env::var("KIOSK_ENABLED")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        }
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Application config
    pub config: AppConfig,
    /// EventHub (push channel distribution)
    pub hub: Arc<EventHub>,
}
