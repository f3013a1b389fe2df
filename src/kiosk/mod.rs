//! Kiosk - stream client and display engine
//!
//! ## Responsibilities
//!
//! - Consume the push channel (`data:` frames) with automatic reconnection
//! - Feed decoded payloads into the batch window (no `imageUrl`, no tile;
//!   missing id synthesized from time + randomness)
//! - Drive per-card typewriters and repaint the terminal frame from window
//!   snapshots, narration text, and connection status

use crate::batch_window::{BatchWindow, WindowSnapshot};
use crate::models::{DisplayEvent, EventMeta};
use crate::tile_renderer::{card_lines, GridFrame, Typewriter};
use futures::StreamExt;
use serde::Deserialize;
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

const RECONNECT_DELAY: Duration = Duration::from_secs(2);
const PAINT_INTERVAL: Duration = Duration::from_millis(20);

// ========================================
// Stream frame decoding
// ========================================

/// Incremental decoder for the push channel's framed messages.
///
/// Frames are blocks separated by a blank line; `data:` lines carry the
/// payload (multiple data lines join with a newline), comment lines
/// (leading `:`) are keep-alives and yield nothing.
#[derive(Debug, Default)]
pub struct SseFrameDecoder {
    buffer: String,
}

impl SseFrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes; returns every complete payload it finished.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));

        let mut payloads = Vec::new();
        while let Some(pos) = self.buffer.find("\n\n") {
            let block: String = self.buffer.drain(..pos + 2).collect();
            let data: Vec<&str> = block
                .lines()
                .filter_map(|line| {
                    line.strip_prefix("data:")
                        .map(|rest| rest.strip_prefix(' ').unwrap_or(rest))
                })
                .collect();
            if !data.is_empty() {
                payloads.push(data.join("\n"));
            }
        }
        payloads
    }
}

// ========================================
// Payload handling
// ========================================

/// Wire shape of one streamed event; unknown fields ignored.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamPayload {
    id: Option<String>,
    image_url: Option<String>,
    timestamp: Option<i64>,
    title: Option<String>,
    subtitle: Option<String>,
    meta: Option<EventMeta>,
    alt: Option<String>,
}

impl StreamPayload {
    /// Convert to a display event, or None when there is nothing to show.
    fn into_event(self) -> Option<DisplayEvent> {
        let image_url = self.image_url.filter(|url| !url.is_empty())?;
        let id = self
            .id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(synthesize_id);
        Some(DisplayEvent {
            id,
            timestamp: self.timestamp,
            image_url: Some(image_url),
            title: self.title,
            subtitle: self.subtitle,
            meta: self.meta,
            alt: self.alt,
        })
    }
}

fn synthesize_id() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", chrono::Utc::now().timestamp_millis(), &suffix[..6])
}

// ========================================
// Engine
// ========================================

/// KioskEngine instance
pub struct KioskEngine {
    stream_url: String,
    window: Arc<BatchWindow>,
    status_tx: watch::Sender<String>,
}

impl KioskEngine {
    pub fn new(stream_url: String, window: Arc<BatchWindow>) -> (Self, watch::Receiver<String>) {
        let (status_tx, status_rx) = watch::channel("connecting…".to_string());
        (
            Self {
                stream_url,
                window,
                status_tx,
            },
            status_rx,
        )
    }

    /// Spawn the stream consumer loop.
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let client = reqwest::Client::new();
            loop {
                match client.get(&self.stream_url).send().await {
                    Ok(response) if response.status().is_success() => {
                        tracing::info!(url = %self.stream_url, "Stream connected");
                        self.status_tx.send_replace("Collecting".to_string());
                        self.consume(response).await;
                    }
                    Ok(response) => {
                        tracing::warn!(status = %response.status(), "Stream connect rejected");
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Stream connect failed");
                    }
                }

                self.status_tx.send_replace("reconnecting…".to_string());
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        })
    }

    /// Read frames until the connection drops.
    async fn consume(&self, response: reqwest::Response) {
        let mut decoder = SseFrameDecoder::new();
        let mut body = response.bytes_stream();

        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(bytes) => {
                    for payload in decoder.feed(&bytes) {
                        self.handle_payload(&payload).await;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Stream read error");
                    return;
                }
            }
        }
        tracing::info!("Stream closed by server");
    }

    async fn handle_payload(&self, payload: &str) {
        match serde_json::from_str::<StreamPayload>(payload) {
            Ok(raw) => {
                if let Some(event) = raw.into_event() {
                    tracing::debug!(event_id = %event.id, "Event received");
                    self.window.submit(event).await;
                } else {
                    tracing::debug!("Payload without imageUrl ignored");
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Bad stream payload");
            }
        }
    }
}

// ========================================
// Render loop
// ========================================

/// Per-card typing progress, keyed by event id.
struct Typist {
    typewriter: Typewriter,
    due: Instant,
}

/// Drive typewriters and repaint whenever anything on screen changes.
pub fn start_render_loop(
    mut snapshots: watch::Receiver<WindowSnapshot>,
    mut narration: watch::Receiver<String>,
    mut status: watch::Receiver<String>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut typists: HashMap<String, Typist> = HashMap::new();
        let mut ticker = tokio::time::interval(PAINT_INTERVAL);
        // closed side channels keep their last value; stop polling them
        let mut narration_open = true;
        let mut status_open = true;

        loop {
            let mut dirty = false;
            tokio::select! {
                changed = snapshots.changed() => {
                    if changed.is_err() {
                        tracing::debug!("Snapshot channel closed, render loop stopping");
                        return;
                    }
                    dirty = true;
                }
                changed = narration.changed(), if narration_open => {
                    narration_open = changed.is_ok();
                    dirty = true;
                }
                changed = status.changed(), if status_open => {
                    status_open = changed.is_ok();
                    dirty = true;
                }
                _ = ticker.tick() => {}
            }

            let snapshot = snapshots.borrow_and_update().clone();

            // one typewriter per visible card; drop the rest on clear
            let now = Instant::now();
            for event in &snapshot.visible {
                typists.entry(event.id.clone()).or_insert_with(|| Typist {
                    typewriter: Typewriter::new(card_lines(event)),
                    due: now,
                });
            }
            typists.retain(|id, _| snapshot.visible.iter().any(|e| &e.id == id));

            for typist in typists.values_mut() {
                while !typist.typewriter.is_done() && typist.due <= now {
                    match typist.typewriter.tick() {
                        Some(delay) => typist.due += delay,
                        None => break,
                    }
                    dirty = true;
                }
            }

            if dirty {
                let status_text = status.borrow_and_update().clone();
                let frame = GridFrame::compose(&snapshot, &status_text, |event| {
                    typists
                        .get(&event.id)
                        .map(|t| t.typewriter.rendered())
                        .unwrap_or_default()
                });
                let narration_text = narration.borrow_and_update().clone();
                paint(&frame, &narration_text);
            }
        }
    })
}

fn paint(frame: &GridFrame, narration: &str) {
    let mut out = std::io::stdout().lock();
    let text = format!("\x1b[2J\x1b[H{}\n{}\n", frame.to_text(), narration);
    if let Err(e) = out.write_all(text.as_bytes()) {
        tracing::warn!(error = %e, "Frame paint failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decoder_yields_data_payloads() {
        let mut decoder = SseFrameDecoder::new();
        let payloads = decoder.feed(b"data: {\"id\":\"a\"}\n\ndata: {\"id\":\"b\"}\n\n");
        assert_eq!(payloads, vec!["{\"id\":\"a\"}", "{\"id\":\"b\"}"]);
    }

    #[test]
    fn test_decoder_handles_chunk_splits() {
        let mut decoder = SseFrameDecoder::new();
        assert!(decoder.feed(b"data: {\"id\"").is_empty());
        assert!(decoder.feed(b":\"a\"}\n").is_empty());
        let payloads = decoder.feed(b"\n");
        assert_eq!(payloads, vec!["{\"id\":\"a\"}"]);
    }

    #[test]
    fn test_decoder_ignores_keepalive_comments() {
        let mut decoder = SseFrameDecoder::new();
        assert!(decoder.feed(b":\n\n:\n\n").is_empty());
        let payloads = decoder.feed(b": ping\n\ndata: x\n\n");
        assert_eq!(payloads, vec!["x"]);
    }

    #[test]
    fn test_decoder_joins_multiline_data() {
        let mut decoder = SseFrameDecoder::new();
        let payloads = decoder.feed(b"data: a\ndata: b\n\n");
        assert_eq!(payloads, vec!["a\nb"]);
    }

    #[test]
    fn test_payload_without_image_url_is_ignored() {
        let raw: StreamPayload =
            serde_json::from_str("{\"id\":\"x\",\"title\":\"t\"}").unwrap();
        assert!(raw.into_event().is_none());
    }

    #[test]
    fn test_payload_missing_id_is_synthesized() {
        let raw: StreamPayload =
            serde_json::from_str("{\"imageUrl\":\"data:image/jpeg;base64,/9j/x\"}").unwrap();
        let event = raw.into_event().unwrap();
        assert!(!event.id.is_empty());
        // time prefix + random suffix
        assert!(event.id.contains('-'));
    }

    #[test]
    fn test_payload_keeps_given_id() {
        let raw: StreamPayload = serde_json::from_str(
            "{\"id\":\"abc-123\",\"imageUrl\":\"u\",\"meta\":\"Camera 4A\"}",
        )
        .unwrap();
        let event = raw.into_event().unwrap();
        assert_eq!(event.id, "abc-123");
        assert!(matches!(event.meta, Some(EventMeta::Text(_))));
    }
}
