//! TileRenderer - card layout and typewriter presentation
//!
//! ## Responsibilities
//!
//! - Turn a display event into the typed text lines of its card
//! - Step the per-card typewriter effect (per-char and per-line delays)
//! - Lay out a fixed-size grid frame with blank placeholders and a HUD line
//!
//! Everything here is pure presentation; nothing mutates window state.

use crate::batch_window::WindowSnapshot;
use crate::models::{DisplayEvent, EventMeta};
use std::time::Duration;

/// Delay between typed characters
pub const CHAR_DELAY: Duration = Duration::from_millis(22);
/// Delay between finished lines
pub const LINE_DELAY: Duration = Duration::from_millis(140);

/// Format a metadata value for one card line.
///
/// Strings, numbers and booleans print verbatim, null prints as empty,
/// anything structured is compact JSON.
pub fn fmt_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

/// Build the lines a card types out: title, subtitle, then metadata.
pub fn card_lines(event: &DisplayEvent) -> Vec<String> {
    let mut lines = Vec::new();
    if let Some(title) = &event.title {
        lines.push(title.clone());
    }
    if let Some(subtitle) = &event.subtitle {
        lines.push(subtitle.clone());
    }
    match &event.meta {
        Some(EventMeta::Text(text)) => lines.push(text.clone()),
        Some(EventMeta::Fields(map)) => {
            for (key, value) in map {
                lines.push(format!("{}: {}", key, fmt_value(value)));
            }
        }
        None => {}
    }
    lines
}

/// Progressive multi-line typing stepper.
///
/// Each `tick` reveals one character of the current line, or advances to
/// the next line once the current one is complete. The returned duration
/// is the delay to wait before the next tick; `None` means the card is
/// fully typed.
#[derive(Debug, Clone)]
pub struct Typewriter {
    lines: Vec<String>,
    char_delay: Duration,
    line_delay: Duration,
    line: usize,
    shown_chars: usize,
}

impl Typewriter {
    pub fn new(lines: Vec<String>) -> Self {
        Self::with_delays(lines, CHAR_DELAY, LINE_DELAY)
    }

    pub fn with_delays(lines: Vec<String>, char_delay: Duration, line_delay: Duration) -> Self {
        Self {
            lines,
            char_delay,
            line_delay,
            line: 0,
            shown_chars: 0,
        }
    }

    /// Advance one step. Returns the delay before the next step, or None
    /// once every line is fully revealed.
    pub fn tick(&mut self) -> Option<Duration> {
        let target = self.lines.get(self.line)?;
        let target_len = target.chars().count();

        if self.shown_chars < target_len {
            self.shown_chars += 1;
            Some(self.char_delay)
        } else {
            self.line += 1;
            self.shown_chars = 0;
            if self.line < self.lines.len() {
                Some(self.line_delay)
            } else {
                None
            }
        }
    }

    pub fn is_done(&self) -> bool {
        self.line >= self.lines.len()
    }

    /// Restart typing from the first character.
    pub fn restart(&mut self) {
        self.line = 0;
        self.shown_chars = 0;
    }

    /// Currently revealed text, one entry per line (later lines empty).
    pub fn rendered(&self) -> Vec<String> {
        self.lines
            .iter()
            .enumerate()
            .map(|(i, line)| {
                if i < self.line {
                    line.clone()
                } else if i == self.line {
                    line.chars().take(self.shown_chars).collect()
                } else {
                    String::new()
                }
            })
            .collect()
    }
}

/// One card as currently typed.
#[derive(Debug, Clone)]
pub struct CardView {
    pub id: String,
    pub image_url: String,
    pub lines: Vec<String>,
    pub alt: String,
}

impl CardView {
    pub fn new(event: &DisplayEvent, lines: Vec<String>) -> Self {
        let alt = event
            .alt
            .clone()
            .or_else(|| event.title.clone())
            .unwrap_or_else(|| "image".to_string());
        Self {
            id: event.id.clone(),
            image_url: event.image_url.clone().unwrap_or_default(),
            lines,
            alt,
        }
    }
}

/// One grid position; blanks pad the frame when the window is not full.
#[derive(Debug, Clone)]
pub enum Slot {
    Card(CardView),
    Blank,
}

/// A complete paintable frame: exactly `capacity` slots plus the HUD.
#[derive(Debug, Clone)]
pub struct GridFrame {
    pub slots: Vec<Slot>,
    pub vanishing: bool,
    pub hud: String,
}

impl GridFrame {
    /// Lay out a frame from a window snapshot. `typed` supplies the
    /// currently revealed lines per event id; events without an entry
    /// render with no text yet.
    pub fn compose(
        snapshot: &WindowSnapshot,
        status: &str,
        typed: impl Fn(&DisplayEvent) -> Vec<String>,
    ) -> Self {
        let mut slots: Vec<Slot> = snapshot
            .visible
            .iter()
            .map(|event| Slot::Card(CardView::new(event, typed(event))))
            .collect();
        slots.resize_with(snapshot.capacity, || Slot::Blank);

        let hud = format!(
            "{} · {}/{} · total {}",
            status,
            snapshot.visible.len(),
            snapshot.capacity,
            snapshot.total_shown
        );

        Self {
            slots,
            vanishing: snapshot.vanishing,
            hud,
        }
    }

    /// Render the frame as plain text, one block per occupied slot.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        out.push_str(&self.hud);
        out.push('\n');
        if self.vanishing {
            out.push_str("(clearing)\n");
        }
        for (i, slot) in self.slots.iter().enumerate() {
            match slot {
                Slot::Card(card) => {
                    out.push_str(&format!("[{}] {}\n", i + 1, card.alt));
                    for line in &card.lines {
                        out.push_str(&format!("    {}\n", line));
                    }
                }
                Slot::Blank => {
                    out.push_str(&format!("[{}] ·\n", i + 1));
                }
            }
        }
        out
    }
}
