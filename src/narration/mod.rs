//! Narration - looping typewriter playback of a static script
//!
//! ## Responsibilities
//!
//! - Load the narration text once (blank lines are content, CRLF normalized)
//! - Paginate into fixed groups of lines and type each page character by
//!   character, dwelling after a finished page before advancing
//! - Loop back to the first page after the last, forever
//!
//! Entirely independent of the event pipeline. A missing or unreadable
//! script is logged and the player idles.

use std::path::Path;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Lines per typed page
pub const LINES_PER_PAGE: usize = 3;
/// Typing speed per character
pub const CHAR_SPEED: Duration = Duration::from_millis(40);
/// Pause after each finished page before advancing
pub const READ_DWELL: Duration = Duration::from_millis(2000);

/// The loaded script, paginated. Pure data; the player drives timing.
#[derive(Debug, Clone)]
pub struct NarrationScript {
    lines: Vec<String>,
    lines_per_page: usize,
}

impl NarrationScript {
    /// Parse script text. Blank lines are kept; they read as pauses.
    pub fn parse(text: &str) -> Self {
        Self::with_page_size(text, LINES_PER_PAGE)
    }

    pub fn with_page_size(text: &str, lines_per_page: usize) -> Self {
        let lines = text
            .replace("\r\n", "\n")
            .split('\n')
            .map(str::to_string)
            .collect();
        Self {
            lines,
            lines_per_page,
        }
    }

    /// Load from a file.
    pub async fn load(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let text = tokio::fs::read_to_string(path).await?;
        Ok(Self::parse(&text))
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn page_count(&self) -> usize {
        if self.lines_per_page == 0 {
            return 0;
        }
        self.lines.len().div_ceil(self.lines_per_page)
    }

    /// Text of one page: up to `lines_per_page` lines joined with newlines.
    pub fn page(&self, index: usize) -> Option<String> {
        let start = index.checked_mul(self.lines_per_page)?;
        if start >= self.lines.len() {
            return None;
        }
        let end = (start + self.lines_per_page).min(self.lines.len());
        Some(self.lines[start..end].join("\n"))
    }

    /// Page index following `index`, wrapping to the first page.
    pub fn next_page(&self, index: usize) -> usize {
        let count = self.page_count();
        if count == 0 {
            return 0;
        }
        (index + 1) % count
    }
}

/// Narration player task.
pub struct NarrationPlayer {
    script: NarrationScript,
    char_speed: Duration,
    read_dwell: Duration,
}

impl NarrationPlayer {
    pub fn new(script: NarrationScript) -> Self {
        Self {
            script,
            char_speed: CHAR_SPEED,
            read_dwell: READ_DWELL,
        }
    }

    #[cfg(test)]
    fn with_timing(script: NarrationScript, char_speed: Duration, read_dwell: Duration) -> Self {
        Self {
            script,
            char_speed,
            read_dwell,
        }
    }

    /// Spawn the playback loop. The receiver carries the currently typed
    /// text; it updates one character at a time.
    pub fn start(self) -> (JoinHandle<()>, watch::Receiver<String>) {
        let (tx, rx) = watch::channel(String::new());

        let handle = tokio::spawn(async move {
            if self.script.page_count() == 0 {
                tracing::warn!("Narration script is empty, player idle");
                return;
            }

            let mut page_index = 0;
            loop {
                let Some(page) = self.script.page(page_index) else {
                    page_index = 0;
                    continue;
                };

                let mut shown = String::new();
                tx.send_replace(shown.clone());
                for ch in page.chars() {
                    tokio::time::sleep(self.char_speed).await;
                    shown.push(ch);
                    if tx.send(shown.clone()).is_err() {
                        tracing::debug!("Narration receiver dropped, player stopping");
                        return;
                    }
                }

                tokio::time::sleep(self.read_dwell).await;
                page_index = self.script.next_page(page_index);
            }
        });

        (handle, rx)
    }
}
