//! LightTrigger - rate-limited side-effect client
//!
//! ## Responsibilities
//!
//! - Consume clear notices from the batch window
//! - POST `{event: "frame_cleared", count, at}` to the light endpoint
//! - Drop notices arriving within the cooldown of the previously accepted trigger
//!
//! Failures are logged as warnings and never retried; the clear cycle has
//! already completed by the time a notice reaches this client.

use crate::batch_window::ClearNotice;
use crate::models::LightTriggerBody;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

/// Minimum spacing between trigger attempts; double-clears within this
/// window would spam the device faster than it can react.
pub const LIGHT_COOLDOWN: Duration = Duration::from_millis(500);

/// LightTrigger instance
pub struct LightTrigger {
    client: reqwest::Client,
    url: String,
    cooldown: Duration,
    last_fired: Mutex<Option<Instant>>,
}

impl LightTrigger {
    /// Create new LightTrigger with the default cooldown
    pub fn new(url: String) -> Self {
        Self::with_cooldown(url, LIGHT_COOLDOWN)
    }

    pub fn with_cooldown(url: String, cooldown: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
            cooldown,
            last_fired: Mutex::new(None),
        }
    }

    /// Spawn a task forwarding clear notices to the device.
    pub fn start(self: Arc<Self>, mut clears: mpsc::UnboundedReceiver<ClearNotice>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(notice) = clears.recv().await {
                self.fire(notice).await;
            }
            tracing::debug!("Clear notice channel closed, light trigger stopping");
        })
    }

    /// Fire one trigger, subject to the cooldown.
    pub async fn fire(&self, notice: ClearNotice) {
        if !self.try_acquire().await {
            tracing::debug!(count = notice.count, "Light trigger within cooldown, dropped");
            return;
        }

        let body = LightTriggerBody::frame_cleared(notice.count, notice.at);
        tracing::info!(url = %self.url, count = notice.count, "Light trigger");

        match self.client.post(&self.url).json(&body).send().await {
            Ok(response) if !response.status().is_success() => {
                tracing::warn!(status = %response.status(), "Light trigger rejected");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Light trigger failed");
            }
        }
    }

    /// Check the cooldown and record this attempt in one critical section.
    async fn try_acquire(&self) -> bool {
        let mut last = self.last_fired.lock().await;
        if let Some(at) = *last {
            if at.elapsed() < self.cooldown {
                return false;
            }
        }
        *last = Some(Instant::now());
        true
    }
}
