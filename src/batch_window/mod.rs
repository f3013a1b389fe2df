//! BatchWindow - fill/clear display state machine
//!
//! ## Responsibilities
//!
//! - Hold the unbounded pending queue and the fixed-capacity visible window
//! - Promote pending events in arrival order whenever capacity frees up
//! - Run the two-phase clear cycle (dwell, then vanish) when the window
//!   becomes full, and emit a clear notice with the count captured at the
//!   moment the cycle began
//!
//! All mutations funnel through `WindowState::reconcile`, invoked after
//! every external input (arrival or timer fire), so ordering is
//! deterministic. The fill transition is edge-triggered: it fires when a
//! promotion makes the window full, never on a check that merely finds it
//! full. Timer tasks keep their handles so teardown can cancel an
//! in-flight cycle before it acts on stale state.

use crate::models::DisplayEvent;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;

/// Window lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchPhase {
    /// Accepting promotions from the pending queue
    Filling,
    /// Window frozen; clear cycle timers running
    Clearing,
}

/// Emitted once per completed clear cycle.
#[derive(Debug, Clone)]
pub struct ClearNotice {
    /// Occupancy captured when the cycle began
    pub count: usize,
    pub at: DateTime<Utc>,
}

/// Point-in-time view for the renderer.
#[derive(Debug, Clone)]
pub struct WindowSnapshot {
    pub visible: Vec<DisplayEvent>,
    pub capacity: usize,
    pub pending: usize,
    /// True during the vanish animation (after the dwell)
    pub vanishing: bool,
    /// Running count of every event ever promoted
    pub total_shown: u64,
}

/// Pure window state; every transition is a plain method call.
#[derive(Debug)]
pub struct WindowState {
    capacity: usize,
    pending: VecDeque<DisplayEvent>,
    visible: Vec<DisplayEvent>,
    phase: BatchPhase,
    vanishing: bool,
    cleared_count: usize,
    total_shown: u64,
}

impl WindowState {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            pending: VecDeque::new(),
            visible: Vec::with_capacity(capacity),
            phase: BatchPhase::Filling,
            vanishing: false,
            cleared_count: 0,
            total_shown: 0,
        }
    }

    /// Append an arrival; always accepted regardless of phase.
    pub fn enqueue(&mut self, event: DisplayEvent) {
        self.pending.push_back(event);
    }

    /// Promote as many pending events as currently fit, in arrival order.
    ///
    /// Returns true only when this call made the window full, which also
    /// moves the phase to Clearing and captures the occupancy for the
    /// eventual clear notice.
    pub fn reconcile(&mut self) -> bool {
        if self.phase == BatchPhase::Clearing {
            return false;
        }

        let free = self.capacity.saturating_sub(self.visible.len());
        let take = free.min(self.pending.len());
        if take == 0 {
            return false;
        }

        for _ in 0..take {
            if let Some(event) = self.pending.pop_front() {
                self.visible.push(event);
            }
        }
        self.total_shown += take as u64;

        if self.visible.len() == self.capacity {
            self.phase = BatchPhase::Clearing;
            self.cleared_count = self.visible.len();
            true
        } else {
            false
        }
    }

    /// Dwell is over; the vanish animation starts now.
    pub fn begin_vanish(&mut self) {
        self.vanishing = true;
    }

    /// End the clear cycle: empty the window, return to Filling.
    ///
    /// Returns the occupancy captured when Clearing began, not the current
    /// length (pending growth during the cycle must not affect it).
    pub fn finish_clear(&mut self) -> usize {
        let count = self.cleared_count;
        self.visible.clear();
        self.vanishing = false;
        self.cleared_count = 0;
        self.phase = BatchPhase::Filling;
        count
    }

    pub fn phase(&self) -> BatchPhase {
        self.phase
    }

    pub fn visible(&self) -> &[DisplayEvent] {
        &self.visible
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn snapshot(&self) -> WindowSnapshot {
        WindowSnapshot {
            visible: self.visible.clone(),
            capacity: self.capacity,
            pending: self.pending.len(),
            vanishing: self.vanishing,
            total_shown: self.total_shown,
        }
    }
}

/// BatchWindow driver: owns the state, the timers, and the outputs.
pub struct BatchWindow {
    state: Mutex<WindowState>,
    pause_before_clear: Duration,
    clear_anim: Duration,
    snapshot_tx: watch::Sender<WindowSnapshot>,
    clears_tx: mpsc::UnboundedSender<ClearNotice>,
    clear_task: Mutex<Option<JoinHandle<()>>>,
}

impl BatchWindow {
    /// Create a window driver along with its snapshot and clear outputs.
    pub fn new(
        capacity: usize,
        pause_before_clear: Duration,
        clear_anim: Duration,
    ) -> (
        Arc<Self>,
        watch::Receiver<WindowSnapshot>,
        mpsc::UnboundedReceiver<ClearNotice>,
    ) {
        let state = WindowState::new(capacity);
        let (snapshot_tx, snapshot_rx) = watch::channel(state.snapshot());
        let (clears_tx, clears_rx) = mpsc::unbounded_channel();

        let window = Arc::new(Self {
            state: Mutex::new(state),
            pause_before_clear,
            clear_anim,
            snapshot_tx,
            clears_tx,
            clear_task: Mutex::new(None),
        });

        (window, snapshot_rx, clears_rx)
    }

    /// Accept one arriving event and reconcile.
    pub async fn submit(self: &Arc<Self>, event: DisplayEvent) {
        let filled = {
            let mut state = self.state.lock().await;
            state.enqueue(event);
            let filled = state.reconcile();
            self.snapshot_tx.send_replace(state.snapshot());
            filled
        };

        if filled {
            self.arm_clear_cycle().await;
        }
    }

    /// Cancel any in-flight clear cycle timers.
    ///
    /// Without this a timer fired after teardown would clear a window that
    /// no longer exists (stale state).
    pub async fn shutdown(&self) {
        if let Some(task) = self.clear_task.lock().await.take() {
            task.abort();
            tracing::debug!("Clear cycle task cancelled");
        }
    }

    async fn arm_clear_cycle(self: &Arc<Self>) {
        let window = Arc::clone(self);
        let handle = tokio::spawn(async move {
            window.run_clear_cycle().await;
        });

        // A previous handle here is always a finished cycle; the Filling ->
        // Clearing edge cannot fire while a cycle is still running.
        let mut task = self.clear_task.lock().await;
        *task = Some(handle);
    }

    async fn run_clear_cycle(self: Arc<Self>) {
        loop {
            tokio::time::sleep(self.pause_before_clear).await;

            {
                let mut state = self.state.lock().await;
                state.begin_vanish();
                self.snapshot_tx.send_replace(state.snapshot());
            }

            tokio::time::sleep(self.clear_anim).await;

            let (count, refilled) = {
                let mut state = self.state.lock().await;
                let count = state.finish_clear();
                // Drain whatever accumulated while the window was frozen.
                let refilled = state.reconcile();
                self.snapshot_tx.send_replace(state.snapshot());
                (count, refilled)
            };

            tracing::info!(count = count, refilled = refilled, "Window cleared");

            if self
                .clears_tx
                .send(ClearNotice {
                    count,
                    at: Utc::now(),
                })
                .is_err()
            {
                tracing::debug!("Clear notice receiver dropped");
            }

            // The drain may have filled the window again; keep cycling
            // inside this task rather than re-arming from outside.
            if !refilled {
                break;
            }
        }
    }
}
