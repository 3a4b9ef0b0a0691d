//! Debounced search input.
//!
//! Each keystroke restarts a quiet-interval timer; only the last value of a
//! burst is delivered. Delivery happens over an mpsc channel that the list
//! controller drains, the same way background results reach the UI loop.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

/// Quiet interval before typed search text is applied.
pub const DEFAULT_QUIET_INTERVAL: Duration = Duration::from_millis(400);

/// Buffer size for settled-search messages.
/// A burst produces at most one in-flight message, so this never fills.
pub const CHANNEL_BUFFER_SIZE: usize = 16;

/// Search text that stayed unchanged for the quiet interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchSettled {
    pub ticket: u64,
    pub text: String,
}

/// Owns the pending timer for one search box.
///
/// Every scheduled update carries a ticket; only the newest ticket is
/// accepted, so a timer that fired just before being superseded is ignored.
pub struct SearchDebouncer {
    quiet: Duration,
    tx: mpsc::Sender<SearchSettled>,
    timer: Option<JoinHandle<()>>,
    ticket: u64,
    disposed: bool,
}

impl SearchDebouncer {
    pub fn new(quiet: Duration, tx: mpsc::Sender<SearchSettled>) -> Self {
        Self {
            quiet,
            tx,
            timer: None,
            ticket: 0,
            disposed: false,
        }
    }

    /// Debouncer plus the receiving end its timers deliver to.
    pub fn channel(quiet: Duration) -> (Self, mpsc::Receiver<SearchSettled>) {
        let (tx, rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
        (Self::new(quiet, tx), rx)
    }

    /// Restart the quiet interval with `raw` as the pending value.
    pub fn on_input(&mut self, raw: &str) -> u64 {
        if self.disposed {
            return self.ticket;
        }
        self.abort_timer();
        self.ticket += 1;

        let settled = SearchSettled {
            ticket: self.ticket,
            text: raw.to_string(),
        };
        let tx = self.tx.clone();
        let deadline = Instant::now() + self.quiet;
        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            // Receiver gone means the controller was torn down
            let _ = tx.send(settled).await;
        }));
        self.ticket
    }

    /// Drop any pending value; messages already delivered become stale.
    /// Used when the search is cleared explicitly and applied at once.
    pub fn cancel(&mut self) {
        self.abort_timer();
        self.ticket += 1;
    }

    /// Whether a delivered message is the latest scheduled update.
    pub fn accept(&self, settled: &SearchSettled) -> bool {
        !self.disposed && settled.ticket == self.ticket
    }

    pub fn is_pending(&self) -> bool {
        self.timer.as_ref().is_some_and(|timer| !timer.is_finished())
    }

    /// Cancel the timer for good; later input is ignored.
    pub fn dispose(&mut self) {
        self.abort_timer();
        self.disposed = true;
    }

    fn abort_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            if !timer.is_finished() {
                debug!(ticket = self.ticket, "Superseding pending search update");
            }
            timer.abort();
        }
    }
}

impl Drop for SearchDebouncer {
    fn drop(&mut self) {
        self.abort_timer();
    }
}
