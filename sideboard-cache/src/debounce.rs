//! Debounced persistence.
//!
//! Rapid bursts of state changes (a window being dragged, a list being
//! reordered) each request a save; only one write lands, after the
//! burst goes quiet. The scheduler keeps a single pending deadline and
//! every request pushes it out (last call wins).
//!
//! The scheduler is single-threaded on purpose: the owning thread
//! calls [`poll`] from its event pump, so the persist op runs on the
//! same thread that owns the state being saved and no marshaling is
//! needed.
//!
//! [`poll`]: DebouncedSaveScheduler::poll

use std::time::{Duration, Instant};
use tracing::debug;

/// Quiet period before a requested save executes.
pub const DEFAULT_DEBOUNCE_INTERVAL: Duration = Duration::from_millis(600);

/// Coalesces bursts of save requests into one deferred execution.
pub struct DebouncedSaveScheduler {
    interval: Duration,
    deadline: Option<Instant>,
    op: Box<dyn FnMut()>,
}

impl DebouncedSaveScheduler {
    /// Scheduler with the default 600 ms quiet period.
    pub fn new<F>(op: F) -> Self
    where
        F: FnMut() + 'static,
    {
        Self::with_interval(DEFAULT_DEBOUNCE_INTERVAL, op)
    }

    pub fn with_interval<F>(interval: Duration, op: F) -> Self
    where
        F: FnMut() + 'static,
    {
        Self {
            interval,
            deadline: None,
            op: Box::new(op),
        }
    }

    /// Request a save; the deadline moves to `now + interval`,
    /// superseding any earlier pending request.
    pub fn schedule_save(&mut self) {
        self.schedule_save_at(Instant::now());
    }

    fn schedule_save_at(&mut self, now: Instant) {
        self.deadline = Some(now + self.interval);
    }

    /// Run the op if the pending deadline has elapsed.
    ///
    /// Called from the owning thread's event pump. Returns whether the
    /// op ran; pending state is cleared when it does.
    pub fn poll(&mut self) -> bool {
        self.poll_at(Instant::now())
    }

    fn poll_at(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                (self.op)();
                true
            }
            _ => false,
        }
    }

    /// Run a pending save immediately, cancelling its deadline.
    ///
    /// No-op when nothing is pending; returns whether the op ran. Used
    /// at teardown so a burst in progress is not lost.
    pub fn flush_now(&mut self) -> bool {
        if self.deadline.take().is_some() {
            debug!("flushing pending save");
            (self.op)();
            true
        } else {
            false
        }
    }

    /// Whether a save is scheduled but not yet executed.
    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}
