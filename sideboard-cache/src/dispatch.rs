//! Callback marshaling between threads.
//!
//! One seam, one place to test: background threads [`post`] closures,
//! and the thread that owns the application state drains them from its
//! event pump. Nothing in this crate invokes a caller-supplied callback
//! on any other thread.
//!
//! Posting to a dropped queue is silently discarded. That is the
//! documented fate of callbacks that complete after shutdown: the
//! producer cannot tell and must not care.
//!
//! [`post`]: DispatchHandle::post

use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;
use tracing::debug;

type Callback = Box<dyn FnOnce() + Send + 'static>;

/// Create a connected handle/queue pair.
///
/// The handle is cheap to clone and `Send`; the queue stays with the
/// owning thread.
pub fn dispatch_queue() -> (DispatchHandle, DispatchQueue) {
    let (tx, rx) = channel();
    (DispatchHandle { tx }, DispatchQueue { rx })
}

/// Sending half: post closures to the owning thread.
#[derive(Clone)]
pub struct DispatchHandle {
    tx: Sender<Callback>,
}

impl DispatchHandle {
    /// Queue a closure for execution on the owning thread.
    ///
    /// Non-blocking. If the queue has been dropped the closure is
    /// discarded without running.
    pub fn post(&self, callback: impl FnOnce() + Send + 'static) {
        if self.tx.send(Box::new(callback)).is_err() {
            debug!("dispatch queue gone; dropping late callback");
        }
    }
}

/// Receiving half: drained by the owning thread.
pub struct DispatchQueue {
    rx: Receiver<Callback>,
}

impl DispatchQueue {
    /// Run every callback currently queued. Never blocks.
    ///
    /// Returns the number of callbacks executed.
    pub fn drain(&self) -> usize {
        let mut ran = 0;
        while let Ok(callback) = self.rx.try_recv() {
            callback();
            ran += 1;
        }
        ran
    }

    /// Block up to `timeout` for one callback and run it.
    ///
    /// Returns `false` if the timeout elapsed with nothing queued or
    /// every producer is gone.
    pub fn pump_one(&self, timeout: Duration) -> bool {
        match self.rx.recv_timeout(timeout) {
            Ok(callback) => {
                callback();
                true
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => false,
        }
    }

    /// Pump until `predicate` returns true or `timeout` elapses.
    ///
    /// Convenience for tests and teardown loops waiting on a specific
    /// completion. Returns whether the predicate was satisfied.
    pub fn pump_until(&self, timeout: Duration, mut predicate: impl FnMut() -> bool) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            if predicate() {
                return true;
            }
            let remaining = match deadline.checked_duration_since(std::time::Instant::now()) {
                Some(remaining) if !remaining.is_zero() => remaining,
                _ => return predicate(),
            };
            self.pump_one(remaining);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_drain_runs_queued_callbacks_in_order() {
        let (handle, queue) = dispatch_queue();
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        for i in 0..3 {
            let seen = Arc::clone(&seen);
            handle.post(move || seen.lock().unwrap().push(i));
        }
        assert_eq!(queue.drain(), 3);
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_drain_on_empty_queue_is_zero() {
        let (_handle, queue) = dispatch_queue();
        assert_eq!(queue.drain(), 0);
    }

    #[test]
    fn test_pump_one_waits_for_cross_thread_post() {
        let (handle, queue) = dispatch_queue();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_cb = Arc::clone(&hits);

        let producer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            handle.post(move || {
                hits_cb.fetch_add(1, Ordering::SeqCst);
            });
        });

        assert!(queue.pump_one(Duration::from_secs(2)));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        producer.join().unwrap();
    }

    #[test]
    fn test_post_after_queue_dropped_is_silent() {
        let (handle, queue) = dispatch_queue();
        drop(queue);
        // Must not panic or block.
        handle.post(|| panic!("must never run"));
    }

    #[test]
    fn test_pump_until_predicate() {
        let (handle, queue) = dispatch_queue();
        let hits = Arc::new(AtomicUsize::new(0));
        for _ in 0..2 {
            let hits = Arc::clone(&hits);
            handle.post(move || {
                hits.fetch_add(1, Ordering::SeqCst);
            });
        }
        let hits_check = Arc::clone(&hits);
        assert!(queue.pump_until(Duration::from_secs(1), move || {
            hits_check.load(Ordering::SeqCst) == 2
        }));
    }
}
