//! Background task execution.
//!
//! One dedicated thread drains a FIFO queue of submitted tasks. Results
//! are never delivered on the worker thread: completion posts the
//! corresponding callback to the [`dispatch`](crate::dispatch) queue,
//! so callers' state is only ever touched from the owning thread.
//!
//! Cancellation is best-effort and pre-execution only. The flag is
//! checked immediately before a task runs; once an operation has
//! started it runs to completion.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use sideboard_core::{FetchError, WorkerError};

use crate::dispatch::DispatchHandle;

type Job = Box<dyn FnOnce(&DispatchHandle) + Send + 'static>;

struct QueuedTask {
    job: Job,
    cancelled: Arc<AtomicBool>,
}

/// Handle to a submitted task, for pre-execution cancellation.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    cancelled: Arc<AtomicBool>,
}

impl TaskHandle {
    /// Flag the task as cancelled.
    ///
    /// Effective only while the task is still queued; a running task
    /// finishes normally. A cancelled task invokes neither callback.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether `cancel` has been called.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// An inert handle for tasks that were never queued.
    fn dropped() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(true)),
        }
    }
}

/// Shared flag carrying the shutdown request and its drain deadline.
#[derive(Debug, Default)]
struct StopSignal {
    requested: AtomicBool,
    deadline: Mutex<Option<Instant>>,
}

impl StopSignal {
    fn request(&self, deadline: Instant) {
        *self.deadline.lock().unwrap_or_else(|p| p.into_inner()) = Some(deadline);
        self.requested.store(true, Ordering::SeqCst);
    }

    /// True once the drain window has closed.
    fn drain_expired(&self) -> bool {
        if !self.requested.load(Ordering::SeqCst) {
            return false;
        }
        let deadline = self.deadline.lock().unwrap_or_else(|p| p.into_inner());
        matches!(*deadline, Some(d) if Instant::now() >= d)
    }
}

/// Single-threaded background task runner.
///
/// `submit` enqueues and returns immediately; the worker thread pops
/// tasks in order, runs the operation, and posts the success or error
/// callback to the owning thread. After [`shutdown`] has been
/// requested, `submit` silently drops new tasks.
///
/// [`shutdown`]: TaskWorker::shutdown
pub struct TaskWorker {
    tx: Mutex<Option<Sender<QueuedTask>>>,
    accepting: AtomicBool,
    stop: Arc<StopSignal>,
    thread: Mutex<Option<JoinHandle<()>>>,
    exited: Mutex<Receiver<()>>,
}

impl TaskWorker {
    /// Spawn the worker thread, delivering callbacks through `dispatch`.
    pub fn new(dispatch: DispatchHandle) -> Self {
        let (tx, rx) = channel::<QueuedTask>();
        let (exit_tx, exit_rx) = channel::<()>();
        let stop = Arc::new(StopSignal::default());
        let stop_for_thread = Arc::clone(&stop);

        let thread = thread::Builder::new()
            .name("sideboard-worker".to_string())
            .spawn(move || {
                run_loop(&rx, &dispatch, &stop_for_thread);
                let _ = exit_tx.send(());
            })
            .expect("failed to spawn worker thread");

        Self {
            tx: Mutex::new(Some(tx)),
            accepting: AtomicBool::new(true),
            stop,
            thread: Mutex::new(Some(thread)),
            exited: Mutex::new(exit_rx),
        }
    }

    /// Queue an operation; non-blocking.
    ///
    /// Exactly one of `on_success`/`on_error` runs on the owning
    /// thread when the operation completes, unless the task is
    /// cancelled first or dropped at shutdown, in which case neither
    /// runs.
    pub fn submit<T, F, S, E>(&self, operation: F, on_success: S, on_error: E) -> TaskHandle
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, FetchError> + Send + 'static,
        S: FnOnce(T) + Send + 'static,
        E: FnOnce(FetchError) + Send + 'static,
    {
        if !self.accepting.load(Ordering::SeqCst) {
            debug!("worker shut down; dropping submitted task");
            return TaskHandle::dropped();
        }

        let cancelled = Arc::new(AtomicBool::new(false));
        let handle = TaskHandle {
            cancelled: Arc::clone(&cancelled),
        };
        let job: Job = Box::new(move |dispatch| match operation() {
            Ok(value) => dispatch.post(move || on_success(value)),
            Err(err) => dispatch.post(move || on_error(err)),
        });

        let tx = self.tx.lock().unwrap_or_else(|p| p.into_inner());
        let sent = match tx.as_ref() {
            Some(tx) => tx.send(QueuedTask { job, cancelled }).is_ok(),
            None => false,
        };
        if sent {
            handle
        } else {
            debug!("worker queue closed; dropping submitted task");
            TaskHandle::dropped()
        }
    }

    /// Whether the worker still accepts submissions.
    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    /// Stop accepting tasks, drain the queue up to `timeout`, join.
    ///
    /// Already-queued tasks keep executing until the deadline passes;
    /// anything still unexecuted afterwards is dropped without
    /// invoking callbacks. Idempotent.
    ///
    /// # Errors
    ///
    /// [`WorkerError::JoinTimedOut`] when the worker thread did not
    /// exit in time (a task is still running; it cannot be preempted).
    /// The thread is left detached and will exit when that task ends.
    pub fn shutdown(&self, timeout: Duration) -> Result<(), WorkerError> {
        self.accepting.store(false, Ordering::SeqCst);
        self.stop.request(Instant::now() + timeout);
        // Disconnect the queue so the worker's recv loop terminates
        // once the backlog is consumed.
        self.tx.lock().unwrap_or_else(|p| p.into_inner()).take();

        let mut thread = self.thread.lock().unwrap_or_else(|p| p.into_inner());
        let Some(handle) = thread.take() else {
            return Ok(());
        };

        // Give the in-flight task a grace period beyond the drain
        // deadline before giving up on the join.
        let wait = timeout + Duration::from_millis(250);
        let exited = self.exited.lock().unwrap_or_else(|p| p.into_inner());
        match exited.recv_timeout(wait) {
            Ok(()) => {
                let _ = handle.join();
                Ok(())
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(waited_ms = wait.as_millis() as u64, "worker did not exit in time");
                // Leak the handle; the thread finishes its current task
                // and exits on its own.
                Err(WorkerError::JoinTimedOut {
                    waited_ms: wait.as_millis() as u64,
                })
            }
            Err(RecvTimeoutError::Disconnected) => {
                let _ = handle.join();
                Ok(())
            }
        }
    }
}

impl Drop for TaskWorker {
    fn drop(&mut self) {
        // Best effort: don't strand queued work silently on drop, but
        // don't hang teardown either.
        if self.accepting.load(Ordering::SeqCst) {
            let _ = self.shutdown(Duration::from_millis(100));
        }
    }
}

fn run_loop(rx: &Receiver<QueuedTask>, dispatch: &DispatchHandle, stop: &StopSignal) {
    while let Ok(task) = rx.recv() {
        if stop.drain_expired() {
            debug!("shutdown drain deadline passed; dropping queued task");
            continue;
        }
        if task.cancelled.load(Ordering::SeqCst) {
            debug!("skipping cancelled task");
            continue;
        }
        (task.job)(dispatch);
    }
}
