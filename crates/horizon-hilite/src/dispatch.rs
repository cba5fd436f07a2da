//! The shared notification dispatch context.
//!
//! All listener callbacks in the hilite network execute on one dedicated
//! thread, in the order their notification batches were posted. Fire calls
//! are therefore non-blocking for the caller: a handler commits its state
//! change, posts a closure here, and returns immediately.
//!
//! # Ordering
//!
//! The queue is a single unbounded channel drained by a single thread, so
//! tasks execute in global FIFO order across every handler in the process.
//! This gives the required per-handler FIFO delivery and, stronger, a total
//! order over all notifications in the shared context.
//!
//! # Synchronization
//!
//! [`flush`] posts a barrier task and blocks until it runs, guaranteeing
//! that every notification posted before the call has been delivered. Use
//! it when a caller needs to observe the network in a settled state (tests,
//! teardown, synchronous UI refresh points).

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::OnceLock;
use std::thread;

use crossbeam_channel::{Sender, unbounded};
use parking_lot::{Condvar, Mutex};

/// A deferred notification batch.
type Task = Box<dyn FnOnce() + Send + 'static>;

/// Global dispatch queue, started on first use.
static DISPATCH: OnceLock<NotificationQueue> = OnceLock::new();

/// Handle to the process-wide notification thread.
pub struct NotificationQueue {
    sender: Sender<Task>,
}

impl NotificationQueue {
    /// Start the dispatch thread and return its handle.
    fn start() -> Self {
        let (sender, receiver) = unbounded::<Task>();

        thread::Builder::new()
            .name("hilite-dispatch".to_string())
            .spawn(move || {
                for task in receiver.iter() {
                    // A panicking batch must not take down the dispatch
                    // thread; per-listener isolation happens in the handler,
                    // this is the outer safety net.
                    if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
                        tracing::error!(
                            target: "horizon_hilite::dispatch",
                            "notification batch panicked; dispatch thread continues"
                        );
                    }
                }
            })
            .expect("failed to spawn hilite-dispatch thread");

        Self { sender }
    }

    /// Post a task to the end of the queue. Never blocks.
    pub fn post<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        // The receiver lives for the process lifetime, so a send failure
        // is unreachable; drop the task if it ever happens.
        let _ = self.sender.send(Box::new(task));
    }
}

/// Get the global notification queue, starting it if necessary.
pub fn notification_queue() -> &'static NotificationQueue {
    DISPATCH.get_or_init(NotificationQueue::start)
}

/// Completion state shared between a barrier task and its waiter.
struct CompletionState {
    done: Mutex<bool>,
    condvar: Condvar,
}

/// Block until every task posted before this call has executed.
pub fn flush() {
    let state = Arc::new(CompletionState {
        done: Mutex::new(false),
        condvar: Condvar::new(),
    });

    let signal = Arc::clone(&state);
    notification_queue().post(move || {
        let mut done = signal.done.lock();
        *done = true;
        signal.condvar.notify_all();
    });

    let mut done = state.done.lock();
    while !*done {
        state.condvar.wait(&mut done);
    }
}
