//! The reader's serialization point: a task queue drained by one thread.
//!
//! No component owns a thread; the host dedicates one and parks it in
//! [`EventLoop::run`]. Everything that touches a reader's byte stream is
//! posted here, so exactly one thread ever drives stream I/O. Synchronous
//! calls issued off the owning thread post a one-shot work item and block on
//! the caller's condition variable until it completes.

use std::sync::Arc;
use std::sync::mpsc::{Receiver, Sender, channel};
use std::thread::ThreadId;

use parking_lot::Mutex;

type Task = Box<dyn FnOnce() + Send>;

enum Message {
    Task(Task),
    Quit,
}

struct LoopState {
    thread: Mutex<Option<ThreadId>>,
}

/// A single-threaded task loop.
///
/// Create it, hand [`handle`](Self::handle)s to producers, and call
/// [`run`](Self::run) from the thread that should own the work.
pub struct EventLoop {
    tx: Sender<Message>,
    rx: Mutex<Receiver<Message>>,
    state: Arc<LoopState>,
}

impl EventLoop {
    /// Creates an idle loop. Nothing executes until [`run`](Self::run).
    pub fn new() -> Self {
        let (tx, rx) = channel();
        Self {
            tx,
            rx: Mutex::new(rx),
            state: Arc::new(LoopState {
                thread: Mutex::new(None),
            }),
        }
    }

    /// A cloneable posting handle.
    pub fn handle(&self) -> LoopHandle {
        LoopHandle {
            tx: self.tx.clone(),
            state: self.state.clone(),
        }
    }

    /// Claims the calling thread and drains tasks until [`quit`](Self::quit)
    /// or until every handle (and the loop itself) is gone.
    pub fn run(&self) {
        let rx = self.rx.lock();
        *self.state.thread.lock() = Some(std::thread::current().id());
        tracing::debug!("event loop started");
        while let Ok(message) = rx.recv() {
            match message {
                Message::Task(task) => task(),
                Message::Quit => break,
            }
        }
        *self.state.thread.lock() = None;
        tracing::debug!("event loop stopped");
    }

    /// Asks the running loop to exit after the tasks already queued.
    pub fn quit(&self) {
        let _ = self.tx.send(Message::Quit);
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

/// Posting handle for an [`EventLoop`].
#[derive(Clone)]
pub struct LoopHandle {
    tx: Sender<Message>,
    state: Arc<LoopState>,
}

impl LoopHandle {
    /// Queues `task` for execution on the loop thread. Returns `false` when
    /// the loop is gone.
    pub fn post(&self, task: impl FnOnce() + Send + 'static) -> bool {
        self.tx.send(Message::Task(Box::new(task))).is_ok()
    }

    /// True when called from the thread currently running the loop.
    pub fn is_loop_thread(&self) -> bool {
        *self.state.thread.lock() == Some(std::thread::current().id())
    }
}
