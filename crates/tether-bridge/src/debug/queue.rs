//! Command serializer
//!
//! A single worker thread drains a FIFO queue of commands and runs each one
//! with the engine context entered. Any thread may submit; submission
//! returns a [`PendingResult`] right away, and that handle completes exactly
//! once, after the worker has run the command.
//!
//! Failures stay with their command: an error or panic in one action is
//! delivered through its own handle and the worker moves on to the next
//! command.
//!
//! Shutdown closes the queue, lets the worker finish every command that was
//! already accepted, and then stops it.

use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::thread::{self, JoinHandle, ThreadId};

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::context::{Entered, ExecutionContext};
use crate::error::{BridgeError, BridgeResult};

/// A queued command: runs the action and delivers its outcome
type Job = Box<dyn FnOnce(&ExecutionContext) + Send>;

/// Lifecycle of a serializer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerializerState {
    /// Accepting and running commands
    Running,
    /// Closed to new commands, finishing the accepted ones
    Draining,
    /// Worker has exited
    Stopped,
}

/// Result of a submitted command.
///
/// Await it from async code, or call [`wait`](PendingResult::wait) from a
/// plain thread. `wait` must not be called from inside an async runtime.
#[must_use = "a pending result does nothing unless waited on"]
pub struct PendingResult<T> {
    rx: oneshot::Receiver<BridgeResult<T>>,
}

impl<T> PendingResult<T> {
    /// Block the calling thread until the command completes
    pub fn wait(self) -> BridgeResult<T> {
        self.rx.blocking_recv().unwrap_or(Err(BridgeError::WorkerGone))
    }

    /// Take the result if the command has completed
    pub fn try_take(&mut self) -> Option<BridgeResult<T>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(BridgeError::WorkerGone)),
        }
    }
}

impl<T> Future for PendingResult<T> {
    type Output = BridgeResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(BridgeError::WorkerGone)))
    }
}

impl<T> std::fmt::Debug for PendingResult<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingResult").finish_non_exhaustive()
    }
}

/// Serializes commands onto one worker thread that owns engine access.
pub struct CommandSerializer {
    context: Arc<ExecutionContext>,
    sender: Mutex<Option<Sender<Job>>>,
    state: Arc<Mutex<SerializerState>>,
    handle: Mutex<Option<JoinHandle<()>>>,
    worker: ThreadId,
}

impl CommandSerializer {
    /// Start a worker named `name` for `context`.
    ///
    /// With `bound` set, the queue holds at most that many pending commands
    /// and `submit` blocks while it is full.
    pub fn start(
        context: Arc<ExecutionContext>,
        name: &str,
        bound: Option<usize>,
    ) -> BridgeResult<Self> {
        let (sender, receiver) = match bound {
            Some(bound) => channel::bounded(bound),
            None => channel::unbounded(),
        };
        let state = Arc::new(Mutex::new(SerializerState::Running));

        let worker_context = Arc::clone(&context);
        let worker_state = Arc::clone(&state);
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run_worker(receiver, worker_context, worker_state))
            .map_err(BridgeError::WorkerSpawn)?;
        debug!(worker = name, ?bound, "started command worker");

        Ok(Self {
            context,
            sender: Mutex::new(Some(sender)),
            state,
            worker: handle.thread().id(),
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Context the worker enters for each command
    pub fn context(&self) -> &Arc<ExecutionContext> {
        &self.context
    }

    /// Current lifecycle state
    pub fn state(&self) -> SerializerState {
        *self.state.lock()
    }

    /// Queue `action` and return a handle to its result.
    ///
    /// Fails with `QueueClosed` once the serializer has been shut down.
    pub fn submit<T, F>(&self, action: F) -> BridgeResult<PendingResult<T>>
    where
        T: Send + 'static,
        F: FnOnce(&Entered<'_>) -> BridgeResult<T> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.enqueue(Box::new(move |context: &ExecutionContext| {
            // the submitter may have dropped its handle
            let _ = tx.send(run_command(context, action));
        }))?;
        Ok(PendingResult { rx })
    }

    /// Queue `action` without a result handle; a failure is logged
    pub fn submit_detached<F>(&self, command: &'static str, action: F) -> BridgeResult<()>
    where
        F: FnOnce(&Entered<'_>) -> BridgeResult<()> + Send + 'static,
    {
        self.enqueue(Box::new(move |context: &ExecutionContext| {
            if let Err(err) = run_command(context, action) {
                warn!(command, %err, "detached command failed");
            }
        }))
    }

    fn enqueue(&self, job: Job) -> BridgeResult<()> {
        let sender = self.sender.lock().clone().ok_or(BridgeError::QueueClosed)?;
        sender.send(job).map_err(|_| BridgeError::QueueClosed)
    }

    /// Stop accepting commands; the worker drains the queue and exits
    pub fn close(&self) {
        if self.sender.lock().take().is_none() {
            return;
        }
        let mut state = self.state.lock();
        if *state == SerializerState::Running {
            *state = SerializerState::Draining;
        }
        debug!("command queue closed");
    }

    /// Close the queue and wait for the worker to finish.
    ///
    /// Called from the worker itself (inside a command) this only closes the
    /// queue.
    pub fn shutdown(&self) {
        self.close();
        if thread::current().id() == self.worker {
            return;
        }
        if let Some(handle) = self.handle.lock().take() {
            if handle.join().is_err() {
                warn!("command worker exited abnormally");
            }
        }
    }
}

impl Drop for CommandSerializer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for CommandSerializer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandSerializer")
            .field("context", &self.context.id())
            .field("state", &self.state())
            .finish()
    }
}

fn run_worker(
    receiver: Receiver<Job>,
    context: Arc<ExecutionContext>,
    state: Arc<Mutex<SerializerState>>,
) {
    // ends once every sender is gone and the queue is empty
    for job in receiver.iter() {
        job(context.as_ref());
    }
    *state.lock() = SerializerState::Stopped;
    debug!(context = context.id().as_u64(), "command worker stopped");
}

/// Run one action with the context entered, turning a panic into an error
fn run_command<T>(
    context: &ExecutionContext,
    action: impl FnOnce(&Entered<'_>) -> BridgeResult<T>,
) -> BridgeResult<T> {
    match panic::catch_unwind(AssertUnwindSafe(|| context.with_context(action))) {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            warn!(%message, "command panicked");
            Err(BridgeError::CommandPanicked(message))
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
