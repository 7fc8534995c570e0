//! Background I/O worker for actuator operations.
//!
//! Each actuator owns one worker thread running a current-thread tokio
//! runtime. Synchronous callers hand it futures through a channel; the worker
//! runs them one after another, each to completion. Futures spawned from
//! inside a task (the link watcher) run alongside on the same runtime.

use std::future::Future;
use std::pin::Pin;
use std::sync::{mpsc as std_mpsc, Mutex, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

type Task = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Errors raised by the I/O worker.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// The worker has been shut down; the task was dropped.
    #[error("I/O worker has stopped")]
    Stopped,

    /// The worker thread or its runtime could not be created.
    #[error("failed to start I/O worker: {message}")]
    StartFailed {
        /// Underlying cause.
        message: String,
    },

    /// The worker went away before the task produced its result.
    #[error("I/O task ended without producing a result")]
    TaskAbandoned,
}

/// How [`IoBridge::execute`] ran a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion<T> {
    /// The task ran to completion; here is its output.
    Finished(T),
    /// The caller is the worker itself, so the task was queued behind the
    /// operation in flight and its output will be discarded.
    Scheduled,
}

/// Handle to the worker thread.
pub struct IoBridge {
    name: String,
    sender: Mutex<Option<mpsc::UnboundedSender<Task>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    worker_id: ThreadId,
}

impl IoBridge {
    /// Start the worker thread named `name`.
    ///
    /// Returns once the worker's runtime is up, so a successful return means
    /// tasks will be executed.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::StartFailed`] if the thread or runtime cannot be
    /// created.
    pub fn start(name: &str) -> Result<Self, BridgeError> {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Task>();
        let (ready_tx, ready_rx) = std_mpsc::sync_channel::<Result<(), String>>(1);

        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => {
                        let _ = ready_tx.send(Ok(()));
                        runtime
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.to_string()));
                        return;
                    }
                };

                runtime.block_on(async move {
                    while let Some(task) = receiver.recv().await {
                        task.await;
                    }
                });
                debug!("I/O worker drained its queue");
            })
            .map_err(|e| BridgeError::StartFailed {
                message: e.to_string(),
            })?;

        let started = ready_rx.recv().unwrap_or_else(|_| {
            Err("worker exited during start-up".to_string())
        });
        if let Err(message) = started {
            let _ = handle.join();
            return Err(BridgeError::StartFailed { message });
        }

        debug!(worker = name, "I/O worker started");
        Ok(Self {
            name: name.to_string(),
            worker_id: handle.thread().id(),
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(handle)),
        })
    }

    /// `true` until [`IoBridge::shutdown`] has been called or the worker died.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|sender| !sender.is_closed())
    }

    /// `true` when called from the worker thread.
    #[must_use]
    pub fn on_worker_thread(&self) -> bool {
        thread::current().id() == self.worker_id
    }

    /// Queue `task` and return immediately.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Stopped`] (and logs a warning) if the worker is
    /// gone; the task is dropped.
    pub fn spawn<F>(&self, task: F) -> Result<(), BridgeError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let guard = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let queued = guard
            .as_ref()
            .is_some_and(|sender| sender.send(Box::pin(task)).is_ok());
        if queued {
            Ok(())
        } else {
            warn!(worker = %self.name, "I/O worker has stopped, dropping task");
            Err(BridgeError::Stopped)
        }
    }

    /// Run `task` on the worker and block until it finishes.
    ///
    /// From the worker thread itself this cannot block (the worker would wait
    /// on itself), so the task is queued instead and
    /// [`Completion::Scheduled`] is returned.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Stopped`] if the worker is gone, or
    /// [`BridgeError::TaskAbandoned`] if it died while running the task.
    pub fn execute<F, T>(&self, task: F) -> Result<Completion<T>, BridgeError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        if self.on_worker_thread() {
            self.spawn(async move {
                let _ = task.await;
            })?;
            return Ok(Completion::Scheduled);
        }

        let (done_tx, done_rx) = std_mpsc::sync_channel(1);
        self.spawn(async move {
            let _ = done_tx.send(task.await);
        })?;
        done_rx
            .recv()
            .map(Completion::Finished)
            .map_err(|_| BridgeError::TaskAbandoned)
    }

    /// Close the queue, let queued tasks finish, and join the worker.
    ///
    /// Idempotent. Tasks spawned inside the runtime (link watchers) are
    /// dropped with it.
    pub fn shutdown(&self) {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if sender.is_none() {
            return;
        }
        drop(sender);

        if self.on_worker_thread() {
            warn!(worker = %self.name, "shutdown requested from the I/O worker, not joining");
            return;
        }
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!(worker = %self.name, "I/O worker panicked");
            }
        }
        debug!(worker = %self.name, "I/O worker stopped");
    }
}

impl Drop for IoBridge {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for IoBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IoBridge")
            .field("name", &self.name)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}
