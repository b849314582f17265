//! Worker hand-off.
//!
//! The dispatcher only needs [`Worker::submit`]: a synchronous, non-blocking
//! hand-off that either accepts an envelope or says why not. [`ChannelWorker`]
//! is the stock implementation: a bounded mpsc queue drained by one tokio task
//! that runs an [`EnvelopeHandler`] and reports completions through the
//! notifier from its own context.

use anyhow::{ensure, Context as _};
use async_trait::async_trait;
use optube_core::CommandEnvelope;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

use super::error::HandoffError;
use super::notifier::CompletionNotifier;
use crate::context::TubeContext;

// ---------------------------------------------------------------------------
// Worker trait
// ---------------------------------------------------------------------------

/// Executor that accepts envelopes for asynchronous processing.
pub trait Worker: Send + Sync {
    /// Enqueues `envelope` without waiting.
    ///
    /// # Errors
    ///
    /// Returns a `HandoffError` if the envelope was not accepted. In that
    /// case no completion will ever be reported for it.
    fn submit(&self, envelope: CommandEnvelope) -> Result<(), HandoffError>;
}

// ---------------------------------------------------------------------------
// EnvelopeHandler trait
// ---------------------------------------------------------------------------

/// Work performed inside a [`ChannelWorker`] for each accepted envelope.
///
/// Implementors perform the operation and report its outcome through
/// `notifier`, typically via
/// [`CompletionNotifier::on_operation_completed_ex`].
#[async_trait]
pub trait EnvelopeHandler: Send + 'static {
    /// Processes one envelope.
    async fn handle(&mut self, envelope: CommandEnvelope, notifier: &CompletionNotifier);

    /// Called once when the worker is shutting down. Default is a no-op.
    async fn shutdown(&mut self) {}
}

// ---------------------------------------------------------------------------
// ChannelWorker
// ---------------------------------------------------------------------------

/// Bounded-queue worker running an [`EnvelopeHandler`] on a tokio task.
///
/// The task:
/// 1. Receives envelopes from the queue in submission order
/// 2. Calls `EnvelopeHandler::handle()` for each one
/// 3. Calls `EnvelopeHandler::shutdown()` when stopped
pub struct ChannelWorker {
    tx: Mutex<Option<mpsc::Sender<CommandEnvelope>>>,
    shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
    capacity: usize,
}

impl ChannelWorker {
    /// Spawns a worker reporting through `ctx`, with the queue sized by
    /// `worker_queue_capacity`.
    ///
    /// # Errors
    ///
    /// Same as [`start`](Self::start).
    pub fn from_context<H: EnvelopeHandler>(
        handler: H,
        ctx: &TubeContext,
    ) -> anyhow::Result<Self> {
        Self::start(handler, ctx.notifier(), ctx.config().worker_queue_capacity)
    }

    /// Spawns the worker task with a queue of `capacity` envelopes.
    ///
    /// # Errors
    ///
    /// Returns an error if `capacity` is zero or if called outside a tokio
    /// runtime.
    pub fn start<H: EnvelopeHandler>(
        mut handler: H,
        notifier: CompletionNotifier,
        capacity: usize,
    ) -> anyhow::Result<Self> {
        ensure!(capacity > 0, "worker queue capacity must be greater than zero");
        let runtime = tokio::runtime::Handle::try_current()
            .context("channel worker started outside a tokio runtime")?;
        let (tx, mut rx) = mpsc::channel::<CommandEnvelope>(capacity);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let handle = runtime.spawn(async move {
            loop {
                tokio::select! {
                    envelope = rx.recv() => {
                        match envelope {
                            Some(envelope) => {
                                debug!(
                                    request_id = %envelope.request_id,
                                    operation = %envelope.operation,
                                    client_id = %envelope.client_id,
                                    "handling envelope"
                                );
                                handler.handle(envelope, &notifier).await;
                            }
                            None => break, // All senders dropped.
                        }
                    }
                    _ = &mut shutdown_rx => {
                        break;
                    }
                }
            }

            handler.shutdown().await;
        });

        Ok(Self {
            tx: Mutex::new(Some(tx)),
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            handle: Mutex::new(Some(handle)),
            capacity,
        })
    }

    /// Enqueues `envelope`, waiting for queue space if necessary.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker has been stopped.
    pub async fn send(&self, envelope: CommandEnvelope) -> anyhow::Result<()> {
        let tx = self.tx.lock().clone();
        match tx {
            Some(tx) => tx
                .send(envelope)
                .await
                .map_err(|_| anyhow::anyhow!("worker channel closed")),
            None => Err(anyhow::anyhow!("worker not running")),
        }
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.tx
            .lock()
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    /// Stops the worker, waiting for the task to finish. Envelopes still
    /// queued are discarded; their completions are never reported.
    pub async fn stop(&self) {
        if let Some(tx) = self.shutdown_tx.lock().take() {
            let _ = tx.send(());
        }
        self.tx.lock().take();
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

impl Worker for ChannelWorker {
    fn submit(&self, envelope: CommandEnvelope) -> Result<(), HandoffError> {
        let guard = self.tx.lock();
        let Some(tx) = guard.as_ref() else {
            return Err(HandoffError::Stopped);
        };
        tx.try_send(envelope).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => HandoffError::Saturated {
                capacity: self.capacity,
            },
            mpsc::error::TrySendError::Closed(_) => HandoffError::Stopped,
        })
    }
}

impl std::fmt::Debug for ChannelWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelWorker")
            .field("capacity", &self.capacity)
            .field("running", &self.is_running())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
