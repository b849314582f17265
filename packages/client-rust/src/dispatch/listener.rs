//! Single-fire completion listeners and the awaitable pending completion.
//!
//! A [`CompletionListener`] is consumed by [`CompletionListener::on_event`],
//! so the type system rules out a second invocation. The bus removes the
//! listener from its map before calling it, so the topic is already inert by
//! the time user code runs.

use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use optube_core::{CompletionEvent, Outcome, RequestId, Topic};
use parking_lot::Mutex;
use tokio::sync::oneshot;

use super::error::WaitError;

/// Caller-supplied completion callback.
pub type BoxedCallback = Box<dyn FnOnce(Outcome) + Send + 'static>;

/// Boxes a closure as a [`BoxedCallback`].
pub fn callback<F>(f: F) -> BoxedCallback
where
    F: FnOnce(Outcome) + Send + 'static,
{
    Box::new(f)
}

// ---------------------------------------------------------------------------
// CompletionListener
// ---------------------------------------------------------------------------

/// Binds one callback to one topic.
pub struct CompletionListener {
    topic: Topic,
    /// Uncontended; only unwrapped when the listener is consumed. Lets the
    /// bus map be shared across threads without requiring `Sync` callbacks.
    callback: Mutex<BoxedCallback>,
}

impl CompletionListener {
    #[must_use]
    pub fn new(topic: Topic, callback: BoxedCallback) -> Self {
        Self {
            topic,
            callback: Mutex::new(callback),
        }
    }

    #[must_use]
    pub const fn topic(&self) -> Topic {
        self.topic
    }

    /// Decodes `event` and invokes the callback once.
    ///
    /// Returns `false` if the callback panicked; the panic is logged and
    /// swallowed so the notifying thread keeps running.
    pub fn on_event(self, event: CompletionEvent) -> bool {
        debug_assert_eq!(event.topic, self.topic);
        invoke_guarded(self.topic, self.callback.into_inner(), event.into_outcome())
    }
}

impl std::fmt::Debug for CompletionListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionListener")
            .field("topic", &self.topic)
            .finish_non_exhaustive()
    }
}

/// Runs `callback` with `outcome`, containing any panic.
pub(crate) fn invoke_guarded(
    label: impl std::fmt::Display,
    callback: BoxedCallback,
    outcome: Outcome,
) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(move || callback(outcome))) {
        Ok(()) => true,
        Err(_) => {
            tracing::error!(key = %label, "completion callback panicked");
            false
        }
    }
}

// ---------------------------------------------------------------------------
// PendingCompletion
// ---------------------------------------------------------------------------

/// Future resolving to the outcome of one dispatched request.
///
/// Built on a capacity-one channel: the callback half is registered like any
/// other listener and the receiving half is handed to the caller.
#[derive(Debug)]
pub struct PendingCompletion {
    request_id: RequestId,
    rx: oneshot::Receiver<Outcome>,
}

impl PendingCompletion {
    /// Creates the callback half and the receiving half of a pending completion.
    pub(crate) fn channel() -> (BoxedCallback, oneshot::Receiver<Outcome>) {
        let (tx, rx) = oneshot::channel();
        let cb = callback(move |outcome| {
            // The waiter may have given up; nothing to deliver to then.
            let _ = tx.send(outcome);
        });
        (cb, rx)
    }

    pub(crate) const fn new(request_id: RequestId, rx: oneshot::Receiver<Outcome>) -> Self {
        Self { request_id, rx }
    }

    #[must_use]
    pub const fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Waits at most `timeout` for the outcome. The registration stays on
    /// the bus after a timeout; a late completion is then discarded.
    ///
    /// # Errors
    ///
    /// `WaitError::TimedOut` when the deadline passes first,
    /// `WaitError::Abandoned` when the registration was dropped.
    pub async fn wait_timeout(self, timeout: Duration) -> Result<Outcome, WaitError> {
        match tokio::time::timeout(timeout, self).await {
            Ok(result) => result,
            Err(_elapsed) => Err(WaitError::TimedOut {
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }

    /// Blocks the current thread until the outcome arrives.
    ///
    /// # Errors
    ///
    /// `WaitError::Abandoned` when the registration was dropped.
    ///
    /// # Panics
    ///
    /// Panics if called from within an asynchronous execution context.
    pub fn wait_blocking(self) -> Result<Outcome, WaitError> {
        self.rx.blocking_recv().map_err(|_| WaitError::Abandoned)
    }
}

impl Future for PendingCompletion {
    type Output = Result<Outcome, WaitError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        Pin::new(&mut this.rx)
            .poll(cx)
            .map(|res| res.map_err(|_| WaitError::Abandoned))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use optube_core::{result_map, Operation, RemoteError};

    use super::*;

    fn topic() -> Topic {
        Topic::new(Operation::ClientOpen, RequestId(1))
    }

    #[test]
    fn delivers_result_to_callback() {
        let seen = Arc::new(parking_lot::Mutex::new(None));
        let sink = Arc::clone(&seen);
        let listener = CompletionListener::new(
            topic(),
            callback(move |outcome| {
                *sink.lock() = Some(outcome);
            }),
        );

        let event = CompletionEvent {
            topic: topic(),
            error: None,
            result: Some(result_map([("ok", true)])),
        };
        assert!(listener.on_event(event));
        assert_eq!(
            seen.lock().take(),
            Some(Ok(Some(result_map([("ok", true)]))))
        );
    }

    #[test]
    fn delivers_remote_error() {
        let seen = Arc::new(parking_lot::Mutex::new(None));
        let sink = Arc::clone(&seen);
        let listener = CompletionListener::new(
            topic(),
            callback(move |outcome| {
                *sink.lock() = Some(outcome);
            }),
        );
        let event = CompletionEvent {
            topic: topic(),
            error: Some(RemoteError::new("kicked")),
            result: None,
        };
        listener.on_event(event);
        assert_eq!(seen.lock().take(), Some(Err(RemoteError::new("kicked"))));
    }

    #[test]
    fn panicking_callback_is_contained() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let listener = CompletionListener::new(
            topic(),
            callback(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                panic!("boom");
            }),
        );
        assert!(!listener.on_event(CompletionEvent::ack(topic())));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn pending_completion_resolves_from_callback() {
        let (cb, rx) = PendingCompletion::channel();
        let pending = PendingCompletion::new(RequestId(5), rx);
        assert_eq!(pending.request_id(), RequestId(5));

        cb(Ok(None));
        assert_eq!(pending.await, Ok(Ok(None)));
    }

    #[tokio::test]
    async fn dropped_callback_abandons_waiter() {
        let (cb, rx) = PendingCompletion::channel();
        drop(cb);
        let pending = PendingCompletion::new(RequestId(1), rx);
        assert_eq!(pending.await, Err(WaitError::Abandoned));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_timeout_expires() {
        let (_cb, rx) = PendingCompletion::channel();
        let pending = PendingCompletion::new(RequestId(1), rx);
        let res = pending.wait_timeout(Duration::from_millis(50)).await;
        assert_eq!(res, Err(WaitError::TimedOut { timeout_ms: 50 }));
    }

    #[test]
    fn wait_blocking_receives_from_other_thread() {
        let (cb, rx) = PendingCompletion::channel();
        let pending = PendingCompletion::new(RequestId(1), rx);
        let handle = std::thread::spawn(move || cb(Ok(None)));
        assert_eq!(pending.wait_blocking(), Ok(Ok(None)));
        handle.join().unwrap();
    }
}
