use optube_core::{AllocatorExhausted, EnvelopeError, Operation, Topic};

/// The worker could not accept an envelope. Raised synchronously by
/// [`Worker::submit`](super::worker::Worker::submit); the request is dropped
/// and no callback will ever fire for it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandoffError {
    #[error("worker is not running")]
    Stopped,
    #[error("worker queue is full (capacity {capacity})")]
    Saturated { capacity: usize },
    #[error("worker rejected envelope: {0}")]
    Rejected(String),
}

/// Errors from the completion bus.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BusError {
    #[error("completion topic {0} already has a listener")]
    TopicInUse(Topic),
}

/// Errors from the request cache.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    #[error("request {request_id} for client {client_id} is already cached")]
    KeyInUse { client_id: String, request_id: u64 },
}

/// Why a dispatch was not accepted.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("dispatch context has been shut down")]
    ShutDown,
    #[error(transparent)]
    Exhausted(#[from] AllocatorExhausted),
    #[error("malformed payload: {0}")]
    Malformed(#[from] EnvelopeError),
    #[error(transparent)]
    Bus(#[from] BusError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("hand-off failed: {0}")]
    Handoff(#[from] HandoffError),
    #[error("{0:?} is not supported here")]
    Unsupported(Operation),
    #[error("no in-process session is attached")]
    NoSession,
}

/// Why waiting on a pending completion ended without an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum WaitError {
    /// The registration was dropped without firing (context shut down).
    #[error("completion registration was dropped before it fired")]
    Abandoned,
    #[error("no completion within {timeout_ms}ms")]
    TimedOut { timeout_ms: u64 },
}
