//! In-process session seam used by fast-path operations.
//!
//! Some queries can be answered without going through the worker: the session
//! already holding the client's state runs them directly and reports back via
//! [`CompletionNotifier::notify_cached`](crate::dispatch::CompletionNotifier::notify_cached)
//! (or `notify`, which resolves fast-path operations against the cache first).

use optube_core::RequestId;
use serde_json::{Map, Value};

use crate::dispatch::HandoffError;

/// A live client session able to serve fast-path requests in-process.
pub trait LocalSession: Send + Sync {
    /// Starts a conversation query for `client_id`. The result is reported
    /// later, keyed by `(client_id, None, request_id)`; the notifier ignores
    /// any conversation id on a fast-path completion.
    ///
    /// # Errors
    ///
    /// Returns a `HandoffError` if the query could not be started; nothing
    /// will be reported for `request_id` then.
    fn query_conversations(
        &self,
        client_id: &str,
        query: Map<String, Value>,
        request_id: RequestId,
    ) -> Result<(), HandoffError>;
}
