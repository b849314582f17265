//! Completion notifier: the single entry point workers report through.
//!
//! Fast-path operations are resolved against the request cache first. Every
//! other completion, and a fast-path completion with no cached callback, is
//! published on the bus.

use std::sync::Arc;

use optube_core::{Completion, Operation, RemoteError, RequestId, ResultMap};
use tracing::debug;

use super::bus::CompletionBus;
use super::cache::RequestCache;
use super::listener::invoke_guarded;

/// Where a completion ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Resolved a cached fast-path callback.
    Cache,
    /// Delivered to a bus listener.
    Bus,
    /// Nobody was waiting.
    Dropped,
}

/// Cheap-to-clone handle routing completions to the cache or the bus.
#[derive(Debug, Clone)]
pub struct CompletionNotifier {
    bus: Arc<CompletionBus>,
    cache: Arc<RequestCache>,
}

impl CompletionNotifier {
    #[must_use]
    pub fn new(bus: Arc<CompletionBus>, cache: Arc<RequestCache>) -> Self {
        Self { bus, cache }
    }

    /// Routes one finished request to whoever is waiting for it.
    pub fn notify(&self, completion: Completion) -> Delivery {
        if completion.operation.is_fast_path() {
            // Fast-path callbacks are parked without a conversation id.
            if let Some(cb) = self
                .cache
                .take(&completion.client_id, None, completion.request_id)
            {
                let label = completion.topic();
                invoke_guarded(label, cb, completion.into_event().into_outcome());
                return Delivery::Cache;
            }
            debug!(
                client_id = %completion.client_id,
                request_id = %completion.request_id,
                "fast-path completion not cached, publishing"
            );
        }

        if self.bus.publish(completion.into_event()) {
            Delivery::Bus
        } else {
            Delivery::Dropped
        }
    }

    /// Resolves a cached fast-path callback without ever touching the bus.
    /// Returns whether a cached callback was found.
    pub fn notify_cached(
        &self,
        client_id: &str,
        conversation_id: Option<&str>,
        request_id: RequestId,
        result: Option<ResultMap>,
        error: Option<RemoteError>,
    ) -> bool {
        let Some(cb) = self.cache.take(client_id, conversation_id, request_id) else {
            debug!(%client_id, %request_id, "no cached callback");
            return false;
        };
        let outcome = match error {
            Some(err) => Err(err),
            None => Ok(result),
        };
        invoke_guarded(request_id, cb, outcome);
        true
    }

    /// Reports a completion that carries no result data.
    pub fn on_operation_completed(
        &self,
        client_id: &str,
        conversation_id: Option<&str>,
        request_id: RequestId,
        operation: Operation,
        error: Option<RemoteError>,
    ) -> Delivery {
        self.on_operation_completed_ex(client_id, conversation_id, request_id, operation, None, error)
    }

    /// Reports a completion with an optional result map.
    pub fn on_operation_completed_ex(
        &self,
        client_id: &str,
        conversation_id: Option<&str>,
        request_id: RequestId,
        operation: Operation,
        result: Option<ResultMap>,
        error: Option<RemoteError>,
    ) -> Delivery {
        self.notify(Completion {
            client_id: client_id.to_string(),
            conversation_id: conversation_id.map(str::to_string),
            request_id,
            operation,
            result,
            error,
        })
    }

    #[must_use]
    pub fn bus(&self) -> &Arc<CompletionBus> {
        &self.bus
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<RequestCache> {
        &self.cache
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
