//! Completion events: what a worker reports when a request finishes.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::operation::Operation;
use crate::request_id::RequestId;
use crate::topic::Topic;
use crate::types::ResultMap;

/// Result-map keys the worker uses for operations whose result is not
/// opaque to the dispatcher.
pub mod result_keys {
    /// Integer client status code, reported by `ClientStatus`.
    pub const CLIENT_STATUS: &str = "callbackClientStatus";
    /// JSON-encoded string array, reported by `ClientOnlineQuery`.
    pub const ONLINE_CLIENTS: &str = "callbackOnlineClients";
}

/// Error reported by the worker (or an in-process session) after it accepted
/// a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteError {
    /// Service-defined error code, when the remote side supplied one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i32>,
    pub message: String,
}

impl RemoteError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    #[must_use]
    pub const fn with_code(mut self, code: i32) -> Self {
        self.code = Some(code);
        self
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "remote operation failed ({code}): {}", self.message),
            None => write!(f, "remote operation failed: {}", self.message),
        }
    }
}

impl std::error::Error for RemoteError {}

/// What a callback receives: the result map (absent for a pure ack) or the
/// remote error. A result sent alongside an error is dropped.
pub type Outcome = Result<Option<ResultMap>, RemoteError>;

/// Event published on the completion bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionEvent {
    pub topic: Topic,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RemoteError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ResultMap>,
}

impl CompletionEvent {
    /// Pure acknowledgment: neither error nor result.
    #[must_use]
    pub const fn ack(topic: Topic) -> Self {
        Self {
            topic,
            error: None,
            result: None,
        }
    }

    #[must_use]
    pub fn into_outcome(self) -> Outcome {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.result),
        }
    }
}

/// A finished request as reported to the completion notifier.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub client_id: String,
    pub conversation_id: Option<String>,
    pub request_id: RequestId,
    pub operation: Operation,
    pub result: Option<ResultMap>,
    pub error: Option<RemoteError>,
}

impl Completion {
    /// Successful completion with no result data.
    #[must_use]
    pub fn ack(client_id: impl Into<String>, operation: Operation, request_id: RequestId) -> Self {
        Self {
            client_id: client_id.into(),
            conversation_id: None,
            request_id,
            operation,
            result: None,
            error: None,
        }
    }

    #[must_use]
    pub fn conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    #[must_use]
    pub fn with_result(mut self, result: ResultMap) -> Self {
        self.result = Some(result);
        self
    }

    #[must_use]
    pub fn with_error(mut self, error: RemoteError) -> Self {
        self.error = Some(error);
        self
    }

    #[must_use]
    pub const fn topic(&self) -> Topic {
        Topic::new(self.operation, self.request_id)
    }

    /// Converts into the bus event for this completion's topic.
    #[must_use]
    pub fn into_event(self) -> CompletionEvent {
        CompletionEvent {
            topic: self.topic(),
            error: self.error,
            result: self.result,
        }
    }
}
