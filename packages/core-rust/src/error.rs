use crate::operation::Operation;

/// Envelope construction failures (malformed payloads). Raised before any
/// hand-off, so nothing is registered for a request that fails here.
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("client id must not be empty")]
    EmptyClientId,
    #[error("{operation:?} expects {expected} params, got {found}")]
    ParamsMismatch {
        operation: Operation,
        expected: &'static str,
        found: &'static str,
    },
    #[error("{operation:?} requires a conversation id")]
    MissingConversation { operation: Operation },
    #[error("conversation mismatch: envelope targets {expected}, message belongs to {found}")]
    ConversationMismatch { expected: String, found: String },
    #[error("{operation:?}: field `{field}` must not be empty")]
    EmptyField {
        operation: Operation,
        field: &'static str,
    },
    #[error("{operation:?}: message has not been sent yet (no id or timestamp)")]
    NotAddressable { operation: Operation },
    #[error("{operation:?}: params are not valid JSON: {source}")]
    InvalidJson {
        operation: Operation,
        #[source]
        source: serde_json::Error,
    },
    #[error("{operation:?}: params must be a JSON object")]
    NotAnObject { operation: Operation },
    #[error("failed to serialize params: {0}")]
    Serialize(#[from] serde_json::Error),
}
