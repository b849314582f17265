//! `optube` core: request ids, the operation catalog, typed completion topics,
//! operation params, command envelopes, and completion events.
//!
//! Everything here is plain data with no runtime; the dispatcher, completion
//! bus, and request cache live in `optube-client`.

pub mod completion;
pub mod envelope;
pub mod error;
pub mod message;
pub mod operation;
pub mod params;
pub mod request_id;
pub mod topic;
pub mod types;

pub use completion::{result_keys, Completion, CompletionEvent, Outcome, RemoteError};
pub use envelope::{CommandEnvelope, DispatchRequest, Payload};
pub use error::EnvelopeError;
pub use message::{ImMessage, MessageOption, MessagePriority};
pub use operation::{Operation, UnknownOperationCode};
pub use params::{CreateConversationParams, OpenParams, OperationParams};
pub use request_id::{AllocatorExhausted, RequestId, RequestIdAllocator};
pub use topic::{ParseTopicError, Topic};
pub use types::{result_map, Primitive, ResultMap};
