//! Command envelopes: the transportable form of one request.
//!
//! A [`DispatchRequest`] describes what the caller wants; combining it with a
//! freshly allocated [`RequestId`] yields a validated [`CommandEnvelope`]
//! that is handed to the worker and owned by it from then on.

use serde::{Deserialize, Serialize};

use crate::error::EnvelopeError;
use crate::message::{ImMessage, MessageOption};
use crate::operation::Operation;
use crate::params::OperationParams;
use crate::request_id::RequestId;
use crate::topic::Topic;

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/// Body of an envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Payload {
    /// Serialized parameters (a JSON object as text).
    Params { data: String },
    /// A single message, for send and recall.
    Message {
        message: ImMessage,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        option: Option<MessageOption>,
    },
    /// Old/new pair, for update-style operations.
    MessagePair { old: ImMessage, new: ImMessage },
}

// ---------------------------------------------------------------------------
// CommandEnvelope
// ---------------------------------------------------------------------------

/// The message handed to the worker for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandEnvelope {
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conv_type: Option<i32>,
    /// Serialized as the operation's numeric code.
    pub operation: Operation,
    pub request_id: RequestId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Payload>,
}

impl CommandEnvelope {
    /// The topic completion for this envelope will be published on.
    #[must_use]
    pub const fn topic(&self) -> Topic {
        Topic::new(self.operation, self.request_id)
    }
}

// ---------------------------------------------------------------------------
// DispatchRequest
// ---------------------------------------------------------------------------

/// Everything about a request except its id.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchRequest {
    pub client_id: String,
    pub conversation_id: Option<String>,
    pub conv_type: Option<i32>,
    pub operation: Operation,
    pub params: OperationParams,
}

impl DispatchRequest {
    /// Starts a request for `operation` on behalf of `client_id` with no
    /// conversation and no params.
    #[must_use]
    pub fn new(client_id: impl Into<String>, operation: Operation) -> Self {
        Self {
            client_id: client_id.into(),
            conversation_id: None,
            conv_type: None,
            operation,
            params: OperationParams::None,
        }
    }

    #[must_use]
    pub fn conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    #[must_use]
    pub const fn conv_type(mut self, conv_type: i32) -> Self {
        self.conv_type = Some(conv_type);
        self
    }

    #[must_use]
    pub fn params(mut self, params: OperationParams) -> Self {
        self.params = params;
        self
    }

    /// Validates the request and assembles the envelope for `request_id`.
    ///
    /// Message-carrying operations take their conversation from the message
    /// when none was given explicitly.
    ///
    /// # Errors
    ///
    /// Returns `EnvelopeError` when the client id is empty, the params do not
    /// fit the operation, a conversation-scoped operation has no
    /// conversation, or the params fail to serialize.
    pub fn into_envelope(self, request_id: RequestId) -> Result<CommandEnvelope, EnvelopeError> {
        let Self {
            client_id,
            conversation_id,
            conv_type,
            operation,
            params,
        } = self;

        if client_id.is_empty() {
            return Err(EnvelopeError::EmptyClientId);
        }
        params.check(operation)?;

        let conversation_id = match (conversation_id, params.implied_conversation()) {
            (Some(explicit), Some(implied)) if explicit != implied => {
                return Err(EnvelopeError::ConversationMismatch {
                    expected: explicit,
                    found: implied.to_string(),
                });
            }
            (Some(explicit), _) => Some(explicit),
            (None, implied) => implied.map(str::to_string),
        };
        if requires_conversation(operation) && conversation_id.is_none() {
            return Err(EnvelopeError::MissingConversation { operation });
        }

        let payload = match params.to_param_string()? {
            Some(data) => Some(Payload::Params { data }),
            None => match params {
                OperationParams::Send { message, option } => {
                    Some(Payload::Message { message, option })
                }
                OperationParams::Recall { message } => Some(Payload::Message {
                    message,
                    option: None,
                }),
                OperationParams::Update { old, new } => Some(Payload::MessagePair { old, new }),
                _ => None,
            },
        };

        Ok(CommandEnvelope {
            client_id,
            conversation_id,
            conv_type,
            operation,
            request_id,
            payload,
        })
    }
}

const fn requires_conversation(operation: Operation) -> bool {
    operation.is_member_operation()
        || operation.is_message_query()
        || matches!(
            operation,
            Operation::ConversationSendMessage
                | Operation::ConversationUpdateMessage
                | Operation::ConversationRecallMessage
                | Operation::ConversationRead
        )
}
