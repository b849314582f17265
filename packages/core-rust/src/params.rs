//! Typed parameters for each operation family.
//!
//! `OperationParams` is the schema side of the catalog: every operation
//! accepts exactly one parameter shape, checked by [`OperationParams::check`]
//! before an envelope is ever built.

use serde::Serialize;
use serde_json::{Map, Value as JsonValue};

use crate::error::EnvelopeError;
use crate::message::{ImMessage, MessageOption};
use crate::operation::Operation;

/// Parameters for opening a client session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenParams {
    /// Device tag; a second login with the same tag kicks the first.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_session_token: Option<String>,
    /// Re-open after a dropped connection rather than a fresh login.
    pub reconnect: bool,
}

/// Parameters for creating a conversation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConversationParams {
    pub members: Vec<String>,
    /// Custom attributes; omitted from the payload when empty.
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub attributes: Map<String, JsonValue>,
    pub is_unique: bool,
    pub is_transient: bool,
    pub is_temporary: bool,
    /// Lifetime in seconds; only sent for temporary conversations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temporary_ttl: Option<u32>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OnlineClientsPayload<'a> {
    online_session_peer_ids: &'a [String],
}

/// Parameter shape for one dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationParams {
    /// No parameters (status, close, token refresh).
    None,
    Open(OpenParams),
    OnlineClients { clients: Vec<String> },
    CreateConversation(CreateConversationParams),
    /// Conversation query; `query` must be a JSON object.
    Query { query: String },
    /// Pre-serialized JSON object for member and message-query operations.
    Raw { params: String },
    Send {
        message: ImMessage,
        option: Option<MessageOption>,
    },
    Update { old: ImMessage, new: ImMessage },
    Recall { message: ImMessage },
    Read {
        last_message: Option<Map<String, JsonValue>>,
    },
}

impl OperationParams {
    /// Short name of the variant, used in error messages.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Open(_) => "open",
            Self::OnlineClients { .. } => "online-clients",
            Self::CreateConversation(_) => "create-conversation",
            Self::Query { .. } => "query",
            Self::Raw { .. } => "raw",
            Self::Send { .. } => "send",
            Self::Update { .. } => "update",
            Self::Recall { .. } => "recall",
            Self::Read { .. } => "read",
        }
    }

    /// Validates that these params are the shape `operation` expects and that
    /// their content is well formed.
    ///
    /// # Errors
    ///
    /// Returns `EnvelopeError` describing the first violation found.
    pub fn check(&self, operation: Operation) -> Result<(), EnvelopeError> {
        let expected = expected_kind(operation);
        if self.kind() != expected {
            return Err(EnvelopeError::ParamsMismatch {
                operation,
                expected,
                found: self.kind(),
            });
        }
        match self {
            Self::OnlineClients { clients } if clients.is_empty() => {
                Err(EnvelopeError::EmptyField {
                    operation,
                    field: "clients",
                })
            }
            Self::Query { query } => require_json_object(operation, query).map(|_| ()),
            Self::Raw { params } => require_json_object(operation, params).map(|_| ()),
            Self::Update { old, new } => {
                if !old.is_addressable() {
                    return Err(EnvelopeError::NotAddressable { operation });
                }
                if old.conversation_id != new.conversation_id {
                    return Err(EnvelopeError::ConversationMismatch {
                        expected: old.conversation_id.clone(),
                        found: new.conversation_id.clone(),
                    });
                }
                Ok(())
            }
            Self::Recall { message } if !message.is_addressable() => {
                Err(EnvelopeError::NotAddressable { operation })
            }
            _ => Ok(()),
        }
    }

    /// Conversation id implied by a carried message, if any.
    #[must_use]
    pub fn implied_conversation(&self) -> Option<&str> {
        match self {
            Self::Send { message, .. } | Self::Recall { message } => {
                Some(message.conversation_id.as_str())
            }
            Self::Update { old, .. } => Some(old.conversation_id.as_str()),
            _ => None,
        }
    }

    /// Serializes parameter-style variants to the opaque string the worker
    /// receives. Message-carrying variants and `None` return `Ok(None)`.
    pub(crate) fn to_param_string(&self) -> Result<Option<String>, serde_json::Error> {
        match self {
            Self::None | Self::Send { .. } | Self::Update { .. } | Self::Recall { .. } => Ok(None),
            Self::Open(p) => serde_json::to_string(p).map(Some),
            Self::OnlineClients { clients } => serde_json::to_string(&OnlineClientsPayload {
                online_session_peer_ids: clients,
            })
            .map(Some),
            Self::CreateConversation(p) => {
                let mut p = p.clone();
                if !p.is_temporary {
                    p.temporary_ttl = None;
                }
                serde_json::to_string(&p).map(Some)
            }
            Self::Query { query } => Ok(Some(query.clone())),
            Self::Raw { params } => Ok(Some(params.clone())),
            Self::Read { last_message } => last_message
                .as_ref()
                .map(serde_json::to_string)
                .transpose(),
        }
    }
}

const fn expected_kind(operation: Operation) -> &'static str {
    match operation {
        Operation::ClientOpen => "open",
        Operation::ClientStatus | Operation::ClientDisconnect | Operation::ClientRefreshToken => {
            "none"
        }
        Operation::ClientOnlineQuery => "online-clients",
        Operation::ConversationCreation => "create-conversation",
        Operation::ConversationQuery => "query",
        Operation::ConversationSendMessage => "send",
        Operation::ConversationUpdateMessage => "update",
        Operation::ConversationRecallMessage => "recall",
        Operation::ConversationRead => "read",
        Operation::ConversationUpdate
        | Operation::ConversationAddMembers
        | Operation::ConversationRemoveMembers
        | Operation::ConversationMute
        | Operation::ConversationUnmute
        | Operation::ConversationMemberCount
        | Operation::ConversationBlockMembers
        | Operation::ConversationUnblockMembers
        | Operation::ConversationUpdateMemberRole
        | Operation::ConversationMessageQuery
        | Operation::ConversationFetchReceiptTimestamps => "raw",
    }
}

/// Parses `text` and requires a JSON object at the top level.
///
/// # Errors
///
/// Returns `EnvelopeError::InvalidJson` when parsing fails, and
/// `EnvelopeError::NotAnObject` for any other JSON value.
pub fn require_json_object(
    operation: Operation,
    text: &str,
) -> Result<Map<String, JsonValue>, EnvelopeError> {
    match serde_json::from_str::<JsonValue>(text) {
        Ok(JsonValue::Object(map)) => Ok(map),
        Ok(_) => Err(EnvelopeError::NotAnObject { operation }),
        Err(source) => Err(EnvelopeError::InvalidJson { operation, source }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sent_message(conv: &str) -> ImMessage {
        ImMessage {
            message_id: Some("m1".into()),
            conversation_id: conv.into(),
            from: "u1".into(),
            content: "hello".into(),
            timestamp: Some(1_700_000_000_000),
        }
    }

    #[test]
    fn every_operation_has_an_accepted_shape() {
        for op in Operation::ALL {
            let kind = expected_kind(op);
            assert!(!kind.is_empty(), "{op:?}");
        }
    }

    #[test]
    fn wrong_shape_is_rejected() {
        let err = OperationParams::None
            .check(Operation::ClientOpen)
            .unwrap_err();
        assert!(matches!(
            err,
            EnvelopeError::ParamsMismatch {
                operation: Operation::ClientOpen,
                expected: "open",
                found: "none",
            }
        ));
    }

    #[test]
    fn query_must_be_json_object() {
        let ok = OperationParams::Query {
            query: r#"{"where":{"m":"u1"}}"#.into(),
        };
        assert!(ok.check(Operation::ConversationQuery).is_ok());

        let array = OperationParams::Query { query: "[1]".into() };
        assert!(matches!(
            array.check(Operation::ConversationQuery),
            Err(EnvelopeError::NotAnObject { .. })
        ));

        let broken = OperationParams::Query { query: "{".into() };
        assert!(matches!(
            broken.check(Operation::ConversationQuery),
            Err(EnvelopeError::InvalidJson { .. })
        ));
    }

    #[test]
    fn empty_online_query_is_rejected() {
        let params = OperationParams::OnlineClients { clients: vec![] };
        assert!(matches!(
            params.check(Operation::ClientOnlineQuery),
            Err(EnvelopeError::EmptyField { field: "clients", .. })
        ));
    }

    #[test]
    fn update_requires_sent_message_in_same_conversation() {
        let mut unsent = sent_message("c1");
        unsent.message_id = None;
        let params = OperationParams::Update {
            old: unsent,
            new: sent_message("c1"),
        };
        assert!(matches!(
            params.check(Operation::ConversationUpdateMessage),
            Err(EnvelopeError::NotAddressable { .. })
        ));

        let moved = OperationParams::Update {
            old: sent_message("c1"),
            new: sent_message("c2"),
        };
        assert!(matches!(
            moved.check(Operation::ConversationUpdateMessage),
            Err(EnvelopeError::ConversationMismatch { .. })
        ));
    }

    #[test]
    fn temporary_ttl_only_sent_for_temporary_conversations() {
        let params = OperationParams::CreateConversation(CreateConversationParams {
            members: vec!["u2".into()],
            temporary_ttl: Some(3600),
            ..CreateConversationParams::default()
        });
        let text = params.to_param_string().unwrap().unwrap();
        assert!(!text.contains("temporaryTtl"));
        assert!(!text.contains("attributes"));

        let params = OperationParams::CreateConversation(CreateConversationParams {
            members: vec!["u2".into()],
            is_temporary: true,
            temporary_ttl: Some(3600),
            ..CreateConversationParams::default()
        });
        let text = params.to_param_string().unwrap().unwrap();
        assert!(text.contains(r#""temporaryTtl":3600"#));
    }

    #[test]
    fn open_params_serialize_camel_case() {
        let params = OperationParams::Open(OpenParams {
            tag: Some("mobile".into()),
            user_session_token: None,
            reconnect: true,
        });
        assert_eq!(
            params.to_param_string().unwrap().as_deref(),
            Some(r#"{"tag":"mobile","reconnect":true}"#)
        );
    }
}
