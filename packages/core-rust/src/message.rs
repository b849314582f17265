//! Minimal message shapes carried inside command envelopes.
//!
//! The full conversation/message object model lives outside this crate; the
//! dispatcher only needs enough of a message to address it and ship it to
//! the worker.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A chat message as seen by the dispatch layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImMessage {
    /// Server-assigned id. `None` until the message has been sent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    /// Conversation the message belongs to.
    pub conversation_id: String,
    /// Client id of the sender.
    pub from: String,
    /// Opaque content (usually serialized JSON of a typed message).
    pub content: String,
    /// Server timestamp in milliseconds, once known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl ImMessage {
    /// True when the message carries the server-assigned identity needed to
    /// update or recall it.
    #[must_use]
    pub fn is_addressable(&self) -> bool {
        self.message_id.as_deref().is_some_and(|id| !id.is_empty())
            && self.timestamp.is_some()
    }
}

/// Delivery priority hint for transient conversations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessagePriority {
    High,
    Normal,
    Low,
}

/// Per-send options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageOption {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<MessagePriority>,
    /// Request a delivery receipt.
    #[serde(default)]
    pub receipt: bool,
    /// Deliver only to currently online members; never stored offline.
    #[serde(default)]
    pub transient: bool,
    /// Keep only the latest such message per conversation.
    #[serde(default)]
    pub will: bool,
    /// Custom push payload for offline members.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_data: Option<BTreeMap<String, String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsent_message_is_not_addressable() {
        let msg = ImMessage {
            message_id: None,
            conversation_id: "c1".into(),
            from: "u1".into(),
            content: "hi".into(),
            timestamp: None,
        };
        assert!(!msg.is_addressable());

        let sent = ImMessage {
            message_id: Some("m1".into()),
            timestamp: Some(1_700_000_000_000),
            ..msg
        };
        assert!(sent.is_addressable());
    }

    #[test]
    fn option_defaults_when_fields_absent() {
        let opt: MessageOption = serde_json::from_str("{}").unwrap();
        assert_eq!(opt, MessageOption::default());
    }
}
