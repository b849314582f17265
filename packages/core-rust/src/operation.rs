//! The closed catalog of operations a dispatcher can issue.
//!
//! Every operation carries a stable numeric code (what crosses the worker
//! boundary) and a topic prefix (what the completion bus is keyed by when a
//! topic is rendered for logs). Codes are grouped by family:
//!
//! - `1xxxx`: client session lifecycle
//! - `2xxxx`: conversation management and membership
//! - `3xxxx`: message traffic

use std::fmt;

use serde::{Deserialize, Serialize};

/// One kind of request the core can dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum Operation {
    ClientOpen,
    ClientStatus,
    ClientDisconnect,
    ClientRefreshToken,
    ClientOnlineQuery,
    ConversationCreation,
    ConversationQuery,
    ConversationUpdate,
    ConversationAddMembers,
    ConversationRemoveMembers,
    ConversationMute,
    ConversationUnmute,
    ConversationMemberCount,
    ConversationBlockMembers,
    ConversationUnblockMembers,
    ConversationUpdateMemberRole,
    ConversationSendMessage,
    ConversationUpdateMessage,
    ConversationRecallMessage,
    ConversationMessageQuery,
    ConversationRead,
    ConversationFetchReceiptTimestamps,
}

impl Operation {
    /// Every catalog entry, in code order.
    pub const ALL: [Operation; 22] = [
        Self::ClientOpen,
        Self::ClientStatus,
        Self::ClientDisconnect,
        Self::ClientRefreshToken,
        Self::ClientOnlineQuery,
        Self::ConversationCreation,
        Self::ConversationQuery,
        Self::ConversationUpdate,
        Self::ConversationAddMembers,
        Self::ConversationRemoveMembers,
        Self::ConversationMute,
        Self::ConversationUnmute,
        Self::ConversationMemberCount,
        Self::ConversationBlockMembers,
        Self::ConversationUnblockMembers,
        Self::ConversationUpdateMemberRole,
        Self::ConversationSendMessage,
        Self::ConversationUpdateMessage,
        Self::ConversationRecallMessage,
        Self::ConversationMessageQuery,
        Self::ConversationRead,
        Self::ConversationFetchReceiptTimestamps,
    ];

    /// Stable numeric code carried in the command envelope.
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            Self::ClientOpen => 10_001,
            Self::ClientStatus => 10_002,
            Self::ClientDisconnect => 10_003,
            Self::ClientRefreshToken => 10_004,
            Self::ClientOnlineQuery => 10_005,
            Self::ConversationCreation => 20_001,
            Self::ConversationQuery => 20_002,
            Self::ConversationUpdate => 20_003,
            Self::ConversationAddMembers => 20_004,
            Self::ConversationRemoveMembers => 20_005,
            Self::ConversationMute => 20_006,
            Self::ConversationUnmute => 20_007,
            Self::ConversationMemberCount => 20_008,
            Self::ConversationBlockMembers => 20_009,
            Self::ConversationUnblockMembers => 20_010,
            Self::ConversationUpdateMemberRole => 20_011,
            Self::ConversationSendMessage => 30_001,
            Self::ConversationUpdateMessage => 30_002,
            Self::ConversationRecallMessage => 30_003,
            Self::ConversationMessageQuery => 30_004,
            Self::ConversationRead => 30_005,
            Self::ConversationFetchReceiptTimestamps => 30_006,
        }
    }

    /// Topic prefix; a rendered topic is this prefix followed by the request id.
    #[must_use]
    pub const fn topic_prefix(self) -> &'static str {
        match self {
            Self::ClientOpen => "OPEN#",
            Self::ClientStatus => "STATUS#",
            Self::ClientDisconnect => "CLOSE#",
            Self::ClientRefreshToken => "REFRESH_TOKEN#",
            Self::ClientOnlineQuery => "ONLINE_QUERY#",
            Self::ConversationCreation => "CONV_CREATE#",
            Self::ConversationQuery => "CONV_QUERY#",
            Self::ConversationUpdate => "CONV_UPDATE#",
            Self::ConversationAddMembers => "MEMBERS_ADD#",
            Self::ConversationRemoveMembers => "MEMBERS_REMOVE#",
            Self::ConversationMute => "CONV_MUTE#",
            Self::ConversationUnmute => "CONV_UNMUTE#",
            Self::ConversationMemberCount => "MEMBERS_COUNT#",
            Self::ConversationBlockMembers => "MEMBERS_BLOCK#",
            Self::ConversationUnblockMembers => "MEMBERS_UNBLOCK#",
            Self::ConversationUpdateMemberRole => "MEMBER_ROLE#",
            Self::ConversationSendMessage => "MSG_SEND#",
            Self::ConversationUpdateMessage => "MSG_UPDATE#",
            Self::ConversationRecallMessage => "MSG_RECALL#",
            Self::ConversationMessageQuery => "MSG_QUERY#",
            Self::ConversationRead => "CONV_READ#",
            Self::ConversationFetchReceiptTimestamps => "RECEIPT_TIMES#",
        }
    }

    /// Looks an operation up by its wire code.
    #[must_use]
    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.iter().copied().find(|op| op.code() == code)
    }

    /// Operations that may be satisfied in-process and resolved through the
    /// request cache instead of the completion bus.
    #[must_use]
    pub const fn is_fast_path(self) -> bool {
        matches!(self, Self::ConversationQuery)
    }

    /// Membership operations accepted by `process_members`.
    #[must_use]
    pub const fn is_member_operation(self) -> bool {
        matches!(
            self,
            Self::ConversationUpdate
                | Self::ConversationAddMembers
                | Self::ConversationRemoveMembers
                | Self::ConversationMute
                | Self::ConversationUnmute
                | Self::ConversationMemberCount
                | Self::ConversationBlockMembers
                | Self::ConversationUnblockMembers
                | Self::ConversationUpdateMemberRole
        )
    }

    /// Message-query style operations accepted by `query_messages`.
    #[must_use]
    pub const fn is_message_query(self) -> bool {
        matches!(
            self,
            Self::ConversationMessageQuery | Self::ConversationFetchReceiptTimestamps
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.topic_prefix().trim_end_matches('#'))
    }
}

/// Returned when a wire code does not name any catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unknown operation code: {0}")]
pub struct UnknownOperationCode(pub u32);

impl TryFrom<u32> for Operation {
    type Error = UnknownOperationCode;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        Self::from_code(code).ok_or(UnknownOperationCode(code))
    }
}

impl From<Operation> for u32 {
    fn from(op: Operation) -> Self {
        op.code()
    }
}
