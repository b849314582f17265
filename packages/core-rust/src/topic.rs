//! Typed completion topics.
//!
//! A topic identifies one in-flight request's completion. It is a structured
//! key rather than a concatenated string, so two different operations can
//! never collide on the same request id. The string form (`OPEN#1`) exists
//! only for logs and for the wire representation of completion events.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::operation::Operation;
use crate::request_id::RequestId;

/// Completion key for one dispatched request. Serialized in its rendered
/// string form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Topic {
    pub operation: Operation,
    pub request_id: RequestId,
}

impl Topic {
    #[must_use]
    pub const fn new(operation: Operation, request_id: RequestId) -> Self {
        Self {
            operation,
            request_id,
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.operation.topic_prefix(), self.request_id)
    }
}

/// Failure to parse a rendered topic string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed topic: {0:?}")]
pub struct ParseTopicError(pub String);

impl FromStr for Topic {
    type Err = ParseTopicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || ParseTopicError(s.to_string());
        let (prefix, id) = s.rsplit_once('#').ok_or_else(malformed)?;
        let id: u64 = id.parse().map_err(|_| malformed())?;
        let operation = Operation::ALL
            .iter()
            .copied()
            .find(|op| op.topic_prefix().strip_suffix('#') == Some(prefix))
            .ok_or_else(malformed)?;
        Ok(Self::new(operation, RequestId(id)))
    }
}

impl TryFrom<String> for Topic {
    type Error = ParseTopicError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Topic> for String {
    fn from(topic: Topic) -> Self {
        topic.to_string()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn renders_prefix_then_id() {
        let topic = Topic::new(Operation::ClientOpen, RequestId(1));
        assert_eq!(topic.to_string(), "OPEN#1");
    }

    #[test]
    fn same_id_different_operation_are_distinct_keys() {
        let a = Topic::new(Operation::ClientOpen, RequestId(7));
        let b = Topic::new(Operation::ClientStatus, RequestId(7));
        assert_ne!(a, b);
    }

    #[test]
    fn rejects_garbage() {
        assert!("OPEN".parse::<Topic>().is_err());
        assert!("OPEN#x".parse::<Topic>().is_err());
        assert!("NOPE#1".parse::<Topic>().is_err());
        assert!("#1".parse::<Topic>().is_err());
    }

    #[test]
    fn serializes_as_rendered_string() {
        let topic = Topic::new(Operation::ConversationQuery, RequestId(42));
        assert_eq!(serde_json::to_string(&topic).unwrap(), r#""CONV_QUERY#42""#);
    }

    proptest! {
        #[test]
        fn parse_inverts_display(idx in 0usize..Operation::ALL.len(), id in any::<u64>()) {
            let topic = Topic::new(Operation::ALL[idx], RequestId(id));
            prop_assert_eq!(topic.to_string().parse::<Topic>().unwrap(), topic);
        }
    }
}
