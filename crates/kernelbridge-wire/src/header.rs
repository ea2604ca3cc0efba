//! Message headers and correlation identifiers.

use std::fmt::{self, Display};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Messaging protocol version spoken by the bridge.
pub const PROTOCOL_VERSION: &str = "5.3";

/// Username stamped on outgoing headers.
const USERNAME: &str = "kernelbridge";

// ============================================================================
// Correlation identifiers
// ============================================================================

/// Correlation identifier linking a request to the replies and broadcasts it
/// causes.
///
/// Rendered as `{session}_{counter}`. The kernel echoes it back in the
/// `parent_header.msg_id` of every message produced on behalf of the request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Wraps a raw message id, e.g. one read back from a parent header.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Allocates [`RequestId`]s for one session.
///
/// The counter only moves forward, so an identifier is never handed out twice
/// within the lifetime of a session.
#[derive(Debug)]
pub struct RequestCounter {
    session: String,
    next: AtomicU64,
}

impl RequestCounter {
    /// Creates a counter for a fresh random session id.
    pub fn new() -> Self {
        Self::with_session(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Creates a counter for an explicit session id.
    pub fn with_session(session: impl Into<String>) -> Self {
        Self {
            session: session.into(),
            next: AtomicU64::new(0),
        }
    }

    /// The session id stamped on every header built from this counter.
    pub fn session(&self) -> &str {
        &self.session
    }

    /// Returns the next identifier.
    pub fn next_id(&self) -> RequestId {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        RequestId(format!("{}_{n}", self.session))
    }

    /// Number of identifiers allocated so far.
    pub fn issued(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }
}

impl Default for RequestCounter {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Header
// ============================================================================

/// Jupyter message header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub msg_id: String,
    pub session: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub date: String,
    pub msg_type: String,
    #[serde(default)]
    pub version: String,
}

impl Header {
    /// Builds a header for an outgoing message.
    pub fn new(msg_type: impl Into<String>, id: &RequestId, session: &str) -> Self {
        Self {
            msg_id: id.as_str().to_string(),
            session: session.to_string(),
            username: USERNAME.to_string(),
            date: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            msg_type: msg_type.into(),
            version: PROTOCOL_VERSION.to_string(),
        }
    }

    /// The correlation identifier carried by this header.
    pub fn request_id(&self) -> RequestId {
        RequestId::new(self.msg_id.clone())
    }

    pub fn kind(&self) -> MsgKind {
        MsgKind::parse(&self.msg_type)
    }
}

/// Message kinds the bridge knows how to handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsgKind {
    ExecuteRequest,
    ExecuteReply,
    ExecuteInput,
    ExecuteResult,
    DisplayData,
    KernelInfoRequest,
    KernelInfoReply,
    ShutdownRequest,
    ShutdownReply,
    Stream,
    Error,
    Status,
    /// Anything else; carried through but ignored by the coordinator.
    Other,
}

impl MsgKind {
    pub fn parse(msg_type: &str) -> Self {
        match msg_type {
            "execute_request" => Self::ExecuteRequest,
            "execute_reply" => Self::ExecuteReply,
            "execute_input" => Self::ExecuteInput,
            "execute_result" => Self::ExecuteResult,
            "display_data" => Self::DisplayData,
            "kernel_info_request" => Self::KernelInfoRequest,
            "kernel_info_reply" => Self::KernelInfoReply,
            "shutdown_request" => Self::ShutdownRequest,
            "shutdown_reply" => Self::ShutdownReply,
            "stream" => Self::Stream,
            "error" => Self::Error,
            "status" => Self::Status,
            _ => Self::Other,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ExecuteRequest => "execute_request",
            Self::ExecuteReply => "execute_reply",
            Self::ExecuteInput => "execute_input",
            Self::ExecuteResult => "execute_result",
            Self::DisplayData => "display_data",
            Self::KernelInfoRequest => "kernel_info_request",
            Self::KernelInfoReply => "kernel_info_reply",
            Self::ShutdownRequest => "shutdown_request",
            Self::ShutdownReply => "shutdown_reply",
            Self::Stream => "stream",
            Self::Error => "error",
            Self::Status => "status",
            Self::Other => "other",
        }
    }
}

impl Display for MsgKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_request_ids_are_monotonic_and_unique() {
        let counter = RequestCounter::with_session("abc");
        let ids: Vec<RequestId> = (0..5).map(|_| counter.next_id()).collect();

        assert_eq!(ids[0].as_str(), "abc_0");
        assert_eq!(ids[4].as_str(), "abc_4");
        assert_eq!(counter.issued(), 5);

        let unique: std::collections::HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());
    }

    #[test]
    fn test_fresh_counters_use_distinct_sessions() {
        let a = RequestCounter::new();
        let b = RequestCounter::new();
        assert_ne!(a.session(), b.session());
    }

    #[test]
    fn test_header_stamps_protocol_fields() {
        let counter = RequestCounter::with_session("s1");
        let id = counter.next_id();
        let header = Header::new("execute_request", &id, counter.session());

        assert_eq!(header.msg_id, "s1_0");
        assert_eq!(header.session, "s1");
        assert_eq!(header.version, PROTOCOL_VERSION);
        assert_eq!(header.kind(), MsgKind::ExecuteRequest);
        assert!(header.date.ends_with('Z'));
        assert_eq!(header.request_id(), id);
    }

    #[test]
    fn test_header_tolerates_missing_optional_fields() {
        let raw = r#"{"msg_id":"m","session":"s","msg_type":"status"}"#;
        let header: Header = serde_json::from_str(raw).unwrap();
        assert_eq!(header.kind(), MsgKind::Status);
        assert!(header.username.is_empty());
    }

    #[test_case("stream", MsgKind::Stream)]
    #[test_case("error", MsgKind::Error)]
    #[test_case("execute_reply", MsgKind::ExecuteReply)]
    #[test_case("comm_open", MsgKind::Other)]
    fn test_msg_kind_parse(raw: &str, expected: MsgKind) {
        assert_eq!(MsgKind::parse(raw), expected);
    }
}
