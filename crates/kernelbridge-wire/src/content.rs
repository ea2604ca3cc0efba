//! Typed message content.
//!
//! Only the subset of the messaging protocol the bridge actually uses is
//! modelled. Unknown fields are ignored on decode.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Content that can be sent as the body of a message.
pub trait Content: Serialize {
    /// Value of `header.msg_type` for this content.
    const MSG_TYPE: &'static str;
}

// ============================================================================
// Shell
// ============================================================================

/// Body of an `execute_request`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub code: String,
    pub silent: bool,
    pub store_history: bool,
    #[serde(default)]
    pub user_expressions: Map<String, Value>,
    pub allow_stdin: bool,
    pub stop_on_error: bool,
}

impl ExecuteRequest {
    /// A non-interactive request: no stdin, history kept, stop on error.
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            silent: false,
            store_history: true,
            user_expressions: Map::new(),
            allow_stdin: false,
            stop_on_error: true,
        }
    }
}

impl Content for ExecuteRequest {
    const MSG_TYPE: &'static str = "execute_request";
}

/// Outcome reported in a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyStatus {
    Ok,
    Error,
    Aborted,
}

/// Body of an `execute_reply`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteReply {
    pub status: ReplyStatus,
    #[serde(default)]
    pub execution_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evalue: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub traceback: Vec<String>,
}

impl ExecuteReply {
    pub fn ok(execution_count: u64) -> Self {
        Self {
            status: ReplyStatus::Ok,
            execution_count: Some(execution_count),
            ename: None,
            evalue: None,
            traceback: Vec::new(),
        }
    }

    pub fn error(execution_count: u64, error: &ErrorContent) -> Self {
        Self {
            status: ReplyStatus::Error,
            execution_count: Some(execution_count),
            ename: Some(error.ename.clone()),
            evalue: Some(error.evalue.clone()),
            traceback: error.traceback.clone(),
        }
    }
}

impl Content for ExecuteReply {
    const MSG_TYPE: &'static str = "execute_reply";
}

/// Body of a `kernel_info_request` (always empty).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KernelInfoRequest {}

impl Content for KernelInfoRequest {
    const MSG_TYPE: &'static str = "kernel_info_request";
}

/// Language description inside a `kernel_info_reply`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LanguageInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub file_extension: String,
}

/// Body of a `kernel_info_reply`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KernelInfoReply {
    #[serde(default)]
    pub protocol_version: String,
    #[serde(default)]
    pub implementation: String,
    #[serde(default)]
    pub implementation_version: String,
    #[serde(default)]
    pub language_info: LanguageInfo,
    #[serde(default)]
    pub banner: String,
}

impl Content for KernelInfoReply {
    const MSG_TYPE: &'static str = "kernel_info_reply";
}

// ============================================================================
// Control
// ============================================================================

/// Body of a `shutdown_request`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutdownRequest {
    pub restart: bool,
}

impl Content for ShutdownRequest {
    const MSG_TYPE: &'static str = "shutdown_request";
}

/// Body of a `shutdown_reply`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutdownReply {
    #[serde(default)]
    pub restart: bool,
}

impl Content for ShutdownReply {
    const MSG_TYPE: &'static str = "shutdown_reply";
}

// ============================================================================
// IOPub
// ============================================================================

/// Which output stream a `stream` message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamName {
    Stdout,
    Stderr,
}

/// Body of a `stream` broadcast: one chunk of process output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamContent {
    pub name: StreamName,
    pub text: String,
}

impl StreamContent {
    pub fn stdout(text: impl Into<String>) -> Self {
        Self {
            name: StreamName::Stdout,
            text: text.into(),
        }
    }

    pub fn stderr(text: impl Into<String>) -> Self {
        Self {
            name: StreamName::Stderr,
            text: text.into(),
        }
    }
}

impl Content for StreamContent {
    const MSG_TYPE: &'static str = "stream";
}

/// Body of an `error` broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorContent {
    #[serde(default)]
    pub ename: String,
    #[serde(default)]
    pub evalue: String,
    #[serde(default)]
    pub traceback: Vec<String>,
}

impl ErrorContent {
    /// Flattens the error into one diagnostic text block.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let head = format!("{} {}", self.ename.trim_end(), self.evalue)
            .trim()
            .to_string();
        if !head.is_empty() {
            out.push_str(&head);
            out.push('\n');
        }
        for line in &self.traceback {
            out.push_str(line);
            if !line.ends_with('\n') {
                out.push('\n');
            }
        }
        out
    }
}

impl Content for ErrorContent {
    const MSG_TYPE: &'static str = "error";
}

/// Kernel execution state carried by `status` broadcasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionState {
    Starting,
    Busy,
    Idle,
    #[serde(other)]
    Unknown,
}

/// Body of a `status` broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusContent {
    pub execution_state: ExecutionState,
}

impl StatusContent {
    pub fn busy() -> Self {
        Self {
            execution_state: ExecutionState::Busy,
        }
    }

    pub fn idle() -> Self {
        Self {
            execution_state: ExecutionState::Idle,
        }
    }
}

impl Content for StatusContent {
    const MSG_TYPE: &'static str = "status";
}

/// Body of an `execute_result` or `display_data` broadcast.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecuteResult {
    #[serde(default)]
    pub execution_count: Option<u64>,
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl ExecuteResult {
    pub fn text(execution_count: u64, text: impl Into<String>) -> Self {
        let mut data = Map::new();
        data.insert("text/plain".to_string(), Value::String(text.into()));
        Self {
            execution_count: Some(execution_count),
            data,
            metadata: Map::new(),
        }
    }

    /// The `text/plain` representation, if present.
    pub fn plain_text(&self) -> Option<&str> {
        self.data.get("text/plain").and_then(Value::as_str)
    }
}

impl Content for ExecuteResult {
    const MSG_TYPE: &'static str = "execute_result";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execute_request_defaults() {
        let req = ExecuteRequest::new("int x = 1;");
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["allow_stdin"], false);
        assert_eq!(json["stop_on_error"], true);
        assert_eq!(json["user_expressions"], serde_json::json!({}));
    }

    #[test]
    fn test_execute_reply_error_fields() {
        let raw = serde_json::json!({
            "status": "error",
            "execution_count": 3,
            "ename": "Error: ",
            "evalue": "Compilation error! boom",
            "traceback": []
        });
        let reply: ExecuteReply = serde_json::from_value(raw).unwrap();
        assert_eq!(reply.status, ReplyStatus::Error);
        assert_eq!(reply.evalue.as_deref(), Some("Compilation error! boom"));
    }

    #[test]
    fn test_unknown_execution_state() {
        let raw = serde_json::json!({"execution_state": "restarting"});
        let status: StatusContent = serde_json::from_value(raw).unwrap();
        assert_eq!(status.execution_state, ExecutionState::Unknown);
    }

    #[test]
    fn test_error_render_joins_head_and_traceback() {
        let err = ErrorContent {
            ename: "Standard Exception: ".to_string(),
            evalue: "AssertionError: 1 == 0".to_string(),
            traceback: vec!["frame 1".to_string(), "frame 2\n".to_string()],
        };
        assert_eq!(
            err.render(),
            "Standard Exception: AssertionError: 1 == 0\nframe 1\nframe 2\n"
        );
    }

    #[test]
    fn test_execute_result_plain_text() {
        let result = ExecuteResult::text(1, "42");
        assert_eq!(result.plain_text(), Some("42"));
        assert_eq!(ExecuteResult::default().plain_text(), None);
    }
}
