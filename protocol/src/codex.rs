//! Codex app-server wire shapes: the JSON-RPC notifications and
//! server-initiated requests the Codex bridge decodes, on top of the
//! generic envelope in `jsonrpc.rs`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::approval::ApprovalKind;
use crate::jsonrpc::RequestId;

/// A decoded `method` + `params` notification from the Codex app-server.
/// Unlike `ClientRequest`/`ServerRequest` these never carry an `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "camelCase")]
pub enum CodexNotification {
    #[serde(rename = "thread/started")]
    ThreadStarted { params: ThreadStartedParams },

    #[serde(rename = "turn/started")]
    TurnStarted { params: TurnStartedParams },

    #[serde(rename = "turn/completed")]
    TurnCompleted { params: TurnCompletedParams },

    #[serde(rename = "item/started")]
    ItemStarted { params: ItemParams },

    #[serde(rename = "item/completed")]
    ItemCompleted { params: ItemParams },

    #[serde(rename = "item/agentMessage/delta")]
    AgentMessageDelta { params: DeltaParams },

    #[serde(rename = "item/reasoning/summaryTextDelta")]
    ReasoningSummaryDelta { params: DeltaParams },

    #[serde(rename = "item/reasoning/textDelta")]
    ReasoningTextDelta { params: DeltaParams },

    Error { params: ErrorParams },

    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadStartedParams {
    pub thread_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnStartedParams {
    pub turn_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnCompletedParams {
    pub turn_id: String,
    #[serde(default)]
    pub turn_status: Option<String>,
    #[serde(default)]
    pub error: Option<TurnError>,
}

impl TurnCompletedParams {
    pub fn was_interrupted(&self) -> bool {
        self.turn_status.as_deref() == Some("interrupted")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemParams {
    pub turn_id: String,
    pub item: Item,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Item {
    AgentMessage {
        id: String,
        #[serde(default)]
        text: Option<String>,
    },
    Reasoning {
        id: String,
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        summary: Option<String>,
    },
    CommandExecution {
        id: String,
        command: String,
        #[serde(default)]
        exit_code: Option<i32>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeltaParams {
    pub turn_id: String,
    pub item_id: String,
    pub delta: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorParams {
    #[serde(default)]
    pub turn_id: Option<String>,
    pub message: String,
    #[serde(default)]
    pub will_retry: bool,
    #[serde(default)]
    pub codex_error_info: Option<Value>,
}

/// Decoded form of `codexErrorInfo`: a single-key object whose key names the
/// failure. Unrecognized keys collapse to `Other`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnError {
    ContextWindowExceeded,
    UsageLimitExceeded,
    Unauthorized,
    ResponseStreamDisconnected,
    Other(String),
}

impl TurnError {
    pub fn from_codex_error_info(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let key = obj.keys().next()?;
        Some(match key.as_str() {
            "contextWindowExceeded" => TurnError::ContextWindowExceeded,
            "usageLimitExceeded" => TurnError::UsageLimitExceeded,
            "unauthorized" => TurnError::Unauthorized,
            "responseStreamDisconnected" => TurnError::ResponseStreamDisconnected,
            other => TurnError::Other(other.to_string()),
        })
    }

    pub fn is_auth_related(&self) -> bool {
        matches!(self, TurnError::Unauthorized)
    }
}

const AUTH_MARKERS: [&str; 4] = ["/login", "login", "log in", "authenticate"];

/// True if `text` contains one of the known auth-required substrings
/// (case-insensitive), used both on Claude system content and on Codex
/// error messages.
pub fn contains_auth_marker(text: &str) -> bool {
    let lower = text.to_lowercase();
    AUTH_MARKERS.iter().any(|marker| lower.contains(marker))
}

impl CodexNotification {
    pub fn from_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }

    /// The `turnId` carried by this notification, if any — used to drop
    /// stale notifications from a previous, already-interrupted turn.
    pub fn turn_id(&self) -> Option<&str> {
        match self {
            CodexNotification::TurnStarted { params } => Some(params.turn_id.as_str()),
            CodexNotification::TurnCompleted { params } => Some(params.turn_id.as_str()),
            CodexNotification::ItemStarted { params } | CodexNotification::ItemCompleted { params } => {
                Some(params.turn_id.as_str())
            }
            CodexNotification::AgentMessageDelta { params }
            | CodexNotification::ReasoningSummaryDelta { params }
            | CodexNotification::ReasoningTextDelta { params } => Some(params.turn_id.as_str()),
            CodexNotification::Error { params } => params.turn_id.as_deref(),
            CodexNotification::ThreadStarted { .. } | CodexNotification::Unknown => None,
        }
    }
}

/// Server-initiated approval request, decoded from a `ServerRequest`-shaped
/// JSON-RPC request (see `jsonrpc::JsonRpcRequest`).
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedApprovalRequest {
    pub request_id: RequestId,
    pub kind: ApprovalKind,
    pub params: Value,
}

impl DecodedApprovalRequest {
    pub fn from_method(method: &str, request_id: RequestId, params: Value) -> Option<Self> {
        let kind = match method {
            "item/commandExecution/requestApproval" => ApprovalKind::CommandExecution,
            "item/fileChange/requestApproval" => ApprovalKind::FileChange,
            "applyPatchApproval" => ApprovalKind::ApplyPatch,
            "execCommandApproval" => ApprovalKind::ExecCommand,
            _ => return None,
        };
        Some(DecodedApprovalRequest {
            request_id,
            kind,
            params,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn decodes_turn_completed_with_error() {
        let line = r#"{"method":"turn/completed","params":{"turnId":"t1","turnStatus":"failed","error":{"message":"nope","codexErrorInfo":{"unauthorized":{}}}}}"#;
        let notif = CodexNotification::from_line(line).expect("decode");
        match notif {
            CodexNotification::TurnCompleted { params } => {
                assert_eq!(params.turn_id, "t1");
                assert!(!params.was_interrupted());
            }
            other => panic!("expected TurnCompleted, got {other:?}"),
        }
    }

    #[test]
    fn turn_status_interrupted_is_detected() {
        let params = TurnCompletedParams {
            turn_id: "t1".to_string(),
            turn_status: Some("interrupted".to_string()),
            error: None,
        };
        assert!(params.was_interrupted());
    }

    #[test]
    fn turn_error_from_single_key_object() {
        let value = json!({"contextWindowExceeded": {}});
        assert_eq!(
            TurnError::from_codex_error_info(&value),
            Some(TurnError::ContextWindowExceeded)
        );

        let unknown = json!({"somethingNew": {"detail": 1}});
        assert_eq!(
            TurnError::from_codex_error_info(&unknown),
            Some(TurnError::Other("somethingNew".to_string()))
        );
    }

    #[test]
    fn agent_message_delta_decodes() {
        let line = r#"{"method":"item/agentMessage/delta","params":{"turnId":"t1","itemId":"i1","delta":"hel"}}"#;
        let notif = CodexNotification::from_line(line).expect("decode");
        assert_eq!(notif.turn_id(), Some("t1"));
        match notif {
            CodexNotification::AgentMessageDelta { params } => assert_eq!(params.delta, "hel"),
            other => panic!("expected AgentMessageDelta, got {other:?}"),
        }
    }

    #[test]
    fn unknown_method_falls_back() {
        let line = r#"{"method":"thread/futureEvent","params":{}}"#;
        assert_eq!(
            CodexNotification::from_line(line).expect("decode"),
            CodexNotification::Unknown
        );
    }

    #[test]
    fn auth_marker_matching_is_case_insensitive() {
        assert!(contains_auth_marker("Please LOG IN to continue"));
        assert!(contains_auth_marker("run /login first"));
        assert!(!contains_auth_marker("everything is fine"));
    }

    #[test]
    fn approval_request_kind_from_method() {
        let decoded = DecodedApprovalRequest::from_method(
            "item/commandExecution/requestApproval",
            RequestId::Integer(1),
            json!({}),
        )
        .expect("known method");
        assert_eq!(decoded.kind, ApprovalKind::CommandExecution);

        assert!(DecodedApprovalRequest::from_method("unknown/method", RequestId::Integer(2), json!({})).is_none());
    }
}
