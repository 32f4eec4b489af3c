//! Line-framed JSON protocol spoken over the per-session permission socket
//! (`/tmp/banjo-<session_id>.sock`). One request in, one response out, then
//! the hook process closes its end.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookRequest {
    pub tool_name: String,
    #[serde(default)]
    pub tool_input: Value,
    pub tool_use_id: String,
    pub session_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookDecision {
    Allow,
    Deny,
    Ask,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookResponse {
    pub decision: HookDecision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answers: Option<Value>,
}

impl HookResponse {
    pub fn allow() -> Self {
        HookResponse {
            decision: HookDecision::Allow,
            reason: None,
            answers: None,
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        HookResponse {
            decision: HookDecision::Deny,
            reason: Some(reason.into()),
            answers: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn request_round_trips() {
        let req = HookRequest {
            tool_name: "Bash".to_string(),
            tool_input: serde_json::json!({"command": "ls"}),
            tool_use_id: "toolu_1".to_string(),
            session_id: "sess-1".to_string(),
        };
        let line = serde_json::to_string(&req).expect("serialize");
        let decoded: HookRequest = serde_json::from_str(&line).expect("deserialize");
        assert_eq!(decoded, req);
    }

    #[test]
    fn deny_response_serializes_reason_but_allow_omits_it() {
        let deny = serde_json::to_value(HookResponse::deny("blocked by policy")).expect("serialize");
        assert_eq!(deny["decision"], "deny");
        assert_eq!(deny["reason"], "blocked by policy");

        let allow = serde_json::to_value(HookResponse::allow()).expect("serialize");
        assert_eq!(allow["decision"], "allow");
        assert!(allow.get("reason").is_none());
    }
}
