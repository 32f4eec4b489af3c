use serde_json::Value;

use crate::jsonrpc::RequestId;

/// A server-initiated request for permission to run a command, change a
/// file, or apply a patch. Surfaced by the Codex bridge; the turn engine
/// relays it to the callback layer and, later, calls back in with a
/// decision via `Bridge::respond_approval`.
#[derive(Debug, Clone, PartialEq)]
pub struct ApprovalRequest {
    pub request_id: RequestId,
    pub kind: ApprovalKind,
    pub params: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalKind {
    CommandExecution,
    FileChange,
    ApplyPatch,
    ExecCommand,
}

/// The decision a caller can hand back for an `ApprovalRequest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalDecision {
    Approve,
    Decline,
}

impl ApprovalDecision {
    pub fn as_str(self) -> &'static str {
        match self {
            ApprovalDecision::Approve => "approve",
            ApprovalDecision::Decline => "decline",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_strings_match_wire_values() {
        assert_eq!(ApprovalDecision::Approve.as_str(), "approve");
        assert_eq!(ApprovalDecision::Decline.as_str(), "decline");
    }
}
