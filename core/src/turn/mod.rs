//! Per-prompt turn engines: one state machine per engine flavor that
//! consumes a bridge's message stream, tracks tool use, and decides the
//! stop reason — including the context-reload transition that hands the
//! caller a fresh prompt to resend against a restarted bridge.

pub mod claude_engine;
pub mod codex_engine;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use banjo_protocol::approval::{ApprovalDecision, ApprovalRequest};
use banjo_protocol::engine::Engine;
use banjo_protocol::stop_reason::StopReason;
use banjo_protocol::tool::{ToolCall, ToolResult};

use crate::nudge::NudgePolicy;

/// Poll slice used when waiting on a bridge's queue: frequent enough to
/// notice cancellation quickly, coarse enough not to busy-loop.
pub const PROMPT_POLL_MS: u64 = 250;

/// Normalized event the turn engine hands to the callback layer. Both
/// engine flavors emit the same vocabulary.
#[derive(Debug, Clone)]
pub enum TurnEvent {
    Text { engine: Engine, text: String },
    Thought { engine: Engine, text: String },
    ToolCall(ToolCall),
    ToolResult(ToolResult),
    SessionStarted { session_id: String },
    SlashCommands(Vec<String>),
}

/// Callback surface the editor-facing layer implements. `on_approval_request`
/// returning `None` means "auto-decline" — callers who don't care about
/// approvals can leave the default.
pub trait TurnCallbacks {
    fn on_event(&mut self, event: TurnEvent);

    fn on_approval_request(&mut self, _request: &ApprovalRequest) -> Option<ApprovalDecision> {
        None
    }

    fn on_timeout(&mut self) {}
}

/// Per-prompt immutable frame: session id, cwd, shared cancellation flag,
/// and the nudge policy (whose cooldown clock outlives any single turn).
#[derive(Clone)]
pub struct PromptContext {
    pub session_id: String,
    pub cwd: PathBuf,
    pub cancelled: Arc<AtomicBool>,
    pub nudge: NudgePolicy,
}

impl PromptContext {
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Result of running one turn to completion.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub stop_reason: StopReason,
    /// Set only when `stop_reason == ContextReloaded`: the prompt the
    /// caller must resend once it has restarted the bridge.
    pub reload_prompt: Option<String>,
}

impl TurnOutcome {
    pub fn end_turn() -> Self {
        TurnOutcome {
            stop_reason: StopReason::EndTurn,
            reload_prompt: None,
        }
    }

    pub fn reload(prompt: impl Into<String>) -> Self {
        TurnOutcome {
            stop_reason: StopReason::ContextReloaded,
            reload_prompt: Some(prompt.into()),
        }
    }
}

/// Local per-turn bookkeeping for the "assistant ran `dot off`, now decide
/// whether to reload context" flow, shared by both engine flavors. The
/// reload itself is only scheduled here — it's carried out at the turn's
/// terminal message, not the moment the dot-off tool result arrives, so any
/// further assistant output in between still reaches the callback layer.
#[derive(Default)]
pub(crate) struct ReloadTracker {
    pub dot_off_tool_id: Option<String>,
    pub pending_reload_prompt: Option<String>,
}

pub(crate) fn looks_like_dot_off(tool_name: &str, input: Option<&serde_json::Value>) -> bool {
    if tool_name != "Bash" {
        return false;
    }
    input
        .and_then(|v| v.get("command"))
        .and_then(|v| v.as_str())
        .is_some_and(|cmd| cmd.contains("dot off"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn detects_dot_off_bash_invocation() {
        assert!(looks_like_dot_off("Bash", Some(&json!({"command": "dot off 3"}))));
        assert!(!looks_like_dot_off("Bash", Some(&json!({"command": "ls"}))));
        assert!(!looks_like_dot_off("Read", Some(&json!({"command": "dot off 3"}))));
    }
}
