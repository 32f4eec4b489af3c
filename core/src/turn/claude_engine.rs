use std::time::{Duration, Instant};

use banjo_protocol::claude::{ContentBlock, StreamMessage, SystemSubtype};
use banjo_protocol::codex::contains_auth_marker;
use banjo_protocol::engine::Engine;
use banjo_protocol::stop_reason::StopReason;
use banjo_protocol::tool::{ToolCall, ToolKind, ToolResult, ToolStatus};
use tracing::debug;

use crate::bridge::ClaudeBridge;
use crate::error::TurnEngineError;
use crate::nudge;

use super::{looks_like_dot_off, PromptContext, ReloadTracker, TurnCallbacks, TurnEvent, TurnOutcome, PROMPT_POLL_MS};

/// Runs one prompt to completion against an already-started Claude bridge.
/// On `StopReason::ContextReloaded` the caller is expected to restart the
/// bridge and resend `TurnOutcome::reload_prompt`.
pub fn run_claude_turn(
    bridge: &ClaudeBridge,
    ctx: &PromptContext,
    callbacks: &mut dyn TurnCallbacks,
) -> Result<TurnOutcome, TurnEngineError> {
    let mut tracker = ReloadTracker::default();
    let mut tool_use_count: u32 = 0;
    let mut last_stop_reason = StopReason::EndTurn;

    loop {
        if ctx.is_cancelled() {
            return Ok(TurnOutcome {
                stop_reason: StopReason::Cancelled,
                reload_prompt: None,
            });
        }

        let deadline = Instant::now() + Duration::from_millis(PROMPT_POLL_MS);
        let message = match bridge.read_message_with_deadline(deadline) {
            crate::queue::PopOutcome::Message(m) => m,
            crate::queue::PopOutcome::Timeout => {
                callbacks.on_timeout();
                continue;
            }
            crate::queue::PopOutcome::Closed => {
                return Ok(TurnOutcome {
                    stop_reason: if ctx.is_cancelled() { StopReason::Cancelled } else { last_stop_reason },
                    reload_prompt: None,
                });
            }
        };

        match &message {
            StreamMessage::Assistant { message: inner } => {
                for block in &inner.content {
                    match block {
                        ContentBlock::Text { text } => {
                            callbacks.on_event(TurnEvent::Text {
                                engine: Engine::Claude,
                                text: text.clone(),
                            });
                        }
                        ContentBlock::Thinking { thinking } => {
                            callbacks.on_event(TurnEvent::Thought {
                                engine: Engine::Claude,
                                text: thinking.clone(),
                            });
                        }
                        ContentBlock::ToolUse { id, name, input } => {
                            tool_use_count += 1;
                            if looks_like_dot_off(name, input.as_ref()) {
                                tracker.dot_off_tool_id = Some(id.clone());
                            }
                            callbacks.on_event(TurnEvent::ToolCall(ToolCall {
                                tool_id: id.clone(),
                                name: name.clone(),
                                kind: ToolKind::from_tool_name(name),
                                input: input.clone(),
                            }));
                        }
                        ContentBlock::ToolResult { .. } | ContentBlock::Other => {}
                    }
                }
            }
            StreamMessage::User { message: inner } => {
                for block in &inner.content {
                    let ContentBlock::ToolResult {
                        tool_use_id,
                        content,
                        is_error,
                        error,
                    } = block else { continue };

                    let tool_id = tool_use_id.clone().unwrap_or_default();
                    let text = content.as_ref().and_then(|c| c.extract_text()).map(str::to_string);
                    let is_error = is_error.unwrap_or(false) || error.as_deref().is_some_and(|e| !e.is_empty());
                    let status = if is_error { ToolStatus::Failed } else { ToolStatus::Completed };
                    let raw = serde_json::to_value(block).unwrap_or(serde_json::Value::Null);

                    if tracker.dot_off_tool_id.as_deref() == Some(tool_id.as_str()) {
                        tracker.dot_off_tool_id = None;
                        if !is_error {
                            tracker.pending_reload_prompt = Some(nudge::RELOAD_PROMPT.to_string());
                        } else {
                            debug!("dot off failed, skipping context reload");
                        }
                    }

                    callbacks.on_event(TurnEvent::ToolResult(ToolResult {
                        tool_id,
                        text,
                        status,
                        is_error,
                        raw,
                    }));
                }
            }
            StreamMessage::StreamEvent { .. } => {
                if let Some(text) = message.stream_text_delta() {
                    callbacks.on_event(TurnEvent::Text {
                        engine: Engine::Claude,
                        text: text.to_string(),
                    });
                } else if let Some(thinking) = message.stream_thinking_delta() {
                    callbacks.on_event(TurnEvent::Thought {
                        engine: Engine::Claude,
                        text: thinking.to_string(),
                    });
                }
            }
            StreamMessage::System { .. } => match message.system_subtype() {
                Some(SystemSubtype::Init) => {
                    if let Some(info) = message.init_info() {
                        if let Some(session_id) = info.session_id {
                            callbacks.on_event(TurnEvent::SessionStarted { session_id });
                        }
                        if !info.slash_commands.is_empty() {
                            callbacks.on_event(TurnEvent::SlashCommands(info.slash_commands));
                        }
                    }
                }
                Some(SystemSubtype::AuthRequired) => {
                    return Ok(TurnOutcome {
                        stop_reason: StopReason::AuthRequired,
                        reload_prompt: None,
                    });
                }
                _ => {
                    if message.content().is_some_and(contains_auth_marker) {
                        return Ok(TurnOutcome {
                            stop_reason: StopReason::AuthRequired,
                            reload_prompt: None,
                        });
                    }
                }
            },
            StreamMessage::Result { subtype, .. } => {
                last_stop_reason = StopReason::from_claude_str(subtype);

                if let Some(prompt) = tracker.pending_reload_prompt.take() {
                    return Ok(TurnOutcome::reload(prompt));
                }

                let reason_ok = matches!(subtype.as_str(), "success" | "end_turn" | "error_max_turns");
                let did_work = tool_use_count > 1;
                if nudge::evaluate(&ctx.nudge, ctx.is_cancelled(), reason_ok, did_work, &ctx.cwd) {
                    return Ok(TurnOutcome::reload(nudge::RELOAD_PROMPT));
                }

                return Ok(TurnOutcome {
                    stop_reason: last_stop_reason,
                    reload_prompt: None,
                });
            }
            StreamMessage::Unknown => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    struct RecordingCallbacks(Vec<TurnEvent>);

    impl TurnCallbacks for RecordingCallbacks {
        fn on_event(&mut self, event: TurnEvent) {
            self.0.push(event);
        }
    }

    fn ctx() -> PromptContext {
        PromptContext {
            session_id: "s1".to_string(),
            cwd: PathBuf::from("."),
            cancelled: Arc::new(AtomicBool::new(false)),
            nudge: crate::nudge::NudgePolicy::new(false, 60_000),
        }
    }

    #[test]
    fn cancelled_before_any_message_returns_cancelled() {
        let bridge = ClaudeBridge::new(".");
        let prompt_ctx = PromptContext {
            cancelled: Arc::new(AtomicBool::new(true)),
            ..ctx()
        };
        let mut callbacks = RecordingCallbacks(Vec::new());
        let outcome = run_claude_turn(&bridge, &prompt_ctx, &mut callbacks).expect("run");
        assert_eq!(outcome.stop_reason, StopReason::Cancelled);
    }

    #[test]
    fn dot_off_detection_is_bash_specific() {
        assert!(looks_like_dot_off("Bash", Some(&serde_json::json!({"command": "dot off"}))));
        assert!(!looks_like_dot_off("Write", Some(&serde_json::json!({"command": "dot off"}))));
    }
}
