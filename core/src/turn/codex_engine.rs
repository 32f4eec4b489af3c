use std::time::{Duration, Instant};

use banjo_protocol::approval::ApprovalRequest;
use banjo_protocol::codex::{contains_auth_marker, CodexNotification, Item};
use banjo_protocol::engine::Engine;
use banjo_protocol::stop_reason::StopReason;
use banjo_protocol::tool::{ToolCall, ToolKind, ToolResult, ToolStatus};
use tracing::debug;

use crate::bridge::codex::CodexEvent;
use crate::bridge::CodexBridge;
use crate::error::TurnEngineError;
use crate::nudge;
use crate::queue::PopOutcome;

use super::{PromptContext, ReloadTracker, TurnCallbacks, TurnEvent, TurnOutcome, PROMPT_POLL_MS};

/// Runs one prompt to completion against an already-started Codex bridge.
/// Unlike Claude, Codex's interrupt is a genuine protocol request and the
/// bridge survives it — the caller doesn't need to restart anything unless
/// this returns `ContextReloaded`.
pub fn run_codex_turn(
    bridge: &CodexBridge,
    ctx: &PromptContext,
    callbacks: &mut dyn TurnCallbacks,
) -> Result<TurnOutcome, TurnEngineError> {
    let mut tracker = ReloadTracker::default();
    let mut saw_summary_delta = false;
    let mut saw_text_delta = false;
    let mut tool_use_count: u32 = 0;

    loop {
        if ctx.is_cancelled() {
            let _ = bridge.turn_interrupt();
            return Ok(TurnOutcome {
                stop_reason: StopReason::Cancelled,
                reload_prompt: None,
            });
        }

        let deadline = Instant::now() + Duration::from_millis(PROMPT_POLL_MS);
        let event = match bridge.read_event_with_deadline(deadline) {
            PopOutcome::Message(e) => e,
            PopOutcome::Timeout => {
                callbacks.on_timeout();
                continue;
            }
            PopOutcome::Closed => {
                return Ok(TurnOutcome {
                    stop_reason: if ctx.is_cancelled() { StopReason::Cancelled } else { StopReason::EndTurn },
                    reload_prompt: None,
                });
            }
        };

        match event {
            CodexEvent::Approval(request) => {
                let approval = ApprovalRequest {
                    request_id: request.request_id.clone(),
                    kind: request.kind,
                    params: request.params,
                };
                let decision = callbacks.on_approval_request(&approval);
                let decision = decision.unwrap_or(banjo_protocol::approval::ApprovalDecision::Decline);
                if let Err(err) = bridge.respond_approval(request.request_id, decision) {
                    debug!(error = %err, "failed to send approval response");
                }
            }
            CodexEvent::Notification(notification) => match notification {
                CodexNotification::AgentMessageDelta { params } => {
                    saw_text_delta = true;
                    callbacks.on_event(TurnEvent::Text {
                        engine: Engine::Codex,
                        text: params.delta,
                    });
                }
                CodexNotification::ReasoningSummaryDelta { params } => {
                    saw_summary_delta = true;
                    callbacks.on_event(TurnEvent::Thought {
                        engine: Engine::Codex,
                        text: params.delta,
                    });
                }
                CodexNotification::ReasoningTextDelta { params } => {
                    if !saw_summary_delta {
                        callbacks.on_event(TurnEvent::Thought {
                            engine: Engine::Codex,
                            text: params.delta,
                        });
                    }
                }
                CodexNotification::ItemStarted { params } => {
                    if let Item::CommandExecution { id, command, .. } = params.item {
                        tool_use_count += 1;
                        if command.contains("dot off") {
                            tracker.dot_off_tool_id = Some(id.clone());
                        }
                        callbacks.on_event(TurnEvent::ToolCall(ToolCall {
                            tool_id: id,
                            name: command.clone(),
                            kind: ToolKind::Execute,
                            input: Some(serde_json::json!({ "command": command })),
                        }));
                    }
                }
                CodexNotification::ItemCompleted { params } => {
                    let raw = serde_json::to_value(&params.item).unwrap_or(serde_json::Value::Null);
                    match params.item {
                        Item::CommandExecution { id, exit_code, .. } => {
                            let status = match exit_code {
                                Some(0) => ToolStatus::Completed,
                                Some(_) => ToolStatus::Failed,
                                None => ToolStatus::Completed,
                            };
                            let is_error = matches!(status, ToolStatus::Failed);

                            if tracker.dot_off_tool_id.as_deref() == Some(id.as_str()) {
                                tracker.dot_off_tool_id = None;
                                if !is_error {
                                    tracker.pending_reload_prompt = Some(nudge::RELOAD_PROMPT.to_string());
                                } else {
                                    debug!("dot off failed, skipping context reload");
                                }
                            }

                            callbacks.on_event(TurnEvent::ToolResult(ToolResult {
                                tool_id: id,
                                text: None,
                                status,
                                is_error,
                                raw,
                            }));
                        }
                        Item::AgentMessage { text: Some(text), .. } if !saw_text_delta => {
                            callbacks.on_event(TurnEvent::Text {
                                engine: Engine::Codex,
                                text,
                            });
                        }
                        Item::Reasoning { text, summary, .. } if !saw_summary_delta && !saw_text_delta => {
                            if let Some(text) = summary.or(text) {
                                callbacks.on_event(TurnEvent::Thought { engine: Engine::Codex, text });
                            }
                        }
                        _ => {}
                    }
                }
                CodexNotification::Error { params } => {
                    if params.will_retry {
                        debug!(message = %params.message, "codex turn error will retry");
                        continue;
                    }
                    let auth_related = contains_auth_marker(&params.message)
                        || params
                            .codex_error_info
                            .as_ref()
                            .and_then(banjo_protocol::codex::TurnError::from_codex_error_info)
                            .is_some_and(|e| e.is_auth_related());
                    if auth_related {
                        return Ok(TurnOutcome {
                            stop_reason: StopReason::AuthRequired,
                            reload_prompt: None,
                        });
                    }
                    return Ok(TurnOutcome {
                        stop_reason: StopReason::EndTurn,
                        reload_prompt: None,
                    });
                }
                CodexNotification::TurnCompleted { params } => {
                    let stop_reason = if params.was_interrupted() {
                        StopReason::Cancelled
                    } else {
                        StopReason::EndTurn
                    };

                    if let Some(prompt) = tracker.pending_reload_prompt.take() {
                        return Ok(TurnOutcome::reload(prompt));
                    }

                    let reason_ok = params.error.is_none()
                        || matches!(&params.error, Some(banjo_protocol::codex::TurnError::Other(tag)) if tag == "maxTurns");
                    let did_work = tool_use_count > 1;
                    if nudge::evaluate(&ctx.nudge, ctx.is_cancelled(), reason_ok, did_work, &ctx.cwd) {
                        return Ok(TurnOutcome::reload(nudge::RELOAD_PROMPT));
                    }

                    return Ok(TurnOutcome {
                        stop_reason,
                        reload_prompt: None,
                    });
                }
                CodexNotification::ThreadStarted { params } => {
                    callbacks.on_event(TurnEvent::SessionStarted { session_id: params.thread_id });
                }
                CodexNotification::TurnStarted { .. } | CodexNotification::Unknown => {}
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_completed_interrupted_maps_to_cancelled() {
        let params = banjo_protocol::codex::TurnCompletedParams {
            turn_id: "t1".to_string(),
            turn_status: Some("interrupted".to_string()),
            error: None,
        };
        assert!(params.was_interrupted());
    }

    #[test]
    fn dot_off_command_is_detected_by_substring() {
        assert!("dot off 3".contains("dot off"));
        assert!(!"dot ls --json".contains("dot off"));
    }
}
