use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use banjo_core::bridge::{ClaudeStartOptions, CodexStartOptions};
use banjo_core::permission_socket::drain_ready;
use banjo_core::{run_claude_turn, run_codex_turn, ClaudeBridge, CodexBridge, PermissionSocket, PromptContext, TurnCallbacks, TurnEvent, TurnOutcome};
use banjo_protocol::approval::{ApprovalDecision, ApprovalRequest};
use banjo_protocol::hook::HookResponse;
use banjo_protocol::stop_reason::StopReason;
use serde::Serialize;
use tracing::{info, warn};

use crate::route::Route;

/// Drains the permission socket on its own thread so hook connections don't
/// wait on whatever the turn engine happens to be doing. The default policy
/// auto-allows every request and logs it; a real editor integration would
/// swap this for one that actually prompts the user.
fn spawn_permission_drainer(socket: Arc<PermissionSocket>, stop: Arc<AtomicBool>) -> JoinHandle<()> {
    std::thread::spawn(move || {
        while !stop.load(Ordering::Acquire) {
            drain_ready(&socket, |request| {
                info!(tool = %request.tool_name, tool_use_id = %request.tool_use_id, "auto-allowing permission request");
                HookResponse::allow()
            });
            std::thread::sleep(Duration::from_millis(100));
        }
    })
}

/// Emits every `TurnEvent` as a newline-delimited JSON line on stdout — the
/// minimal "editor front-end" stand-in for a headless run. A real editor
/// integration would implement `TurnCallbacks` over its own wire protocol
/// instead.
struct StdoutCallbacks;

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireEvent<'a> {
    Text { engine: &'static str, text: &'a str },
    Thought { engine: &'static str, text: &'a str },
    ToolCall { tool_id: &'a str, name: &'a str },
    ToolResult { tool_id: &'a str, is_error: bool },
    SessionStarted { session_id: &'a str },
    SlashCommands { commands: &'a [String] },
}

impl TurnCallbacks for StdoutCallbacks {
    fn on_event(&mut self, event: TurnEvent) {
        let wire = match &event {
            TurnEvent::Text { engine, text } => WireEvent::Text { engine: engine.prefix(), text },
            TurnEvent::Thought { engine, text } => WireEvent::Thought { engine: engine.prefix(), text },
            TurnEvent::ToolCall(call) => WireEvent::ToolCall { tool_id: &call.tool_id, name: &call.name },
            TurnEvent::ToolResult(result) => WireEvent::ToolResult {
                tool_id: &result.tool_id,
                is_error: result.is_error,
            },
            TurnEvent::SessionStarted { session_id } => WireEvent::SessionStarted { session_id },
            TurnEvent::SlashCommands(commands) => WireEvent::SlashCommands { commands },
        };
        if let Ok(line) = serde_json::to_string(&wire) {
            println!("{line}");
        }
    }

    fn on_approval_request(&mut self, request: &ApprovalRequest) -> Option<ApprovalDecision> {
        info!(?request.kind, "auto-declining approval request (no interactive callback configured)");
        Some(ApprovalDecision::Decline)
    }
}

/// Owns whichever bridges the configured route needs and runs prompts
/// against them, handling the context-reload restart loop spec'd for each
/// engine: on `StopReason::ContextReloaded` the bridge is restarted and the
/// reload prompt resent before control returns to the caller.
pub struct Session {
    route: Route,
    cwd: PathBuf,
    session_id: String,
    auto_resume: bool,
    primary: Route,
    cancelled: Arc<AtomicBool>,
    claude: Option<ClaudeBridge>,
    codex: Option<CodexBridge>,
    permission_socket: Option<Arc<PermissionSocket>>,
    permission_drainer_stop: Arc<AtomicBool>,
    permission_drainer: Option<JoinHandle<()>>,
}

impl Session {
    pub fn new(route: Route, cwd: PathBuf, session_id: String) -> Self {
        let permission_socket = match PermissionSocket::bind(&session_id) {
            Ok(socket) => Some(Arc::new(socket)),
            Err(err) => {
                warn!(error = %err, "failed to bind permission socket, tool calls will run unmediated");
                None
            }
        };
        let permission_drainer_stop = Arc::new(AtomicBool::new(false));
        let permission_drainer = permission_socket
            .clone()
            .map(|socket| spawn_permission_drainer(socket, Arc::clone(&permission_drainer_stop)));

        Self {
            route,
            cwd,
            session_id,
            auto_resume: false,
            primary: Route::Claude,
            cancelled: Arc::new(AtomicBool::new(false)),
            claude: None,
            codex: None,
            permission_socket,
            permission_drainer_stop,
            permission_drainer,
        }
    }

    pub fn with_auto_resume(mut self, auto_resume: bool) -> Self {
        self.auto_resume = auto_resume;
        self
    }

    pub fn with_primary(mut self, primary: Route) -> Self {
        self.primary = primary;
        self
    }

    fn prompt_context(&self) -> PromptContext {
        PromptContext {
            session_id: self.session_id.clone(),
            cwd: self.cwd.clone(),
            cancelled: Arc::clone(&self.cancelled),
            nudge: banjo_core::nudge::NudgePolicy::new(true, 5 * 60 * 1000),
        }
    }

    fn ensure_claude(&mut self) -> anyhow::Result<&ClaudeBridge> {
        if !self.claude.as_ref().is_some_and(ClaudeBridge::is_alive) {
            let mut bridge = ClaudeBridge::new(&self.cwd);
            let opts = ClaudeStartOptions {
                continue_last: self.auto_resume,
                permission_socket_path: self.permission_socket.as_ref().map(|s| s.path().to_path_buf()),
                ..ClaudeStartOptions::default()
            };
            bridge.start(&opts)?;
            self.claude = Some(bridge);
        }
        self.claude.as_ref().ok_or_else(|| anyhow::anyhow!("claude bridge missing after ensure"))
    }

    fn ensure_codex(&mut self) -> anyhow::Result<&CodexBridge> {
        if !self.codex.as_ref().is_some_and(CodexBridge::is_alive) {
            let mut bridge = CodexBridge::new(&self.cwd);
            bridge.spawn()?;
            bridge.initialize("banjo", env!("CARGO_PKG_VERSION"))?;
            bridge.thread_start(&CodexStartOptions::default())?;
            self.codex = Some(bridge);
        }
        self.codex.as_ref().ok_or_else(|| anyhow::anyhow!("codex bridge missing after ensure"))
    }

    /// Runs `content` to completion, transparently restarting and resending
    /// through as many context-reload transitions as the turn engine
    /// requests.
    pub fn run_prompt(&mut self, content: &str) -> anyhow::Result<StopReason> {
        match self.route {
            Route::Claude => self.run_claude_prompt(content),
            Route::Codex => self.run_codex_prompt(content),
            Route::Duet => {
                let claude_reason = self.run_claude_prompt(content)?;
                let codex_reason = self.run_codex_prompt(content)?;
                Ok(duet_stop_reason(self.primary, claude_reason, codex_reason))
            }
        }
    }

    fn run_claude_prompt(&mut self, content: &str) -> anyhow::Result<StopReason> {
        let mut next_prompt = content.to_string();
        let mut callbacks = StdoutCallbacks;
        loop {
            let bridge = self.ensure_claude()?;
            bridge.send_prompt(&next_prompt)?;

            let ctx = self.prompt_context();
            let TurnOutcome { stop_reason, reload_prompt } = run_claude_turn(bridge, &ctx, &mut callbacks)?;

            match reload_prompt {
                Some(prompt) => {
                    info!("context reload requested, restarting claude bridge");
                    if let Some(bridge) = self.claude.as_mut() {
                        bridge.stop();
                    }
                    next_prompt = prompt;
                    continue;
                }
                None => return Ok(stop_reason),
            }
        }
    }

    fn run_codex_prompt(&mut self, content: &str) -> anyhow::Result<StopReason> {
        let mut next_prompt = content.to_string();
        let mut callbacks = StdoutCallbacks;
        loop {
            let bridge = self.ensure_codex()?;
            bridge.turn_start(serde_json::json!([{ "type": "text", "text": next_prompt }]))?;

            let ctx = self.prompt_context();
            let bridge = self.codex.as_ref().ok_or_else(|| anyhow::anyhow!("codex bridge missing after ensure"))?;
            let TurnOutcome { stop_reason, reload_prompt } = run_codex_turn(bridge, &ctx, &mut callbacks)?;

            match reload_prompt {
                Some(prompt) => {
                    info!("context reload requested, restarting codex bridge");
                    if let Some(bridge) = self.codex.as_mut() {
                        bridge.stop();
                    }
                    next_prompt = prompt;
                    continue;
                }
                None => return Ok(stop_reason),
            }
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, std::sync::atomic::Ordering::Release);
    }

    pub fn shutdown(&mut self) {
        if let Some(bridge) = self.claude.as_mut() {
            bridge.stop();
        }
        if let Some(bridge) = self.codex.as_mut() {
            bridge.stop();
        }
        self.permission_drainer_stop.store(true, Ordering::Release);
        if let Some(handle) = self.permission_drainer.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Picks the stop reason reported for a duet turn: whichever engine is
/// `primary` wins unless the other hit `AuthRequired`, which always takes
/// priority since it blocks the whole session regardless of which side
/// noticed it first.
fn duet_stop_reason(primary: Route, claude: StopReason, codex: StopReason) -> StopReason {
    let (primary_reason, secondary_reason) = match primary {
        Route::Codex => (codex, claude),
        _ => (claude, codex),
    };
    if secondary_reason == StopReason::AuthRequired {
        secondary_reason
    } else {
        primary_reason
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_reason_wins_when_neither_needs_auth() {
        assert_eq!(
            duet_stop_reason(Route::Claude, StopReason::EndTurn, StopReason::Cancelled),
            StopReason::EndTurn
        );
        assert_eq!(
            duet_stop_reason(Route::Codex, StopReason::EndTurn, StopReason::Cancelled),
            StopReason::Cancelled
        );
    }

    #[test]
    fn auth_required_on_either_side_always_wins() {
        assert_eq!(
            duet_stop_reason(Route::Claude, StopReason::EndTurn, StopReason::AuthRequired),
            StopReason::AuthRequired
        );
        assert_eq!(
            duet_stop_reason(Route::Codex, StopReason::AuthRequired, StopReason::EndTurn),
            StopReason::AuthRequired
        );
    }
}
