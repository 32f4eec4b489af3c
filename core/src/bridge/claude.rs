use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use banjo_protocol::claude::StreamMessage;
use tracing::{debug, warn};

use crate::error::BridgeError;
use crate::io::line_reader::{LineReadOutcome, LineReader};
use crate::queue::{MessageQueue, PopOutcome};

use super::stderr_capture::{spawn_stderr_drain, StderrTail};

const DEFAULT_QUEUE_CAPACITY: usize = 1024;
const STOP_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionMode {
    Default,
    AcceptEdits,
    BypassPermissions,
    Plan,
}

impl PermissionMode {
    fn as_cli_value(self) -> &'static str {
        match self {
            PermissionMode::Default => "default",
            PermissionMode::AcceptEdits => "acceptEdits",
            PermissionMode::BypassPermissions => "bypassPermissions",
            PermissionMode::Plan => "plan",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClaudeStartOptions {
    pub resume_session_id: Option<String>,
    pub continue_last: bool,
    pub permission_mode: Option<PermissionMode>,
    pub model: Option<String>,
    pub permission_socket_path: Option<PathBuf>,
    pub skip_permissions: bool,
}

/// Supervises one Claude Code subprocess: spawn, a dedicated reader thread
/// feeding a bounded queue, line-framed stdin writes, and SIGINT-based
/// interrupt (Claude has no protocol-level interrupt).
pub struct ClaudeBridge {
    executable: PathBuf,
    cwd: PathBuf,
    child: Option<Child>,
    stdin: Option<Arc<Mutex<ChildStdin>>>,
    queue: Arc<MessageQueue<StreamMessage>>,
    stop_requested: Arc<AtomicBool>,
    reader_handle: Option<JoinHandle<()>>,
    stderr_handle: Option<JoinHandle<()>>,
    stderr_tail: StderrTail,
    session_id: Option<String>,
}

fn resolve_claude_executable() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("CLAUDE_CODE_EXECUTABLE") {
        return Some(PathBuf::from(path));
    }
    which::which("claude").ok()
}

impl ClaudeBridge {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            executable: resolve_claude_executable().unwrap_or_else(|| PathBuf::from("claude")),
            cwd: cwd.into(),
            child: None,
            stdin: None,
            queue: Arc::new(MessageQueue::new(DEFAULT_QUEUE_CAPACITY)),
            stop_requested: Arc::new(AtomicBool::new(false)),
            reader_handle: None,
            stderr_handle: None,
            stderr_tail: StderrTail::new(),
            session_id: None,
        }
    }

    pub fn is_available() -> bool {
        which::which("claude").is_ok() || std::env::var("CLAUDE_CODE_EXECUTABLE").is_ok()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn stderr_tail(&self) -> String {
        self.stderr_tail.snapshot()
    }

    pub fn is_alive(&self) -> bool {
        self.child.is_some() && !self.queue.is_stopped()
    }

    pub fn start(&mut self, opts: &ClaudeStartOptions) -> Result<(), BridgeError> {
        if self.is_alive() {
            self.stop();
        }

        let mut cmd = Command::new(&self.executable);
        cmd.current_dir(&self.cwd)
            .arg("--output-format")
            .arg("stream-json")
            .arg("--input-format")
            .arg("stream-json")
            .arg("--verbose")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if let Some(session_id) = &opts.resume_session_id {
            cmd.arg("--resume").arg(session_id);
        } else if opts.continue_last {
            cmd.arg("--continue");
        }
        if let Some(mode) = opts.permission_mode {
            cmd.arg("--permission-mode").arg(mode.as_cli_value());
        }
        if opts.skip_permissions {
            cmd.arg("--dangerously-skip-permissions");
        }
        if let Some(model) = &opts.model {
            cmd.arg("--model").arg(model);
        }
        if let Some(socket) = &opts.permission_socket_path {
            cmd.env("BANJO_PERMISSION_SOCKET", socket);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| BridgeError::Spawn(self.executable.display().to_string(), e))?;

        let stdin = child.stdin.take().ok_or(BridgeError::BrokenPipe)?;
        let stdout = child.stdout.take().ok_or(BridgeError::BrokenPipe)?;
        let stderr = child.stderr.take().ok_or(BridgeError::BrokenPipe)?;

        self.stop_requested.store(false, Ordering::Release);
        self.queue = Arc::new(MessageQueue::new(DEFAULT_QUEUE_CAPACITY));
        self.stderr_tail = StderrTail::new();
        self.stderr_handle = Some(spawn_stderr_drain(stderr, self.stderr_tail.clone()));
        self.reader_handle = Some(spawn_reader_thread(stdout, Arc::clone(&self.queue), Arc::clone(&self.stop_requested)));
        self.stdin = Some(Arc::new(Mutex::new(stdin)));
        self.child = Some(child);
        self.session_id = None;
        Ok(())
    }

    /// SIGTERM, then SIGKILL after a short grace window if it hasn't exited.
    pub fn stop(&mut self) {
        self.stop_requested.store(true, Ordering::Release);
        self.queue.stop();

        if let Some(mut child) = self.child.take() {
            if let Some(pid) = child_pid(&child) {
                unsafe {
                    libc::kill(pid, libc::SIGTERM);
                }
            }
            let deadline = Instant::now() + STOP_GRACE;
            loop {
                match child.try_wait() {
                    Ok(Some(_)) => break,
                    Ok(None) if Instant::now() >= deadline => {
                        let _ = child.kill();
                        let _ = child.wait();
                        break;
                    }
                    Ok(None) => std::thread::sleep(Duration::from_millis(20)),
                    Err(_) => break,
                }
            }
        }
        if let Some(handle) = self.reader_handle.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.stderr_handle.take() {
            let _ = handle.join();
        }
        self.stdin = None;
    }

    /// Claude has no protocol-level interrupt: send SIGINT, reap, and leave
    /// the bridge dead. The next prompt must call `start` again.
    pub fn interrupt(&mut self) {
        if let Some(child) = &self.child {
            if let Some(pid) = child_pid(child) {
                unsafe {
                    libc::kill(pid, libc::SIGINT);
                }
            }
        }
        self.stop();
    }

    pub fn send_prompt(&self, content: &str) -> Result<(), BridgeError> {
        let stdin = self.stdin.as_ref().ok_or(BridgeError::NotRunning)?;
        let payload = serde_json::json!({
            "type": "user",
            "message": { "role": "user", "content": content },
        });
        let mut line = serde_json::to_vec(&payload)?;
        line.push(b'\n');
        use std::io::Write;
        let mut guard = stdin.lock().unwrap_or_else(|e| e.into_inner());
        guard.write_all(&line).map_err(|_| BridgeError::BrokenPipe)?;
        guard.flush().map_err(|_| BridgeError::BrokenPipe)
    }

    pub fn read_message(&self) -> Option<StreamMessage> {
        self.queue.pop()
    }

    pub fn read_message_with_deadline(&self, deadline: Instant) -> PopOutcome<StreamMessage> {
        self.queue.pop_with_deadline(deadline)
    }

    pub fn note_session_id(&mut self, session_id: String) {
        self.session_id = Some(session_id);
    }
}

impl Drop for ClaudeBridge {
    fn drop(&mut self) {
        if self.is_alive() {
            self.stop();
        }
    }
}

#[cfg(unix)]
fn child_pid(child: &Child) -> Option<i32> {
    Some(child.id() as i32)
}

fn spawn_reader_thread(
    stdout: std::process::ChildStdout,
    queue: Arc<MessageQueue<StreamMessage>>,
    stop_requested: Arc<AtomicBool>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        let mut reader = LineReader::new(stdout);
        loop {
            if stop_requested.load(Ordering::Acquire) {
                break;
            }
            match reader.read_line() {
                Ok(LineReadOutcome::Line(bytes)) => {
                    let line = String::from_utf8_lossy(&bytes);
                    match StreamMessage::from_line(&line) {
                        Ok(message) => {
                            if queue.push(message).is_err() {
                                break;
                            }
                        }
                        Err(err) => warn!(error = %err, "failed to decode claude stream-json line"),
                    }
                }
                Ok(LineReadOutcome::Eof) => {
                    debug!("claude stdout closed");
                    break;
                }
                Err(err) => {
                    warn!(error = %err, "claude reader thread stopping on error");
                    break;
                }
            }
        }
        queue.stop();
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_mode_cli_values_match_wire_strings() {
        assert_eq!(PermissionMode::Default.as_cli_value(), "default");
        assert_eq!(PermissionMode::AcceptEdits.as_cli_value(), "acceptEdits");
        assert_eq!(PermissionMode::BypassPermissions.as_cli_value(), "bypassPermissions");
        assert_eq!(PermissionMode::Plan.as_cli_value(), "plan");
    }

    #[test]
    fn fresh_bridge_is_not_alive() {
        let bridge = ClaudeBridge::new(Path::new("."));
        assert!(!bridge.is_alive());
        assert!(bridge.session_id().is_none());
    }

    #[test]
    fn send_prompt_without_start_is_not_running() {
        let bridge = ClaudeBridge::new(Path::new("."));
        assert!(matches!(bridge.send_prompt("hi"), Err(BridgeError::NotRunning)));
    }
}
