use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use banjo_protocol::approval::ApprovalDecision;
use banjo_protocol::codex::{contains_auth_marker, CodexNotification, DecodedApprovalRequest};
use banjo_protocol::jsonrpc::{JsonRpcErrorObject, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestId};
use serde::de::Error as _;
use serde_json::{json, Value};
use tracing::{debug, warn};

fn decode_err(message: impl Into<String>) -> BridgeError {
    BridgeError::Decode(serde_json::Error::custom(message.into()))
}

/// Maps a JSON-RPC error response to a `BridgeError`, surfacing auth-marker
/// messages as `AuthRequired` per the login-prompt convention both engines
/// share rather than as an opaque decode failure.
fn map_rpc_error(err: JsonRpcErrorObject) -> BridgeError {
    if contains_auth_marker(&err.message) {
        BridgeError::AuthRequired(err.message)
    } else {
        decode_err(format!("{}: {}", err.code, err.message))
    }
}

use crate::error::BridgeError;
use crate::io::line_reader::{LineReadOutcome, LineReader};
use crate::queue::{MessageQueue, PopOutcome};

use super::stderr_capture::{spawn_stderr_drain, StderrTail};

const DEFAULT_QUEUE_CAPACITY: usize = 1024;
const STOP_GRACE: Duration = Duration::from_millis(500);
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);

/// A decoded message handed to the turn engine: either a stream notification
/// or a server-initiated approval request.
#[derive(Debug, Clone, PartialEq)]
pub enum CodexEvent {
    Notification(CodexNotification),
    Approval(DecodedApprovalRequest),
}

#[derive(Debug, Clone, Default)]
pub struct CodexStartOptions {
    pub resume_thread_id: Option<String>,
    pub model: Option<String>,
    pub approval_policy: Option<String>,
    pub sandbox_writable_root: Option<PathBuf>,
    pub effort: Option<String>,
    pub summary: Option<String>,
}

/// `sandboxPolicy` shape for a workspace-write sandbox rooted at `root`,
/// sent on both `thread/start` and `turn/start`.
fn sandbox_policy(root: &Path) -> Value {
    json!({
        "mode": "workspace-write",
        "workspaceWrite": { "writableRoots": [root.to_string_lossy()] },
    })
}

struct ResponseTable {
    inner: Mutex<HashMap<RequestId, JsonRpcMessage>>,
    cv: Condvar,
}

impl ResponseTable {
    fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            cv: Condvar::new(),
        }
    }

    fn deposit(&self, id: RequestId, message: JsonRpcMessage) {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        guard.insert(id, message);
        self.cv.notify_all();
    }

    fn wait(&self, id: &RequestId, timeout: Duration, closed: &AtomicBool) -> Result<JsonRpcMessage, BridgeError> {
        let deadline = Instant::now() + timeout;
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if let Some(message) = guard.remove(id) {
                return Ok(message);
            }
            if closed.load(Ordering::Acquire) {
                return Err(BridgeError::BrokenPipe);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(BridgeError::Timeout);
            }
            let (next_guard, _) = self.cv.wait_timeout(guard, deadline - now).unwrap_or_else(|e| e.into_inner());
            guard = next_guard;
        }
    }
}

/// Supervises one Codex `app-server`-mode subprocess over JSON-RPC 2.0.
/// Unlike `ClaudeBridge`, Codex supports a genuine `turn/interrupt` request
/// and stays alive across it.
pub struct CodexBridge {
    executable: PathBuf,
    cwd: PathBuf,
    child: Option<Child>,
    stdin: Option<Arc<Mutex<ChildStdin>>>,
    queue: Arc<MessageQueue<CodexEvent>>,
    stop_requested: Arc<AtomicBool>,
    reader_handle: Option<JoinHandle<()>>,
    stderr_handle: Option<JoinHandle<()>>,
    stderr_tail: StderrTail,
    responses: Arc<ResponseTable>,
    closed: Arc<AtomicBool>,
    next_id: AtomicI64,
    thread_id: Option<String>,
    current_turn_id: Arc<Mutex<Option<String>>>,
    start_opts: CodexStartOptions,
}

fn resolve_codex_executable() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("CODEX_EXECUTABLE") {
        return Some(PathBuf::from(path));
    }
    which::which("codex").ok()
}

impl CodexBridge {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            executable: resolve_codex_executable().unwrap_or_else(|| PathBuf::from("codex")),
            cwd: cwd.into(),
            child: None,
            stdin: None,
            queue: Arc::new(MessageQueue::new(DEFAULT_QUEUE_CAPACITY)),
            stop_requested: Arc::new(AtomicBool::new(false)),
            reader_handle: None,
            stderr_handle: None,
            stderr_tail: StderrTail::new(),
            responses: Arc::new(ResponseTable::new()),
            closed: Arc::new(AtomicBool::new(true)),
            next_id: AtomicI64::new(1),
            thread_id: None,
            current_turn_id: Arc::new(Mutex::new(None)),
            start_opts: CodexStartOptions::default(),
        }
    }

    pub fn is_available() -> bool {
        which::which("codex").is_ok() || std::env::var("CODEX_EXECUTABLE").is_ok()
    }

    pub fn is_alive(&self) -> bool {
        self.child.is_some() && !self.closed.load(Ordering::Acquire)
    }

    pub fn thread_id(&self) -> Option<&str> {
        self.thread_id.as_deref()
    }

    pub fn stderr_tail(&self) -> String {
        self.stderr_tail.snapshot()
    }

    pub fn spawn(&mut self) -> Result<(), BridgeError> {
        if self.is_alive() {
            self.stop();
        }

        let mut cmd = Command::new(&self.executable);
        cmd.current_dir(&self.cwd)
            .arg("app-server")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| BridgeError::Spawn(self.executable.display().to_string(), e))?;

        let stdin = child.stdin.take().ok_or(BridgeError::BrokenPipe)?;
        let stdout = child.stdout.take().ok_or(BridgeError::BrokenPipe)?;
        let stderr = child.stderr.take().ok_or(BridgeError::BrokenPipe)?;

        self.stop_requested.store(false, Ordering::Release);
        self.closed.store(false, Ordering::Release);
        self.queue = Arc::new(MessageQueue::new(DEFAULT_QUEUE_CAPACITY));
        self.responses = Arc::new(ResponseTable::new());
        self.stderr_tail = StderrTail::new();
        self.current_turn_id = Arc::new(Mutex::new(None));
        self.start_opts = CodexStartOptions::default();
        self.stderr_handle = Some(spawn_stderr_drain(stderr, self.stderr_tail.clone()));
        self.reader_handle = Some(spawn_reader_thread(
            stdout,
            Arc::clone(&self.queue),
            Arc::clone(&self.responses),
            Arc::clone(&self.stop_requested),
            Arc::clone(&self.closed),
            Arc::clone(&self.current_turn_id),
        ));
        self.stdin = Some(Arc::new(Mutex::new(stdin)));
        self.child = Some(child);
        Ok(())
    }

    fn next_request_id(&self) -> RequestId {
        RequestId::Integer(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn write_line(&self, bytes: &[u8]) -> Result<(), BridgeError> {
        use std::io::Write;
        let stdin = self.stdin.as_ref().ok_or(BridgeError::NotRunning)?;
        let mut guard = stdin.lock().unwrap_or_else(|e| e.into_inner());
        guard.write_all(bytes).map_err(|_| BridgeError::BrokenPipe)?;
        guard.write_all(b"\n").map_err(|_| BridgeError::BrokenPipe)?;
        guard.flush().map_err(|_| BridgeError::BrokenPipe)
    }

    fn call(&self, method: &str, params: Value) -> Result<Value, BridgeError> {
        let id = self.next_request_id();
        let request = JsonRpcRequest::new(id.clone(), method, params);
        let bytes = serde_json::to_vec(&request)?;
        self.write_line(&bytes)?;
        match self.responses.wait(&id, RESPONSE_TIMEOUT, &self.closed)? {
            JsonRpcMessage::Response(resp) => Ok(resp.result),
            JsonRpcMessage::Error(err) => Err(map_rpc_error(err.error)),
            other => {
                warn!(?other, "unexpected message shape in response slot");
                Err(BridgeError::BrokenPipe)
            }
        }
    }

    pub fn initialize(&self, client_name: &str, client_version: &str) -> Result<(), BridgeError> {
        self.call(
            "initialize",
            json!({ "clientInfo": { "name": client_name, "version": client_version } }),
        )?;
        let notification = JsonRpcNotification::new("initialized", json!({}));
        let bytes = serde_json::to_vec(&notification)?;
        self.write_line(&bytes)
    }

    pub fn thread_start(&mut self, opts: &CodexStartOptions) -> Result<String, BridgeError> {
        let params = json!({
            "cwd": self.cwd.to_string_lossy(),
            "model": opts.model,
            "approvalPolicy": opts.approval_policy,
            "sandboxPolicy": opts.sandbox_writable_root.as_deref().map(sandbox_policy),
        });
        let result = self.call("thread/start", params)?;
        let thread_id = result["thread"]["id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| decode_err("missing thread.id"))?;
        self.thread_id = Some(thread_id.clone());
        self.start_opts = opts.clone();
        Ok(thread_id)
    }

    pub fn thread_resume(&mut self, thread_id: &str) -> Result<(), BridgeError> {
        self.call("thread/resume", json!({ "threadId": thread_id }))?;
        self.thread_id = Some(thread_id.to_string());
        Ok(())
    }

    pub fn turn_start(&self, input_items: Value) -> Result<String, BridgeError> {
        let thread_id = self.thread_id.clone().ok_or(BridgeError::NotRunning)?;
        let opts = &self.start_opts;
        let params = json!({
            "threadId": thread_id,
            "input": input_items,
            "approvalPolicy": opts.approval_policy,
            "sandboxPolicy": opts.sandbox_writable_root.as_deref().map(sandbox_policy),
            "model": opts.model,
            "effort": opts.effort,
            "summary": opts.summary,
        });
        let result = self.call("turn/start", params)?;
        let turn_id = result["turn"]["id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| decode_err("missing turn.id"))?;
        *self.current_turn_id.lock().unwrap_or_else(|e| e.into_inner()) = Some(turn_id.clone());
        Ok(turn_id)
    }

    /// Codex supports a genuine protocol-level interrupt; the bridge stays
    /// alive for the next prompt afterward.
    pub fn turn_interrupt(&self) -> Result<(), BridgeError> {
        let thread_id = self.thread_id.clone().ok_or(BridgeError::NotRunning)?;
        let turn_id = self.current_turn_id.lock().unwrap_or_else(|e| e.into_inner()).clone();
        self.call("turn/interrupt", json!({ "threadId": thread_id, "turnId": turn_id }))?;
        Ok(())
    }

    pub fn respond_approval(&self, request_id: RequestId, decision: ApprovalDecision) -> Result<(), BridgeError> {
        let response = JsonRpcResponse::new(request_id, json!({ "decision": decision.as_str() }));
        let bytes = serde_json::to_vec(&response)?;
        self.write_line(&bytes)
    }

    pub fn read_event(&self) -> Option<CodexEvent> {
        self.queue.pop()
    }

    pub fn read_event_with_deadline(&self, deadline: Instant) -> PopOutcome<CodexEvent> {
        self.queue.pop_with_deadline(deadline)
    }

    pub fn stop(&mut self) {
        self.stop_requested.store(true, Ordering::Release);
        self.closed.store(true, Ordering::Release);
        self.queue.stop();
        self.responses.cv.notify_all();

        if let Some(mut child) = self.child.take() {
            unsafe {
                libc::kill(child.id() as i32, libc::SIGTERM);
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
        self.thread_id = None;
    }
}

impl Drop for CodexBridge {
    fn drop(&mut self) {
        if self.is_alive() {
            self.stop();
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn spawn_reader_thread(
    stdout: std::process::ChildStdout,
    queue: Arc<MessageQueue<CodexEvent>>,
    responses: Arc<ResponseTable>,
    stop_requested: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
    current_turn_id: Arc<Mutex<Option<String>>>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        let mut reader = LineReader::new(stdout);
        loop {
            if stop_requested.load(Ordering::Acquire) {
                break;
            }
            match reader.read_line() {
                Ok(LineReadOutcome::Line(bytes)) => {
                    let line = String::from_utf8_lossy(&bytes).into_owned();
                    handle_line(&line, &queue, &responses, &current_turn_id);
                }
                Ok(LineReadOutcome::Eof) => {
                    debug!("codex stdout closed");
                    break;
                }
                Err(err) => {
                    warn!(error = %err, "codex reader thread stopping on error");
                    break;
                }
            }
        }
        closed.store(true, Ordering::Release);
        queue.stop();
        responses.cv.notify_all();
    })
}

fn handle_line(
    line: &str,
    queue: &Arc<MessageQueue<CodexEvent>>,
    responses: &Arc<ResponseTable>,
    current_turn_id: &Arc<Mutex<Option<String>>>,
) {
    let message = match JsonRpcMessage::from_line(line) {
        Ok(m) => m,
        Err(err) => {
            warn!(error = %err, "failed to decode codex jsonrpc line");
            return;
        }
    };

    match message {
        JsonRpcMessage::Response(resp) => responses.deposit(resp.id.clone(), JsonRpcMessage::Response(resp)),
        JsonRpcMessage::Error(err) => responses.deposit(err.id.clone(), JsonRpcMessage::Error(err)),
        JsonRpcMessage::Request(req) => {
            match DecodedApprovalRequest::from_method(&req.method, req.id.clone(), req.params.clone().unwrap_or(Value::Null)) {
                Some(approval) => {
                    let _ = queue.push(CodexEvent::Approval(approval));
                }
                None => warn!(method = %req.method, "unsupported server-initiated request"),
            }
        }
        JsonRpcMessage::Notification(notif) => {
            let value = serde_json::to_value(&notif).unwrap_or(Value::Null);
            match serde_json::from_value::<CodexNotification>(value) {
                Ok(notification) => {
                    let active_turn = current_turn_id.lock().unwrap_or_else(|e| e.into_inner()).clone();
                    if let (Some(active), Some(incoming)) = (&active_turn, notification.turn_id()) {
                        if active != incoming {
                            debug!(active, incoming, "dropping notification for stale turn");
                            return;
                        }
                    }
                    if let CodexNotification::TurnStarted { params } = &notification {
                        *current_turn_id.lock().unwrap_or_else(|e| e.into_inner()) = Some(params.turn_id.clone());
                    }
                    let _ = queue.push(CodexEvent::Notification(notification));
                }
                Err(err) => warn!(error = %err, "failed to decode codex notification"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_bridge_is_not_alive() {
        let bridge = CodexBridge::new(PathBuf::from("."));
        assert!(!bridge.is_alive());
        assert!(bridge.thread_id().is_none());
    }

    #[test]
    fn turn_start_without_thread_fails_not_running() {
        let bridge = CodexBridge::new(PathBuf::from("."));
        assert!(matches!(bridge.turn_start(json!([])), Err(BridgeError::NotRunning)));
    }

    #[test]
    fn auth_marker_in_error_message_maps_to_auth_required() {
        let err = JsonRpcErrorObject {
            code: 401,
            message: "Please LOGIN to authenticate".to_string(),
            data: None,
        };
        assert!(matches!(map_rpc_error(err), BridgeError::AuthRequired(_)));
    }

    #[test]
    fn unrelated_error_message_maps_to_decode_error() {
        let err = JsonRpcErrorObject {
            code: -32601,
            message: "method not found".to_string(),
            data: None,
        };
        assert!(matches!(map_rpc_error(err), BridgeError::Decode(_)));
    }
}
