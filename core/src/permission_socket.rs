use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use banjo_protocol::hook::{HookRequest, HookResponse};
use tracing::{debug, info, warn};

use crate::error::PermissionSocketError;

const DEFAULT_HOOK_TIMEOUT: Duration = Duration::from_secs(60);

/// A non-blocking Unix-domain listener for the permission hook's
/// one-request/one-response protocol, bound at
/// `/tmp/banjo-<session_id>.sock`. Removed on drop.
pub struct PermissionSocket {
    listener: UnixListener,
    path: PathBuf,
}

impl PermissionSocket {
    pub fn bind(session_id: &str) -> Result<Self, PermissionSocketError> {
        let path = PathBuf::from(format!("/tmp/banjo-{session_id}.sock"));
        Self::bind_at(&path)
    }

    pub fn bind_at(path: &Path) -> Result<Self, PermissionSocketError> {
        if path.exists() {
            let _ = std::fs::remove_file(path);
        }
        let listener = UnixListener::bind(path).map_err(|source| PermissionSocketError::Bind {
            path: path.to_path_buf(),
            source,
        })?;
        listener.set_nonblocking(true)?;
        Ok(Self {
            listener,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Non-blocking accept: `Ok(None)` means no pending connection yet.
    pub fn try_accept(&self) -> Result<Option<UnixStream>, PermissionSocketError> {
        match self.listener.accept() {
            Ok((stream, _addr)) => Ok(Some(stream)),
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

impl Drop for PermissionSocket {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Reads one line, decodes a `HookRequest`, asks `decide`, writes back the
/// `HookResponse` line, then lets the connection close.
pub fn handle_connection<F>(stream: UnixStream, decide: F) -> Result<(), PermissionSocketError>
where
    F: FnOnce(&HookRequest) -> HookResponse,
{
    stream.set_read_timeout(Some(DEFAULT_HOOK_TIMEOUT))?;
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut line = String::new();

    let deadline = Instant::now() + DEFAULT_HOOK_TIMEOUT;
    let read = reader.read_line(&mut line)?;
    if read == 0 {
        debug!("hook connection closed before sending a request");
        return Ok(());
    }
    if Instant::now() > deadline {
        return Err(PermissionSocketError::Timeout);
    }

    let request: HookRequest = serde_json::from_str(line.trim_end())?;
    info!(tool = %request.tool_name, tool_use_id = %request.tool_use_id, "permission hook connected");
    let response = decide(&request);

    let mut writer = stream;
    let mut payload = serde_json::to_vec(&response).map_err(PermissionSocketError::Decode)?;
    payload.push(b'\n');
    writer.write_all(&payload)?;
    writer.flush()?;
    Ok(())
}

/// Drains every ready connection on `socket` without blocking, applying
/// `decide` to each. Logs and skips connections that fail mid-handshake
/// rather than propagating — one bad hook request shouldn't wedge the loop.
pub fn drain_ready<F>(socket: &PermissionSocket, mut decide: F)
where
    F: FnMut(&HookRequest) -> HookResponse,
{
    loop {
        match socket.try_accept() {
            Ok(Some(stream)) => {
                if let Err(err) = handle_connection(stream, &mut decide) {
                    warn!(error = %err, "permission hook connection failed");
                }
            }
            Ok(None) => break,
            Err(err) => {
                warn!(error = %err, "permission socket accept failed");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use banjo_protocol::hook::HookDecision;
    use serde_json::json;
    use std::io::Read;
    use tempfile::tempdir;

    #[test]
    fn round_trips_a_request_and_response() {
        let dir = tempdir().expect("tempdir");
        let socket_path = dir.path().join("test.sock");
        let socket = PermissionSocket::bind_at(&socket_path).expect("bind");

        let client_path = socket_path.clone();
        let client = std::thread::spawn(move || {
            let mut stream = loop {
                match UnixStream::connect(&client_path) {
                    Ok(s) => break s,
                    Err(_) => std::thread::sleep(Duration::from_millis(5)),
                }
            };
            let req = json!({
                "tool_name": "Bash",
                "tool_input": {"command": "ls"},
                "tool_use_id": "t1",
                "session_id": "s1",
            });
            let mut line = serde_json::to_vec(&req).expect("serialize");
            line.push(b'\n');
            stream.write_all(&line).expect("write");

            let mut response = String::new();
            stream.read_to_string(&mut response).expect("read");
            response
        });

        let stream = loop {
            if let Some(stream) = socket.try_accept().expect("accept") {
                break stream;
            }
            std::thread::sleep(Duration::from_millis(5));
        };
        handle_connection(stream, |req| {
            assert_eq!(req.tool_name, "Bash");
            HookResponse::allow()
        })
        .expect("handle");

        let response_line = client.join().expect("join");
        let decoded: HookResponse = serde_json::from_str(response_line.trim_end()).expect("decode");
        assert_eq!(decoded.decision, HookDecision::Allow);
    }

    #[test]
    fn drop_removes_socket_file() {
        let dir = tempdir().expect("tempdir");
        let socket_path = dir.path().join("cleanup.sock");
        {
            let _socket = PermissionSocket::bind_at(&socket_path).expect("bind");
            assert!(socket_path.exists());
        }
        assert!(!socket_path.exists());
    }
}
