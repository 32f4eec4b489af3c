use std::collections::VecDeque;
use std::io::Read;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

const LIMIT_BYTES: usize = 32 * 1024;

/// Captures a child's stderr into a small bounded ring buffer so a crash can
/// be reported with context instead of a bare "process exited".
#[derive(Clone)]
pub struct StderrTail(Arc<Mutex<VecDeque<u8>>>);

impl StderrTail {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(VecDeque::new())))
    }

    pub fn snapshot(&self) -> String {
        let buf = self.0.lock().unwrap_or_else(|e| e.into_inner());
        String::from_utf8_lossy(&buf.iter().copied().collect::<Vec<u8>>()).into_owned()
    }

    fn push(&self, chunk: &[u8]) {
        let mut buf = self.0.lock().unwrap_or_else(|e| e.into_inner());
        buf.extend(chunk.iter().copied());
        while buf.len() > LIMIT_BYTES {
            buf.pop_front();
        }
    }
}

impl Default for StderrTail {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawns a thread that drains `stderr` into `tail` until EOF. The handle is
/// joined by the bridge alongside its reader thread during `stop()`.
pub fn spawn_stderr_drain<R: Read + Send + 'static>(mut stderr: R, tail: StderrTail) -> JoinHandle<()> {
    std::thread::spawn(move || {
        let mut buf = [0_u8; 4096];
        loop {
            match stderr.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => tail.push(&buf[..n]),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn ring_buffer_keeps_only_the_tail() {
        let tail = StderrTail::new();
        tail.push(&[b'a'; 40_000]);
        tail.push(b"END");
        let snapshot = tail.snapshot();
        assert!(snapshot.len() <= LIMIT_BYTES);
        assert!(snapshot.ends_with("END"));
    }
}
