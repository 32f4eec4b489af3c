use std::io::Read;
use std::os::fd::AsRawFd;
use std::time::Instant;

use super::byte_queue::ByteQueue;
use super::readable_wait::{clamp_to_poll_slice, wait_readable};

const DEFAULT_MAX_LINE_BYTES: usize = 4 * 1024 * 1024;
const READ_CHUNK: usize = 64 * 1024;

#[derive(Debug)]
pub enum LineReadOutcome {
    Line(Vec<u8>),
    Eof,
    Timeout,
}

#[derive(Debug, thiserror::Error)]
pub enum LineReaderError {
    #[error("line exceeded max length of {0} bytes")]
    LineTooLong(usize),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reads newline-delimited frames out of any readable, pollable source
/// (typically a child process's stdout pipe). Empty lines are skipped; a
/// trailing unterminated chunk at EOF is returned as a final line.
pub struct LineReader<R> {
    inner: R,
    queue: ByteQueue,
    max_line_bytes: usize,
}

impl<R: Read + AsRawFd> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            queue: ByteQueue::new(),
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }

    pub fn with_max_line_bytes(inner: R, max_line_bytes: usize) -> Self {
        Self {
            inner,
            queue: ByteQueue::new(),
            max_line_bytes,
        }
    }

    /// Reads one line, blocking with no deadline until one arrives or EOF.
    pub fn read_line(&mut self) -> Result<LineReadOutcome, LineReaderError> {
        self.read_line_inner(None)
    }

    /// Reads one line, failing with `Timeout` if `deadline` passes first.
    pub fn read_line_with_deadline(&mut self, deadline: Instant) -> Result<LineReadOutcome, LineReaderError> {
        self.read_line_inner(Some(deadline))
    }

    fn read_line_inner(&mut self, deadline: Option<Instant>) -> Result<LineReadOutcome, LineReaderError> {
        loop {
            if let Some(pos) = self.queue.position_of(b'\n') {
                let line = self.queue.as_slice()[..pos].to_vec();
                self.queue.consume(pos + 1);
                if line.is_empty() {
                    continue;
                }
                return Ok(LineReadOutcome::Line(line));
            }
            if self.queue.len() >= self.max_line_bytes {
                return Err(LineReaderError::LineTooLong(self.max_line_bytes));
            }

            if let Some(deadline) = deadline {
                let slice_ms = clamp_to_poll_slice(deadline);
                let readable = wait_readable(self.inner.as_raw_fd(), slice_ms)?;
                if !readable {
                    if Instant::now() >= deadline {
                        return Ok(LineReadOutcome::Timeout);
                    }
                    continue;
                }
            }

            let mut chunk = [0_u8; READ_CHUNK];
            let n = self.inner.read(&mut chunk)?;
            if n == 0 {
                if self.queue.is_empty() {
                    return Ok(LineReadOutcome::Eof);
                }
                let rest = self.queue.as_slice().to_vec();
                self.queue.clear();
                return Ok(LineReadOutcome::Line(rest));
            }
            self.queue.append(&chunk[..n]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::fd::{BorrowedFd, FromRawFd, OwnedFd, RawFd};

    struct PipeEnd(OwnedFd);

    impl Read for PipeEnd {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let fd = self.0.as_raw_fd();
            let n = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
            if n < 0 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(n as usize)
        }
    }

    impl AsRawFd for PipeEnd {
        fn as_raw_fd(&self) -> RawFd {
            self.0.as_raw_fd()
        }
    }

    fn make_pipe() -> (PipeEnd, std::fs::File) {
        let mut fds = [0; 2];
        assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
        let read_end = unsafe { OwnedFd::from_raw_fd(fds[0]) };
        let write_end = unsafe { std::fs::File::from_raw_fd(fds[1]) };
        (PipeEnd(read_end), write_end)
    }

    #[allow(dead_code)]
    fn keep_borrowed(_fd: BorrowedFd) {}

    #[test]
    fn reads_simple_lines() {
        let (read_end, mut write_end) = make_pipe();
        write_end.write_all(b"line one\nline two\n").expect("write");
        drop(write_end);

        let mut reader = LineReader::new(read_end);
        match reader.read_line().expect("read") {
            LineReadOutcome::Line(l) => assert_eq!(l, b"line one"),
            other => panic!("expected line, got {other:?}"),
        }
        match reader.read_line().expect("read") {
            LineReadOutcome::Line(l) => assert_eq!(l, b"line two"),
            other => panic!("expected line, got {other:?}"),
        }
        match reader.read_line().expect("read") {
            LineReadOutcome::Eof => {}
            other => panic!("expected eof, got {other:?}"),
        }
    }

    #[test]
    fn skips_empty_lines() {
        let (read_end, mut write_end) = make_pipe();
        write_end.write_all(b"\n\nonly\n").expect("write");
        drop(write_end);

        let mut reader = LineReader::new(read_end);
        match reader.read_line().expect("read") {
            LineReadOutcome::Line(l) => assert_eq!(l, b"only"),
            other => panic!("expected line, got {other:?}"),
        }
    }

    #[test]
    fn unterminated_trailing_chunk_is_returned_at_eof() {
        let (read_end, mut write_end) = make_pipe();
        write_end.write_all(b"no newline here").expect("write");
        drop(write_end);

        let mut reader = LineReader::new(read_end);
        match reader.read_line().expect("read") {
            LineReadOutcome::Line(l) => assert_eq!(l, b"no newline here"),
            other => panic!("expected line, got {other:?}"),
        }
    }

    #[test]
    fn oversized_line_is_rejected() {
        let (read_end, mut write_end) = make_pipe();
        write_end.write_all(&vec![b'a'; 100]).expect("write");
        write_end.write_all(b"\n").expect("write");
        drop(write_end);

        let mut reader = LineReader::with_max_line_bytes(read_end, 10);
        let err = reader.read_line().expect_err("should reject oversized line");
        assert!(matches!(err, LineReaderError::LineTooLong(10)));
    }

    #[test]
    fn times_out_on_idle_pipe() {
        let (read_end, write_end) = make_pipe();
        let mut reader = LineReader::new(read_end);
        let deadline = Instant::now() + std::time::Duration::from_millis(30);
        match reader.read_line_with_deadline(deadline).expect("read") {
            LineReadOutcome::Timeout => {}
            other => panic!("expected timeout, got {other:?}"),
        }
        drop(write_end);
    }
}
