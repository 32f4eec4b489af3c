use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Instant;

/// Bounded FIFO shared between a bridge's reader thread (producer) and its
/// turn-engine consumer. Full queue blocks the producer on the condvar
/// instead of dropping messages — backpressure, not loss. `stop()` wakes
/// every waiter (producer and consumer alike) so shutdown never deadlocks.
pub struct MessageQueue<T> {
    inner: Mutex<VecDeque<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
    stopped: AtomicBool,
}

pub enum PopOutcome<T> {
    Message(T),
    Closed,
    Timeout,
}

impl<T> MessageQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
            stopped: AtomicBool::new(false),
        }
    }

    /// Blocks until there is room, then pushes. Returns `Err(message)` if
    /// the queue was stopped before room became available.
    pub fn push(&self, message: T) -> Result<(), T> {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        while guard.len() >= self.capacity && !self.stopped.load(Ordering::Acquire) {
            guard = self.not_full.wait(guard).unwrap_or_else(|e| e.into_inner());
        }
        if self.stopped.load(Ordering::Acquire) {
            return Err(message);
        }
        guard.push_back(message);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Pops the oldest message, blocking indefinitely until one is
    /// available or the queue is stopped.
    pub fn pop(&self) -> Option<T> {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if let Some(message) = guard.pop_front() {
                self.not_full.notify_one();
                return Some(message);
            }
            if self.stopped.load(Ordering::Acquire) {
                return None;
            }
            guard = self.not_empty.wait(guard).unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Pops with a deadline. Recommended poll slice for callers who need to
    /// interleave cancellation checks is 250ms.
    pub fn pop_with_deadline(&self, deadline: Instant) -> PopOutcome<T> {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if let Some(message) = guard.pop_front() {
                self.not_full.notify_one();
                return PopOutcome::Message(message);
            }
            if self.stopped.load(Ordering::Acquire) {
                return PopOutcome::Closed;
            }
            let now = Instant::now();
            if now >= deadline {
                return PopOutcome::Timeout;
            }
            let (next_guard, timeout_result) = self
                .not_empty
                .wait_timeout(guard, deadline - now)
                .unwrap_or_else(|e| e.into_inner());
            guard = next_guard;
            if timeout_result.timed_out() && guard.is_empty() {
                return PopOutcome::Timeout;
            }
        }
    }

    /// Wakes every blocked producer/consumer; further pushes are rejected
    /// and further pops drain whatever remains before returning `None`.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn push_then_pop_is_fifo() {
        let q: MessageQueue<i32> = MessageQueue::new(4);
        q.push(1).expect("push");
        q.push(2).expect("push");
        assert_eq!(q.pop(), Some(1));
        assert_eq!(q.pop(), Some(2));
    }

    #[test]
    fn stop_wakes_blocked_pop() {
        let q: Arc<MessageQueue<i32>> = Arc::new(MessageQueue::new(4));
        let q2 = Arc::clone(&q);
        let handle = thread::spawn(move || q2.pop());
        thread::sleep(Duration::from_millis(20));
        q.stop();
        assert_eq!(handle.join().expect("join"), None);
    }

    #[test]
    fn full_queue_blocks_producer_until_consumer_pops() {
        let q: Arc<MessageQueue<i32>> = Arc::new(MessageQueue::new(1));
        q.push(1).expect("first push fits");

        let q2 = Arc::clone(&q);
        let handle = thread::spawn(move || q2.push(2));

        thread::sleep(Duration::from_millis(20));
        assert_eq!(q.pop(), Some(1));
        handle.join().expect("join").expect("second push succeeds once room frees");
        assert_eq!(q.pop(), Some(2));
    }

    #[test]
    fn pop_with_deadline_times_out_on_empty_queue() {
        let q: MessageQueue<i32> = MessageQueue::new(4);
        let deadline = Instant::now() + Duration::from_millis(20);
        assert!(matches!(q.pop_with_deadline(deadline), PopOutcome::Timeout));
    }

    #[test]
    fn stopped_push_returns_message_back() {
        let q: MessageQueue<i32> = MessageQueue::new(1);
        q.stop();
        assert_eq!(q.push(5), Err(5));
    }
}
