//! Mock serial link for testing
//!
//! Simulates the controller board without hardware. It provides:
//! - scripted replies keyed on the start of the frame written
//! - unsolicited incoming bytes
//! - a log of every frame written, for test verification
//! - write-failure injection
//!
//! # Example
//!
//! ```
//! use bench_daq::adapters::{MockAdapter, SerialLink};
//!
//! let mut link = MockAdapter::new();
//! link.reply_to("A_", "A_1.5_2.5_!\r\n");
//! link.write_frame(b"A_!\r\n").unwrap();
//! assert_eq!(link.read_waiting().unwrap(), b"A_1.5_2.5_!\r\n");
//! ```

use crate::adapters::SerialLink;
use crate::error::{AppResult, DaqError};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Default)]
struct MockState {
    replies: VecDeque<(String, Vec<u8>)>,
    incoming: VecDeque<u8>,
    sent: Vec<String>,
}

/// Scripted serial link. Clones share state, so a test can keep one clone for
/// inspection while the controller owns another.
#[derive(Clone, Default)]
pub struct MockAdapter {
    state: Arc<Mutex<MockState>>,
    should_fail_next: Arc<AtomicBool>,
}

impl MockAdapter {
    /// Create a mock with no scripted replies
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue `reply` for the next frame written that starts with `prefix`.
    ///
    /// Replies are consumed once, in the order they were queued.
    pub fn reply_to(&self, prefix: &str, reply: &str) {
        self.lock()
            .replies
            .push_back((prefix.to_string(), reply.as_bytes().to_vec()));
    }

    /// Make bytes available without any request.
    pub fn push_incoming(&self, bytes: &[u8]) {
        self.lock().incoming.extend(bytes.iter().copied());
    }

    /// Inject a failure for the next write
    pub fn inject_next_failure(&self) {
        self.should_fail_next.store(true, Ordering::SeqCst);
    }

    /// Every frame written so far, decoded as text.
    pub fn sent(&self) -> Vec<String> {
        self.lock().sent.clone()
    }

    /// Clear the sent log
    pub fn clear_log(&self) {
        self.lock().sent.clear();
    }

    /// Scripted replies not yet consumed.
    pub fn pending_replies(&self) -> usize {
        self.lock().replies.len()
    }
}

impl SerialLink for MockAdapter {
    fn name(&self) -> &str {
        "mock"
    }

    fn write_frame(&mut self, frame: &[u8]) -> AppResult<()> {
        if self.should_fail_next.swap(false, Ordering::SeqCst) {
            return Err(DaqError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "injected write failure",
            )));
        }

        let text = String::from_utf8_lossy(frame).into_owned();
        let mut state = self.lock();
        if let Some(pos) = state
            .replies
            .iter()
            .position(|(prefix, _)| text.starts_with(prefix.as_str()))
        {
            if let Some((_, reply)) = state.replies.remove(pos) {
                state.incoming.extend(reply);
            }
        }
        state.sent.push(text);
        Ok(())
    }

    fn bytes_waiting(&mut self) -> AppResult<usize> {
        Ok(self.lock().incoming.len())
    }

    fn read_waiting(&mut self) -> AppResult<Vec<u8>> {
        Ok(self.lock().incoming.drain(..).collect())
    }

    fn clear_input(&mut self) -> AppResult<()> {
        self.lock().incoming.clear();
        Ok(())
    }
}
