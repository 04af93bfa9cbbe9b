//! In-memory transport that replays a fixed conversation.
//!
//! Each `reply` entry answers one `send`, in order; its chunks are then
//! delivered one per receive. Once the script runs dry, receives time out.
//!
//! ```rust,ignore
//! let transport = ScriptedTransport::new()
//!     .greeting("?- ")
//!     .reply(&["   X = 1\r\n;"])   // answers the goal
//!     .reply(&["   X = 2.\r\n?- "]); // answers the ";"
//! let log = transport.sent_log();
//! ```

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::{RecvError, Transport};

const IDLE_POLL: Duration = Duration::from_millis(5);

#[derive(Debug, Clone)]
struct Reply {
    chunks: Vec<String>,
    hang_up: bool,
}

/// Everything written to a [`ScriptedTransport`], observable after it has
/// been handed to a session
#[derive(Debug, Clone, Default)]
pub struct SentLog {
    sent: Arc<Mutex<Vec<String>>>,
    terminated: Arc<AtomicBool>,
}

impl SentLog {
    pub fn entries(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    /// How many sends were exactly `text`
    pub fn count(&self, text: &str) -> usize {
        self.sent.lock().iter().filter(|s| *s == text).count()
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }
}

/// Transport replaying canned engine output
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    pending: VecDeque<String>,
    replies: VecDeque<Reply>,
    hung_up: bool,
    closing: bool,
    log: SentLog,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Output available before anything is sent (banner and first prompt).
    pub fn greeting(mut self, chunk: &str) -> Self {
        self.pending.push_back(chunk.to_string());
        self
    }

    /// Output produced in answer to the next unanswered send.
    pub fn reply(mut self, chunks: &[&str]) -> Self {
        self.replies.push_back(Reply {
            chunks: chunks.iter().map(|c| (*c).to_string()).collect(),
            hang_up: false,
        });
        self
    }

    /// Like `reply`, after which the engine output closes.
    pub fn reply_then_hang_up(mut self, chunks: &[&str]) -> Self {
        self.replies.push_back(Reply {
            chunks: chunks.iter().map(|c| (*c).to_string()).collect(),
            hang_up: true,
        });
        self
    }

    pub fn sent_log(&self) -> SentLog {
        self.log.clone()
    }
}

impl Transport for ScriptedTransport {
    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        if self.log.is_terminated() || self.hung_up {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "engine exited"));
        }
        self.log
            .sent
            .lock()
            .push(String::from_utf8_lossy(bytes).into_owned());

        if let Some(reply) = self.replies.pop_front() {
            self.pending.extend(reply.chunks);
            self.closing |= reply.hang_up;
        }
        Ok(())
    }

    fn recv_timeout(&mut self, timeout: Duration) -> Result<Vec<u8>, RecvError> {
        if self.log.is_terminated() || self.hung_up {
            return Err(RecvError::Closed);
        }
        if let Some(chunk) = self.pending.pop_front() {
            return Ok(chunk.into_bytes());
        }
        if self.closing {
            self.hung_up = true;
            return Err(RecvError::Closed);
        }
        std::thread::sleep(timeout.min(IDLE_POLL));
        Err(RecvError::Timeout)
    }

    fn terminate(&mut self) -> io::Result<()> {
        self.log.terminated.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replies_follow_sends() {
        let mut t = ScriptedTransport::new()
            .greeting("?- ")
            .reply(&["a\n", "b\n"]);
        let log = t.sent_log();
        let timeout = Duration::from_millis(1);

        assert_eq!(t.recv_timeout(timeout).unwrap(), b"?- ");
        assert!(matches!(t.recv_timeout(timeout), Err(RecvError::Timeout)));

        t.send(b"go.\n").unwrap();
        assert_eq!(t.recv_timeout(timeout).unwrap(), b"a\n");
        assert_eq!(t.recv_timeout(timeout).unwrap(), b"b\n");
        assert_eq!(log.entries(), vec!["go.\n".to_string()]);
        assert_eq!(log.count("go.\n"), 1);
    }

    #[test]
    fn test_hang_up_and_terminate() {
        let mut t = ScriptedTransport::new().reply_then_hang_up(&["bye\n"]);
        let log = t.sent_log();
        t.send(b"halt.\n").unwrap();
        assert_eq!(t.recv_timeout(Duration::ZERO).unwrap(), b"bye\n");
        assert!(matches!(t.recv_timeout(Duration::ZERO), Err(RecvError::Closed)));
        assert!(t.send(b"x").is_err());

        assert!(!log.is_terminated());
        t.terminate().unwrap();
        assert!(log.is_terminated());
    }
}
