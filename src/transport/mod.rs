//! # Transport and Expect Buffer
//!
//! A [`Transport`] moves bytes to and from the engine: `send`, a receive
//! bounded by a timeout, and `terminate`. [`Expect`] sits on top of it,
//! buffering whatever arrives and handing out classified chunks.
//!
//! ## Implementations
//!
//! - [`PtyTransport`]: the real engine on a pseudo-terminal
//! - [`ScriptedTransport`]: canned replies for tests and benchmarks
//!
//! ## Failure modes
//!
//! | Condition | Result |
//! |-----------|--------|
//! | nothing arrived within the timeout | [`ExpectError::TimedOut`] |
//! | bytes arrived but no rule matches them | [`ExpectError::NotFound`] |
//! | the engine exited or the session was closed | [`ExpectError::Closed`] |
//! | the pipe failed | [`ExpectError::Transport`] |
//!
//! The first two are not errors for the session; it simply asks again.

pub mod pty;
pub mod scripted;

pub use pty::PtyTransport;
pub use scripted::{ScriptedTransport, SentLog};

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::classifier::{self, Category, RuleSet};
use crate::error::DriverError;

/// Why a receive returned without data
#[derive(Debug, thiserror::Error)]
pub enum RecvError {
    #[error("receive timed out")]
    Timeout,
    #[error("engine output closed")]
    Closed,
    #[error("receive failed: {0}")]
    Io(#[from] io::Error),
}

/// Byte pipe to the engine process
pub trait Transport: Send {
    /// Write bytes to the engine's input.
    fn send(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Wait up to `timeout` for the next chunk of engine output.
    fn recv_timeout(&mut self, timeout: Duration) -> Result<Vec<u8>, RecvError>;

    /// Stop the engine process. Must be safe to call more than once.
    fn terminate(&mut self) -> io::Result<()>;
}

/// Why an expect call returned without a match
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExpectError {
    #[error("timed out waiting for engine output")]
    TimedOut,
    #[error("no pattern matched the engine output")]
    NotFound,
    #[error("engine connection closed")]
    Closed,
    #[error("{0}")]
    Transport(String),
}

impl ExpectError {
    /// Whether the caller should simply try again
    pub fn is_retryable(&self) -> bool {
        matches!(self, ExpectError::TimedOut | ExpectError::NotFound)
    }
}

impl From<ExpectError> for DriverError {
    fn from(e: ExpectError) -> Self {
        match e {
            ExpectError::Closed => DriverError::Closed,
            other => DriverError::Transport(other.to_string()),
        }
    }
}

/// Shared flag marking a session as closed
///
/// Checked by [`Expect`] before every I/O so that a worker blocked in the
/// conversation notices a close within one read timeout.
#[derive(Debug, Clone, Default)]
pub struct CloseHandle {
    closed: Arc<AtomicBool>,
}

impl CloseHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// A classified chunk of engine output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    pub category: Category,
    pub text: String,
}

/// Buffered, pattern-driven conversation with the engine
pub struct Expect {
    transport: Box<dyn Transport>,
    buffer: Vec<u8>,
    timeout: Duration,
    closed: CloseHandle,
}

impl Expect {
    pub fn new(transport: Box<dyn Transport>, timeout: Duration, closed: CloseHandle) -> Self {
        Expect {
            transport,
            buffer: Vec::new(),
            timeout,
            closed,
        }
    }

    /// Send text to the engine.
    pub fn send(&mut self, text: &str) -> Result<(), ExpectError> {
        if self.closed.is_closed() {
            return Err(ExpectError::Closed);
        }
        tracing::trace!(bytes = text.len(), text = %text.escape_debug(), "engine_send");
        self.transport
            .send(text.as_bytes())
            .map_err(|e| ExpectError::Transport(e.to_string()))
    }

    /// Return the next chunk that one of `rules` recognises.
    ///
    /// Reads for at most one timeout period when nothing matches the bytes
    /// already buffered.
    pub fn expect(&mut self, rules: &RuleSet) -> Result<Match, ExpectError> {
        loop {
            if self.closed.is_closed() {
                return Err(ExpectError::Closed);
            }

            if let Some(classified) = rules.classify(&self.buffer) {
                let text = self.take(classified.consumed);
                tracing::trace!(category = %classified.category, text = %text.escape_debug(), "engine_output");
                return Ok(Match {
                    category: classified.category,
                    text,
                });
            }

            self.fill()?;
        }
    }

    /// Wait for the idle prompt, discarding anything printed before it.
    pub fn wait_for_prompt(&mut self) -> Result<(), ExpectError> {
        loop {
            if self.closed.is_closed() {
                return Err(ExpectError::Closed);
            }

            if let Some(end) = classifier::find_prompt(&self.buffer) {
                let skipped = self.take(end);
                tracing::trace!(skipped = %skipped.escape_debug(), "engine_prompt");
                return Ok(());
            }

            self.fill()?;
        }
    }

    /// Stop the engine process.
    pub fn terminate(&mut self) -> io::Result<()> {
        self.transport.terminate()
    }

    /// Send directly, ignoring the closed flag. Used while shutting down.
    pub(crate) fn send_unchecked(&mut self, text: &str) -> io::Result<()> {
        self.transport.send(text.as_bytes())
    }

    /// Bytes received but not yet consumed
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    fn fill(&mut self) -> Result<(), ExpectError> {
        match self.transport.recv_timeout(self.timeout) {
            Ok(chunk) => {
                self.buffer.extend_from_slice(&chunk);
                Ok(())
            }
            Err(RecvError::Timeout) if self.buffer.is_empty() => Err(ExpectError::TimedOut),
            Err(RecvError::Timeout) => Err(ExpectError::NotFound),
            Err(RecvError::Closed) => Err(ExpectError::Closed),
            Err(RecvError::Io(e)) => Err(ExpectError::Transport(e.to_string())),
        }
    }

    fn take(&mut self, len: usize) -> String {
        let taken: Vec<u8> = self.buffer.drain(..len).collect();
        String::from_utf8_lossy(&taken).into_owned()
    }
}
