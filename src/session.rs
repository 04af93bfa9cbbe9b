//! # Session Engine
//!
//! One [`Session`] drives one engine process through its interactive
//! toplevel: consulting files and proving goals.
//!
//! ## Architecture
//!
//! ```text
//! Session
//! ├── conversation: Arc<Mutex<Expect>>   (transport + output buffer)
//! ├── state: Starting → Ready ⇄ Loading / Querying → Closed
//! ├── closed: CloseHandle                (checked before every I/O)
//! └── message sink                       (free-text engine output)
//!
//! query() ──► worker thread "trealla-query"
//!               │ holds the conversation until the prompt returns
//!               ├── gate (bounded(1))      first decisive outcome
//!               └── solutions (bounded(0)) one binding set per pull
//! ```
//!
//! ## Query protocol
//!
//! The goal is sent as `goal.\n`. The worker classifies every chunk of
//! output and reacts:
//!
//! | Category | Reaction |
//! |----------|----------|
//! | `Prompt` | done |
//! | `WantMore` | send `;` |
//! | `False` / `True` | outcome decided, no solutions |
//! | `Error` | outcome decided, error text reported |
//! | `Result` | proved; publish the bindings; send `;` if the engine asks |
//! | echoes | skipped |
//! | `Message` | passed through; a trailing outcome, error or binding line is handled as its own category, then the cue |
//!
//! The caller is released as soon as the outcome is known. Solutions are
//! then pulled one at a time: the worker only asks the engine for the next
//! one after the previous one has been taken.
//!
//! ## Limitations
//!
//! - A goal with infinitely many solutions, or one that never terminates,
//!   can only be stopped by closing the session.
//! - Issuing a second call while holding an undrained [`Solutions`] stream
//!   blocks until the stream is drained or dropped.

use crossbeam_channel as channel;
use parking_lot::Mutex;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::classifier::{
    awaits_more, classify_tail, ends_at_prompt, extract_error, extract_message, Category,
    CONSULT_RULES, GOAL_RULES,
};
use crate::config::EngineConfig;
use crate::decode::decode_bindings;
use crate::error::{DriverError, DriverResult};
use crate::term::{build_goal, Arg};
use crate::transport::{CloseHandle, Expect, ExpectError, Match, PtyTransport, Transport};
use crate::value::Solution;

/// Receives free-text engine output (warnings, `print/1` output)
pub type MessageSink = Arc<dyn Fn(&str) + Send + Sync>;

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Starting,
    Ready,
    Loading,
    Querying,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Starting => "starting",
            SessionState::Ready => "ready",
            SessionState::Loading => "loading",
            SessionState::Querying => "querying",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Result of proving a goal
#[derive(Debug)]
pub struct Answer {
    /// Whether the goal was proved
    pub proved: bool,
    /// Variable bindings, present when the engine answered with bindings
    pub solutions: Option<Solutions>,
}

impl Answer {
    /// Drain every remaining solution.
    pub fn into_solutions(self) -> Vec<Solution> {
        self.solutions.map(Iterator::collect).unwrap_or_default()
    }
}

/// Lazy stream of solutions for one query
///
/// Each `next()` lets the engine compute one more solution. The stream ends
/// when the engine returns to its prompt. Dropping it early stops delivery.
#[derive(Debug)]
pub struct Solutions {
    rx: channel::Receiver<Solution>,
}

impl Iterator for Solutions {
    type Item = Solution;

    fn next(&mut self) -> Option<Solution> {
        self.rx.recv().ok()
    }
}

/// First decisive signal of a query, sent through the gate
#[derive(Debug)]
struct Outcome {
    proved: bool,
    streaming: bool,
    error: Option<DriverError>,
}

/// A running engine process
pub struct Session {
    conversation: Arc<Mutex<Expect>>,
    state: Arc<Mutex<SessionState>>,
    closed: CloseHandle,
    halted: AtomicBool,
    sink: Arc<Mutex<Option<MessageSink>>>,
    read_timeout: Duration,
}

impl Session {
    /// Start the engine at `executable` with default settings.
    pub fn spawn(executable: impl Into<PathBuf>) -> DriverResult<Self> {
        Self::spawn_with(&EngineConfig::for_executable(executable))
    }

    /// Start the engine on a pseudo-terminal as configured.
    pub fn spawn_with(config: &EngineConfig) -> DriverResult<Self> {
        let transport = PtyTransport::spawn(config)?;
        Self::with_transport(transport, config)
    }

    /// Run a session over an already-started transport.
    ///
    /// Waits for the engine's first prompt, tolerating
    /// `config.startup_attempts` read timeouts. On failure the transport is
    /// terminated.
    pub fn with_transport(
        transport: impl Transport + 'static,
        config: &EngineConfig,
    ) -> DriverResult<Self> {
        let closed = CloseHandle::new();
        let mut conversation = Expect::new(Box::new(transport), config.read_timeout(), closed.clone());
        let state = Arc::new(Mutex::new(SessionState::Starting));

        handshake(&mut conversation, config.startup_attempts)?;
        *state.lock() = SessionState::Ready;
        tracing::debug!(executable = %config.executable.display(), "session_ready");

        Ok(Session {
            conversation: Arc::new(Mutex::new(conversation)),
            state,
            closed,
            halted: AtomicBool::new(false),
            sink: Arc::new(Mutex::new(None)),
            read_timeout: config.read_timeout(),
        })
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_closed()
    }

    /// Route free-text engine output to `sink` in addition to the log.
    pub fn on_message(&self, sink: impl Fn(&str) + Send + Sync + 'static) {
        *self.sink.lock() = Some(Arc::new(sink));
    }

    /// Consult a source file.
    ///
    /// Engine diagnostics come back as [`DriverError::Consult`] and leave the
    /// session usable. Only the first line of a multi-line diagnostic is kept.
    /// Loading the same file again re-consults it.
    pub fn load(&self, path: impl AsRef<Path>) -> DriverResult<()> {
        self.ensure_open()?;
        let path = path.as_ref();
        let directive = format!("['{}'].\n", escape_quoted(&path.to_string_lossy()));

        let mut conversation = self.conversation.lock();
        self.ensure_open()?;
        self.set_state(SessionState::Loading);

        let started = Instant::now();
        tracing::info!(path = %path.display(), "consult_start");
        let result = self.consult(&mut conversation, &directive);

        match &result {
            Ok(()) => {
                self.set_state(SessionState::Ready);
                tracing::info!(
                    path = %path.display(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "consult_done"
                );
            }
            Err(e) if e.is_fatal() => {
                self.mark_closed();
                tracing::warn!(path = %path.display(), error = %e, "consult_aborted");
            }
            Err(e) => {
                self.set_state(SessionState::Ready);
                tracing::warn!(path = %path.display(), error = %e, "consult_failed");
            }
        }
        result
    }

    /// Prove `predicate(args...)`.
    ///
    /// Returns once the outcome is known; bindings stream through
    /// [`Answer::solutions`]. An engine error term is returned as
    /// [`DriverError::Query`].
    pub fn query(&self, predicate: &str, args: &[Arg]) -> DriverResult<Answer> {
        if predicate.is_empty() {
            return Err(DriverError::InvalidPredicate);
        }
        let goal = panic::catch_unwind(AssertUnwindSafe(|| build_goal(predicate, args)))
            .map_err(|payload| DriverError::Internal(panic_message(payload.as_ref())))??;
        self.query_goal(&goal)
    }

    /// Prove a goal given as term text, with or without the final `.`.
    pub fn query_goal(&self, goal: &str) -> DriverResult<Answer> {
        self.ensure_open()?;
        let goal = goal.trim();
        let goal = goal.strip_suffix('.').unwrap_or(goal);
        if goal.is_empty() {
            return Err(DriverError::InvalidPredicate);
        }

        let (gate_tx, gate_rx) = channel::bounded::<Outcome>(1);
        let (solution_tx, solution_rx) = channel::bounded::<Solution>(0);

        let mut worker = QueryWorker {
            conversation: Arc::clone(&self.conversation),
            state: Arc::clone(&self.state),
            closed: self.closed.clone(),
            sink: self.sink.lock().clone(),
            poll: self.read_timeout,
            gate: Some(gate_tx),
            solutions: Some(solution_tx),
            proved: false,
            streaming: true,
            error: None,
        };
        let line = format!("{goal}.\n");
        tracing::debug!(goal = %goal, "query_start");

        std::thread::Builder::new()
            .name("trealla-query".to_string())
            .spawn(move || {
                let run = panic::catch_unwind(AssertUnwindSafe(|| worker.run(&line)));
                if let Err(payload) = run {
                    let message = panic_message(payload.as_ref());
                    tracing::error!(error = %message, "query_worker_panicked");
                    worker.closed.close();
                    *worker.state.lock() = SessionState::Closed;
                    worker.fail(DriverError::Internal(message));
                }
            })
            .map_err(|e| DriverError::Internal(format!("Failed to spawn query worker: {e}")))?;

        let outcome = gate_rx.recv().map_err(|_| {
            DriverError::Internal("query worker exited without an outcome".to_string())
        })?;

        if let Some(error) = outcome.error {
            return Err(error);
        }
        Ok(Answer {
            proved: outcome.proved,
            solutions: outcome.streaming.then(|| Solutions { rx: solution_rx }),
        })
    }

    /// Shut the engine down. Safe to call repeatedly.
    ///
    /// A query still running notices within one read timeout and stops.
    pub fn close(&self) {
        self.closed.close();
        if self.halted.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut conversation = self.conversation.lock();
        if let Err(e) = conversation.send_unchecked("halt.\n") {
            tracing::debug!(error = %e, "halt_not_sent");
        }
        if let Err(e) = conversation.terminate() {
            tracing::warn!(error = %e, "engine_terminate_failed");
        }
        self.set_state(SessionState::Closed);
        tracing::debug!("session_closed");
    }

    fn consult(&self, conversation: &mut Expect, directive: &str) -> DriverResult<()> {
        conversation.send(directive)?;

        loop {
            let m = match conversation.expect(&CONSULT_RULES) {
                Ok(m) => m,
                Err(e) if e.is_retryable() => continue,
                Err(e) => return Err(e.into()),
            };

            match m.category {
                Category::Prompt => return Ok(()),
                Category::True => {
                    if !ends_at_prompt(&m.text) {
                        await_prompt(conversation)?;
                    }
                    return Ok(());
                }
                Category::Error => {
                    if !ends_at_prompt(&m.text) {
                        await_prompt(conversation)?;
                    }
                    return Err(DriverError::Consult(extract_error(&m.text).to_string()));
                }
                Category::EchoConsult | Category::EchoGoal => continue,
                Category::Message => {
                    let parts = extract_message(&m.text);
                    let sink = self.sink.lock().clone();
                    pass_through(sink.as_ref(), parts.text);

                    let at_prompt = ends_at_prompt(parts.cue);
                    match classify_tail(&CONSULT_RULES, parts.tail) {
                        Some(Category::True) => {
                            if !at_prompt {
                                await_prompt(conversation)?;
                            }
                            return Ok(());
                        }
                        Some(Category::Error) => {
                            if !at_prompt {
                                await_prompt(conversation)?;
                            }
                            let text = extract_error(parts.tail).to_string();
                            return Err(DriverError::Consult(text));
                        }
                        _ => pass_through(sink.as_ref(), parts.tail),
                    }
                    if at_prompt {
                        return Ok(());
                    }
                }
                other => {
                    return Err(DriverError::Protocol(format!(
                        "unexpected {other} while consulting"
                    )));
                }
            }
        }
    }

    fn ensure_open(&self) -> DriverResult<()> {
        if self.closed.is_closed() {
            return Err(DriverError::Closed);
        }
        Ok(())
    }

    fn set_state(&self, state: SessionState) {
        let mut current = self.state.lock();
        if *current != SessionState::Closed {
            *current = state;
        }
    }

    fn mark_closed(&self) {
        self.closed.close();
        *self.state.lock() = SessionState::Closed;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state())
            .finish()
    }
}

enum Flow {
    Continue,
    Done,
}

/// Owns the conversation while one goal is being proved
struct QueryWorker {
    conversation: Arc<Mutex<Expect>>,
    state: Arc<Mutex<SessionState>>,
    closed: CloseHandle,
    sink: Option<MessageSink>,
    poll: Duration,
    gate: Option<channel::Sender<Outcome>>,
    solutions: Option<channel::Sender<Solution>>,
    proved: bool,
    streaming: bool,
    error: Option<String>,
}

impl QueryWorker {
    fn run(&mut self, line: &str) {
        let conversation = Arc::clone(&self.conversation);
        let mut conversation = conversation.lock();
        {
            let mut state = self.state.lock();
            if *state != SessionState::Closed {
                *state = SessionState::Querying;
            }
        }

        if let Err(e) = conversation.send(line) {
            self.abort(e);
            return;
        }

        loop {
            let m = match conversation.expect(&GOAL_RULES) {
                Ok(m) => m,
                Err(e) if e.is_retryable() => continue,
                Err(e) => {
                    self.abort(e);
                    return;
                }
            };

            match self.step(&mut conversation, &m) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Done) => break,
                Err(e) => {
                    self.abort(e);
                    return;
                }
            }
        }

        self.report();
        self.solutions = None;
        let mut state = self.state.lock();
        if *state != SessionState::Closed {
            *state = SessionState::Ready;
        }
        tracing::debug!(proved = self.proved, "query_done");
    }

    fn step(&mut self, conversation: &mut Expect, m: &Match) -> Result<Flow, ExpectError> {
        match m.category {
            Category::Prompt => Ok(Flow::Done),
            Category::WantMore => {
                conversation.send(";")?;
                Ok(Flow::Continue)
            }
            Category::EchoGoal | Category::EchoConsult => Ok(Flow::Continue),
            Category::Message => {
                let parts = extract_message(&m.text);
                pass_through(self.sink.as_ref(), parts.text);

                match classify_tail(&GOAL_RULES, parts.tail) {
                    Some(
                        category @ (Category::True
                        | Category::False
                        | Category::Error
                        | Category::Result),
                    ) => self.settle(category, parts.tail)?,
                    _ => pass_through(self.sink.as_ref(), parts.tail),
                }
                follow(conversation, parts.cue)
            }
            category => {
                self.settle(category, &m.text)?;
                follow(conversation, &m.text)
            }
        }
    }

    /// Record an outcome, error or binding line.
    fn settle(&mut self, category: Category, text: &str) -> Result<(), ExpectError> {
        match category {
            Category::False => self.decide(false),
            Category::True => self.decide(true),
            Category::Error => {
                self.decide(false);
                self.error = Some(extract_error(text).to_string());
            }
            Category::Result => {
                if self.gate.is_some() {
                    self.proved = true;
                    self.report();
                }
                let solution = decode_bindings(text);
                if !solution.is_empty() {
                    self.publish(solution)?;
                }
            }
            _ => {}
        }
        self.report();
        Ok(())
    }

    fn decide(&mut self, proved: bool) {
        self.proved = proved;
        self.streaming = false;
    }

    /// Release the caller with the outcome recorded so far, once.
    fn report(&mut self) {
        let Some(gate) = self.gate.take() else {
            if let Some(error) = self.error.take() {
                tracing::warn!(error = %error, "engine_error_after_outcome");
            }
            return;
        };
        let outcome = Outcome {
            proved: self.proved,
            streaming: self.streaming,
            error: self.error.take().map(DriverError::Query),
        };
        let _ = gate.send(outcome);
    }

    /// Hand one solution to the consumer, waiting until it is pulled.
    fn publish(&mut self, solution: Solution) -> Result<(), ExpectError> {
        let Some(tx) = self.solutions.clone() else {
            return Ok(());
        };

        let mut pending = solution;
        loop {
            if self.closed.is_closed() {
                return Err(ExpectError::Closed);
            }
            match tx.send_timeout(pending, self.poll) {
                Ok(()) => return Ok(()),
                Err(channel::SendTimeoutError::Timeout(back)) => pending = back,
                Err(channel::SendTimeoutError::Disconnected(_)) => {
                    tracing::debug!("solution_stream_dropped");
                    self.solutions = None;
                    return Ok(());
                }
            }
        }
    }

    /// Stop on a broken conversation; the session cannot be used again.
    fn abort(&mut self, e: ExpectError) {
        tracing::warn!(error = %e, "query_aborted");
        self.closed.close();
        *self.state.lock() = SessionState::Closed;
        self.fail(e.into());
    }

    fn fail(&mut self, error: DriverError) {
        self.solutions = None;
        if let Some(gate) = self.gate.take() {
            let _ = gate.send(Outcome {
                proved: false,
                streaming: false,
                error: Some(error),
            });
        }
    }
}

fn handshake(conversation: &mut Expect, attempts: u32) -> DriverResult<()> {
    for attempt in 1..=attempts {
        match conversation.wait_for_prompt() {
            Ok(()) => return Ok(()),
            Err(e) if e.is_retryable() => {
                tracing::debug!(attempt, error = %e, "handshake_retry");
            }
            Err(e) => {
                let _ = conversation.terminate();
                return Err(e.into());
            }
        }
    }

    if let Err(e) = conversation.terminate() {
        tracing::warn!(error = %e, "engine_terminate_failed");
    }
    Err(DriverError::Handshake { attempts })
}

/// React to the cue that ended a chunk: stop at the prompt, or ask for the
/// next solution.
fn follow(conversation: &mut Expect, text: &str) -> Result<Flow, ExpectError> {
    if ends_at_prompt(text) {
        return Ok(Flow::Done);
    }
    if awaits_more(text) {
        conversation.send(";")?;
    }
    Ok(Flow::Continue)
}

fn await_prompt(conversation: &mut Expect) -> DriverResult<()> {
    loop {
        match conversation.wait_for_prompt() {
            Ok(()) => return Ok(()),
            Err(e) if e.is_retryable() => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

fn pass_through(sink: Option<&MessageSink>, text: &str) {
    if text.trim().is_empty() {
        return;
    }
    tracing::info!(target: "trealla_driver::engine", "{}", text.trim_end());
    if let Some(sink) = sink {
        sink(text);
    }
}

/// Escape text for use inside a single-quoted atom.
fn escape_quoted(text: &str) -> String {
    text.replace('\\', "\\\\").replace('\'', "\\'")
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "query panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ScriptedTransport;

    fn config() -> EngineConfig {
        EngineConfig {
            read_timeout_ms: 20,
            ..EngineConfig::default()
        }
    }

    #[test]
    fn test_escape_quoted() {
        assert_eq!(escape_quoted("/tmp/a.pl"), "/tmp/a.pl");
        assert_eq!(escape_quoted("it's.pl"), "it\\'s.pl");
        assert_eq!(escape_quoted("a\\b"), "a\\\\b");
    }

    #[test]
    fn test_state_after_handshake() {
        let session =
            Session::with_transport(ScriptedTransport::new().greeting("?- "), &config()).unwrap();
        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(session.state().to_string(), "ready");
    }

    #[test]
    fn test_close_is_idempotent() {
        let transport = ScriptedTransport::new().greeting("?- ");
        let log = transport.sent_log();
        let session = Session::with_transport(transport, &config()).unwrap();

        session.close();
        session.close();
        drop(session);

        assert_eq!(log.count("halt.\n"), 1);
        assert!(log.is_terminated());
    }

    #[test]
    fn test_empty_goal_rejected() {
        let session =
            Session::with_transport(ScriptedTransport::new().greeting("?- "), &config()).unwrap();
        assert!(matches!(
            session.query("", &[]),
            Err(DriverError::InvalidPredicate)
        ));
        assert!(matches!(
            session.query_goal("  . "),
            Err(DriverError::InvalidPredicate)
        ));
    }

    #[test]
    fn test_encoding_failure_sends_nothing() {
        let transport = ScriptedTransport::new().greeting("?- ");
        let log = transport.sent_log();
        let session = Session::with_transport(transport, &config()).unwrap();

        let err = session.query("p", &[Arg::Float(f64::INFINITY)]).unwrap_err();
        assert!(matches!(err, DriverError::Unsupported(_)));
        assert!(log.entries().is_empty());
    }

    #[test]
    fn test_message_sink_receives_output() {
        let transport = ScriptedTransport::new()
            .greeting("?- ")
            .reply(&["hello\n", "   true.\r\n?- "]);
        let session = Session::with_transport(transport, &config()).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        session.on_message(move |text| seen_clone.lock().push(text.to_string()));

        let answer = session.query_goal("write(hello), nl").unwrap();
        assert!(answer.proved);
        assert!(answer.solutions.is_none());
        assert_eq!(seen.lock().as_slice(), ["hello\n".to_string()]);
    }
}
