//! Pseudo-terminal transport for the real engine.
//!
//! The engine only behaves like an interactive toplevel (prompts, `;`
//! continuation) when attached to a terminal, so it runs on a pty. A reader
//! thread drains the pty master into a channel; `recv_timeout` reads from
//! that channel.

use crossbeam_channel as channel;
use portable_pty::{native_pty_system, Child, ChildKiller, CommandBuilder, MasterPty, PtySize};
use std::io::{self, Read, Write};
use std::time::Duration;

use super::{RecvError, Transport};
use crate::config::EngineConfig;
use crate::error::{DriverError, DriverResult};

const READ_CHUNK: usize = 4096;

/// The engine process attached to a pseudo-terminal
pub struct PtyTransport {
    writer: Box<dyn Write + Send>,
    output: channel::Receiver<Vec<u8>>,
    child: Box<dyn Child + Send + Sync>,
    // Keeps the master side open for the lifetime of the transport
    _master: Box<dyn MasterPty + Send>,
    terminated: bool,
}

impl PtyTransport {
    /// Start the configured engine on a fresh pseudo-terminal.
    pub fn spawn(config: &EngineConfig) -> DriverResult<Self> {
        let pair = native_pty_system()
            .openpty(PtySize {
                rows: config.pty_rows,
                cols: config.pty_cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| DriverError::Spawn(format!("openpty: {e}")))?;

        let mut cmd = CommandBuilder::new(&config.executable);
        cmd.args(&config.args);

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| DriverError::Spawn(format!("{}: {e}", config.executable.display())))?;
        // The child holds its own copy; ours would keep the pty open after exit.
        drop(pair.slave);

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| DriverError::Spawn(format!("pty reader: {e}")))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| DriverError::Spawn(format!("pty writer: {e}")))?;

        let (tx, rx) = channel::unbounded();
        std::thread::Builder::new()
            .name("trealla-pty-reader".to_string())
            .spawn(move || Self::reader_loop(reader, &tx))
            .map_err(|e| DriverError::Spawn(format!("Failed to spawn reader thread: {e}")))?;

        tracing::debug!(
            executable = %config.executable.display(),
            pid = ?child.process_id(),
            "engine_spawned"
        );

        Ok(PtyTransport {
            writer,
            output: rx,
            child,
            _master: pair.master,
            terminated: false,
        })
    }

    /// Copies pty output into the channel until EOF or the receiver goes away.
    fn reader_loop(mut reader: Box<dyn Read + Send>, tx: &channel::Sender<Vec<u8>>) {
        let mut buf = [0u8; READ_CHUNK];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if tx.send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    // Linux reports EIO on the master once the child has gone.
                    tracing::debug!(error = %e, "pty_read_end");
                    break;
                }
            }
        }
    }
}

impl Transport for PtyTransport {
    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.writer.write_all(bytes)?;
        self.writer.flush()
    }

    fn recv_timeout(&mut self, timeout: Duration) -> Result<Vec<u8>, RecvError> {
        match self.output.recv_timeout(timeout) {
            Ok(chunk) => Ok(chunk),
            Err(channel::RecvTimeoutError::Timeout) => Err(RecvError::Timeout),
            Err(channel::RecvTimeoutError::Disconnected) => Err(RecvError::Closed),
        }
    }

    fn terminate(&mut self) -> io::Result<()> {
        if self.terminated {
            return Ok(());
        }
        self.terminated = true;

        if let Ok(Some(status)) = self.child.try_wait() {
            tracing::debug!(?status, "engine_already_exited");
            return Ok(());
        }
        self.child.kill()?;
        let status = self.child.wait()?;
        tracing::debug!(?status, "engine_terminated");
        Ok(())
    }
}

impl Drop for PtyTransport {
    fn drop(&mut self) {
        if let Err(e) = self.terminate() {
            tracing::warn!(error = %e, "engine_terminate_failed");
        }
    }
}
