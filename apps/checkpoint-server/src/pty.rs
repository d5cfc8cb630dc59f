//! The session program on a pseudo-terminal.
//!
//! [`SessionPty::open`] starts the program described by a [`LaunchSpec`]
//! and splits the master side into a [`PtyOutput`] stream, fed by a
//! dedicated reader thread, and a cloneable [`PtyInput`] for keystrokes.

use std::io::{self, Read, Write};
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use portable_pty::{native_pty_system, Child, ExitStatus, MasterPty, PtySize};
use tokio::sync::mpsc;
use tracing::debug;

use crate::launch::LaunchSpec;

/// errno the Linux pty master returns once every slave descriptor is closed.
const EIO: i32 = 5;
const READ_CHUNK: usize = 4096;
const CHUNK_BACKLOG: usize = 64;

/// Window size used until a terminal view reports its own.
pub const INITIAL_SIZE: PtySize = PtySize {
    rows: 24,
    cols: 80,
    pixel_width: 0,
    pixel_height: 0,
};

pub struct SessionPty {
    master: Mutex<Box<dyn MasterPty + Send>>,
    child: Mutex<Option<Box<dyn Child + Send + Sync>>>,
}

impl SessionPty {
    pub fn open(launch: &LaunchSpec) -> Result<(Self, PtyOutput, PtyInput)> {
        let pair = native_pty_system()
            .openpty(INITIAL_SIZE)
            .context("open pty pair")?;
        let child = pair
            .slave
            .spawn_command(launch.to_command())
            .with_context(|| format!("start {}", launch.program))?;
        // The reader only sees EOF once our copy of the slave is gone too.
        drop(pair.slave);

        let master = pair.master;
        let reader = master.try_clone_reader().context("clone pty reader")?;
        let writer = master.take_writer().context("take pty writer")?;
        let output = PtyOutput::start(reader)?;

        let pty = Self {
            master: Mutex::new(master),
            child: Mutex::new(Some(child)),
        };
        Ok((pty, output, PtyInput::new(writer)))
    }

    /// Exit status if the program has already finished.
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.child
            .lock()
            .as_mut()
            .and_then(|child| child.try_wait().ok().flatten())
    }

    pub fn resize(&self, cols: u16, rows: u16) -> Result<()> {
        let size = PtySize {
            rows,
            cols,
            ..INITIAL_SIZE
        };
        self.master.lock().resize(size).context("resize pty")
    }

    /// Kills the program if it is still running. Idempotent.
    pub fn shutdown(&self) {
        if let Some(mut child) = self.child.lock().take() {
            if let Err(err) = child.kill() {
                debug!(error = %err, "session program already gone");
            }
            let _ = child.wait();
        }
    }
}

impl Drop for SessionPty {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Program output in arrival order.
pub struct PtyOutput {
    chunks: mpsc::Receiver<io::Result<Vec<u8>>>,
}

impl PtyOutput {
    fn start(mut reader: Box<dyn Read + Send>) -> Result<Self> {
        let (tx, chunks) = mpsc::channel(CHUNK_BACKLOG);
        thread::Builder::new()
            .name("pty-reader".into())
            .spawn(move || {
                let mut buffer = [0u8; READ_CHUNK];
                loop {
                    let chunk = match reader.read(&mut buffer) {
                        Ok(0) => break,
                        Ok(n) => Ok(buffer[..n].to_vec()),
                        Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                        Err(err) if err.raw_os_error() == Some(EIO) => break,
                        Err(err) => Err(err),
                    };
                    let failed = chunk.is_err();
                    if tx.blocking_send(chunk).is_err() || failed {
                        break;
                    }
                }
                debug!("pty reader finished");
            })
            .context("start pty reader thread")?;
        Ok(Self { chunks })
    }

    /// Next block of output. `None` once the program side has closed.
    pub async fn next_chunk(&mut self) -> Option<io::Result<Vec<u8>>> {
        self.chunks.recv().await
    }
}

/// Keystroke sink shared by every terminal connection.
#[derive(Clone)]
pub struct PtyInput {
    writer: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl PtyInput {
    fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Arc::new(Mutex::new(writer)),
        }
    }

    pub fn send(&self, payload: &str) -> Result<()> {
        let mut writer = self.writer.lock();
        writer.write_all(payload.as_bytes()).context("write to pty")?;
        writer.flush().context("flush pty")
    }
}
