use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::bridge::{Decoded, Utf8Stream};
use crate::protocol::ServerFrame;
use crate::pty::{PtyInput, PtyOutput, SessionPty};
use crate::session::SessionHandle;

const FRAME_BACKLOG: usize = 256;
const SCROLLBACK_LIMIT: usize = 64 * 1024;

/// Shared access to the session pty for terminal connections.
///
/// Output frames fan out through a broadcast channel so every attached view
/// renders the same stream without going through the session loop.
#[derive(Clone)]
pub struct TerminalHub {
    pty: Arc<SessionPty>,
    input: PtyInput,
    fanout: Fanout,
}

impl TerminalHub {
    pub fn new(pty: SessionPty, input: PtyInput) -> Self {
        Self {
            pty: Arc::new(pty),
            input,
            fanout: Fanout::new(SCROLLBACK_LIMIT),
        }
    }

    /// Joins the output stream. The returned scrollback covers everything
    /// published before the receiver was created.
    pub fn attach(&self) -> Attachment {
        self.fanout.attach()
    }

    pub fn write_input(&self, payload: &str) -> anyhow::Result<()> {
        self.input.send(payload)
    }

    pub fn resize(&self, cols: u16, rows: u16) -> anyhow::Result<()> {
        self.pty.resize(cols, rows)
    }

    pub fn shutdown(&self) {
        self.pty.shutdown();
    }

    /// Relays pty output to terminal views and, separately, to the session
    /// loop for classification. Completes when the program exits.
    pub fn spawn_pump(
        &self,
        mut output: PtyOutput,
        session: SessionHandle,
        exited: Arc<Notify>,
    ) -> JoinHandle<()> {
        let hub = self.clone();
        tokio::spawn(async move {
            let mut decoder = Utf8Stream::new();
            while let Some(chunk) = output.next_chunk().await {
                match chunk {
                    Ok(bytes) => {
                        let decoded = decoder.push(&bytes);
                        hub.forward(&session, decoded);
                    }
                    Err(err) => {
                        error!(error = %err, "pty read failed");
                        break;
                    }
                }
            }
            hub.forward(&session, decoder.finish());

            match hub.pty.exit_status() {
                Some(status) => info!(success = status.success(), "session program exited"),
                None => info!("pty closed"),
            }
            hub.fanout.disconnect();
            session.program_exited();
            exited.notify_one();
        })
    }

    fn forward(&self, session: &SessionHandle, decoded: Decoded) {
        if decoded.text.is_empty() {
            return;
        }
        if decoded.malformed > 0 {
            warn!(
                malformed = decoded.malformed,
                "malformed UTF-8 in program output; skipped for classification"
            );
        }
        session.output(decoded.classifiable());
        self.fanout.stdout(decoded.text);
    }
}

/// What a newly attached view needs to catch up, plus its live feed.
pub struct Attachment {
    pub scrollback: String,
    pub disconnected: bool,
    pub frames: broadcast::Receiver<String>,
}

impl Attachment {
    /// Frames to send before anything from [`Attachment::frames`].
    pub fn catch_up(&self) -> Vec<ServerFrame> {
        let mut frames = Vec::new();
        if !self.scrollback.is_empty() {
            frames.push(ServerFrame::Stdout(self.scrollback.clone()));
        }
        if self.disconnected {
            frames.push(ServerFrame::Disconnect);
        }
        frames
    }
}

#[derive(Debug)]
struct Scrollback {
    text: String,
    limit: usize,
    disconnected: bool,
}

impl Scrollback {
    fn push(&mut self, text: &str) {
        self.text.push_str(text);
        if self.text.len() <= self.limit {
            return;
        }
        let mut cut = self.text.len() - self.limit;
        while !self.text.is_char_boundary(cut) {
            cut += 1;
        }
        self.text.drain(..cut);
    }
}

/// Broadcast of output frames with a bounded record of recent stdout.
///
/// Publishing and attaching hold the same lock, so a view sees each frame
/// exactly once: either in its scrollback or on its receiver.
#[derive(Clone)]
struct Fanout {
    frames: broadcast::Sender<String>,
    scrollback: Arc<Mutex<Scrollback>>,
}

impl Fanout {
    fn new(limit: usize) -> Self {
        let (frames, _) = broadcast::channel(FRAME_BACKLOG);
        Self {
            frames,
            scrollback: Arc::new(Mutex::new(Scrollback {
                text: String::new(),
                limit,
                disconnected: false,
            })),
        }
    }

    fn stdout(&self, text: String) {
        let mut scrollback = self.scrollback.lock();
        scrollback.push(&text);
        self.send(ServerFrame::Stdout(text));
    }

    fn disconnect(&self) {
        let mut scrollback = self.scrollback.lock();
        scrollback.disconnected = true;
        self.send(ServerFrame::Disconnect);
    }

    fn attach(&self) -> Attachment {
        let scrollback = self.scrollback.lock();
        Attachment {
            scrollback: scrollback.text.clone(),
            disconnected: scrollback.disconnected,
            frames: self.frames.subscribe(),
        }
    }

    fn send(&self, frame: ServerFrame) {
        if self.frames.send(frame.to_json()).is_err() {
            debug!("no terminal views attached");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn late_view_catches_up_then_follows_live_output() {
        let fanout = Fanout::new(SCROLLBACK_LIMIT);
        fanout.stdout("Welcome to the lab\r\n".into());
        fanout.stdout("$ ".into());

        let mut attachment = fanout.attach();
        assert_eq!(attachment.scrollback, "Welcome to the lab\r\n$ ");
        assert_eq!(
            attachment.catch_up(),
            vec![ServerFrame::Stdout("Welcome to the lab\r\n$ ".into())]
        );

        fanout.stdout("ls\r\n".into());
        assert_eq!(
            attachment.frames.recv().await.unwrap(),
            ServerFrame::Stdout("ls\r\n".into()).to_json()
        );
        assert!(attachment.frames.try_recv().is_err());
    }

    #[test]
    fn fresh_view_has_nothing_to_catch_up() {
        let fanout = Fanout::new(SCROLLBACK_LIMIT);
        assert!(fanout.attach().catch_up().is_empty());
    }

    #[test]
    fn view_attaching_after_exit_is_told_about_the_disconnect() {
        let fanout = Fanout::new(SCROLLBACK_LIMIT);
        fanout.stdout("bye\r\n".into());
        fanout.disconnect();
        assert_eq!(
            fanout.attach().catch_up(),
            vec![
                ServerFrame::Stdout("bye\r\n".into()),
                ServerFrame::Disconnect
            ]
        );
    }

    #[test]
    fn scrollback_keeps_the_newest_output_within_its_limit() {
        let mut scrollback = Scrollback {
            text: String::new(),
            limit: 8,
            disconnected: false,
        };
        scrollback.push("abcdef");
        scrollback.push("ghij");
        assert_eq!(scrollback.text, "cdefghij");

        scrollback.push("é€");
        assert_eq!(scrollback.text, "hijé€");
    }

    #[test]
    fn scrollback_trims_on_character_boundaries() {
        let mut scrollback = Scrollback {
            text: String::new(),
            limit: 4,
            disconnected: false,
        };
        scrollback.push("€€");
        assert_eq!(scrollback.text, "€");
    }
}
