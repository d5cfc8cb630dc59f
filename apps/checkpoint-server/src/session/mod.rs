//! The single-owner session loop.
//!
//! Everything that mutates mission progress, the output debounce buffer, or
//! the subscriber registry runs inside [`Session::run`], one command at a
//! time. Connections talk to it through a cloneable [`SessionHandle`].

pub mod registry;

use axum::extract::ws::Message;
use mission_core::{GradeStore, MissionTracker, TerminalEvent};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::bridge::{Interceptor, TRANSCRIPT};
use crate::protocol::{MissionMessage, ProtocolError};

pub use registry::{BroadcastMetrics, SubscriberRegistry, DEFAULT_CHANNEL_DEPTH};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to encode mission message: {0}")]
    Encode(#[from] ProtocolError),
}

#[derive(Debug)]
pub enum SessionCommand {
    Subscribe {
        id: Uuid,
        sender: mpsc::Sender<Message>,
    },
    Unsubscribe {
        id: Uuid,
    },
    /// A keystroke payload from a terminal client.
    Input(String),
    /// Decoded program output, already stripped of malformed sequences.
    Output(String),
    TerminalClosed,
    ProgramExited,
}

#[derive(Clone, Debug)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<SessionCommand>,
}

impl SessionHandle {
    fn send(&self, command: SessionCommand) {
        if self.tx.send(command).is_err() {
            debug!("session loop has stopped; command dropped");
        }
    }

    pub fn subscribe(&self, id: Uuid, sender: mpsc::Sender<Message>) {
        self.send(SessionCommand::Subscribe { id, sender });
    }

    pub fn unsubscribe(&self, id: Uuid) {
        self.send(SessionCommand::Unsubscribe { id });
    }

    pub fn input(&self, payload: impl Into<String>) {
        self.send(SessionCommand::Input(payload.into()));
    }

    pub fn output(&self, text: impl Into<String>) {
        self.send(SessionCommand::Output(text.into()));
    }

    pub fn terminal_closed(&self) {
        self.send(SessionCommand::TerminalClosed);
    }

    pub fn program_exited(&self) {
        self.send(SessionCommand::ProgramExited);
    }
}

pub struct Session {
    tracker: MissionTracker,
    grades: GradeStore,
    interceptor: Interceptor,
    subscribers: SubscriberRegistry,
}

impl Session {
    pub fn new(tracker: MissionTracker, grades: GradeStore, interceptor: Interceptor) -> Self {
        Self {
            tracker,
            grades,
            interceptor,
            subscribers: SubscriberRegistry::new(),
        }
    }

    pub fn spawn(self) -> (SessionHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(self.run(rx));
        (SessionHandle { tx }, task)
    }

    /// Runs until every handle is dropped, then flushes buffered output.
    pub async fn run(mut self, mut rx: mpsc::UnboundedReceiver<SessionCommand>) {
        loop {
            let deadline = self.interceptor.deadline();
            tokio::select! {
                command = rx.recv() => {
                    let Some(command) = command else { break };
                    if let Err(err) = self.dispatch(command) {
                        warn!(error = %err, "session command failed");
                    }
                }
                _ = flush_timer(deadline) => {
                    if let Some(event) = self.interceptor.flush_due(Instant::now()) {
                        if let Err(err) = self.observe(event) {
                            warn!(error = %err, "output event failed");
                        }
                    }
                }
            }
        }

        if let Err(err) = self.flush_pending() {
            warn!(error = %err, "final flush failed");
        }
        debug!("session loop stopped");
    }

    fn dispatch(&mut self, command: SessionCommand) -> Result<(), SessionError> {
        match command {
            SessionCommand::Subscribe { id, sender } => self.attach(id, sender),
            SessionCommand::Unsubscribe { id } => {
                let remaining = self.subscribers.unregister(id);
                info!(subscriber_id = %id, remaining, "mission subscriber detached");
                Ok(())
            }
            SessionCommand::Input(payload) => {
                for event in self.interceptor.on_input(&payload) {
                    self.observe(event)?;
                }
                Ok(())
            }
            SessionCommand::Output(text) => {
                self.interceptor.on_output(&text, Instant::now());
                Ok(())
            }
            SessionCommand::TerminalClosed => {
                self.flush_pending()?;
                info!(target: TRANSCRIPT, "Terminal connection closed");
                Ok(())
            }
            SessionCommand::ProgramExited => {
                self.flush_pending()?;
                info!("session program exited");
                Ok(())
            }
        }
    }

    fn attach(&mut self, id: Uuid, sender: mpsc::Sender<Message>) -> Result<(), SessionError> {
        let count = self.subscribers.register(id, sender);
        info!(subscriber_id = %id, subscribers = count, "mission subscriber attached");
        let state = self.tracker.state();
        let init = MissionMessage::init(state, self.tracker.missions().summaries()).to_json()?;
        self.subscribers.send_to(id, Message::Text(init));
        self.grades.update(state.completed());
        Ok(())
    }

    fn flush_pending(&mut self) -> Result<(), SessionError> {
        match self.interceptor.flush() {
            Some(event) => self.observe(event),
            None => Ok(()),
        }
    }

    fn observe(&mut self, event: TerminalEvent) -> Result<(), SessionError> {
        let Some(advance) = self.tracker.observe(&event) else {
            return Ok(());
        };
        self.grades.update(advance.state.completed());
        let message =
            MissionMessage::mission_complete(advance.state, self.tracker.missions().summaries())
                .to_json()?;
        let metrics = self.subscribers.broadcast(Message::Text(message));
        info!(
            mission = advance.mission,
            completed = advance.state.completed(),
            total = advance.state.total,
            delivered = metrics.delivered,
            "mission progress broadcast"
        );
        if advance.state.is_complete() {
            info!(total = advance.state.total, "all missions complete");
        }
        Ok(())
    }
}

async fn flush_timer(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
