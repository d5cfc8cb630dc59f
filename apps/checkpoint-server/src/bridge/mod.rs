//! Reconstructs logical terminal events from raw pty traffic.
//!
//! Two cooperating state machines sit behind [`Interceptor`]: [`input`]
//! accumulates keystrokes into submitted commands, and [`output`] cleans,
//! filters and debounces program output. They share only [`SharedInput`].
//! Raw bytes are relayed to clients elsewhere; nothing here can hold them up.

pub mod decoder;
pub mod input;
pub mod output;

use std::time::Duration;

use mission_core::TerminalEvent;
use tokio::time::Instant;
use tracing::{debug, info};

pub use decoder::{Decoded, Utf8Stream};
pub use output::{EchoPolicy, OutputCleaner, OutputDebouncer, DEFAULT_DEBOUNCE};

/// Target of the session transcript log.
pub const TRANSCRIPT: &str = "transcript";

/// Keystroke state read by the output side to recognise terminal echo.
#[derive(Debug, Default, Clone)]
pub struct SharedInput {
    last_keystroke: String,
    pending: String,
}

impl SharedInput {
    pub fn last_keystroke(&self) -> &str {
        &self.last_keystroke
    }

    pub fn pending_command(&self) -> &str {
        &self.pending
    }

    fn set_last_keystroke(&mut self, payload: &str) {
        self.last_keystroke.clear();
        self.last_keystroke.push_str(payload);
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BridgeConfig {
    pub debounce: Duration,
    pub echo: EchoPolicy,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            echo: EchoPolicy::default(),
        }
    }
}

pub struct Interceptor {
    shared: SharedInput,
    cleaner: OutputCleaner,
    debouncer: OutputDebouncer,
    echo: EchoPolicy,
}

impl Interceptor {
    pub fn new(config: BridgeConfig) -> Result<Self, regex::Error> {
        Ok(Self {
            shared: SharedInput::default(),
            cleaner: OutputCleaner::new()?,
            debouncer: OutputDebouncer::new(config.debounce),
            echo: config.echo,
        })
    }

    pub fn shared(&self) -> &SharedInput {
        &self.shared
    }

    /// Processes one client keystroke payload. Buffered output is flushed
    /// ahead of each submitted command so it is never attributed to it.
    pub fn on_input(&mut self, payload: &str) -> Vec<TerminalEvent> {
        let mut events = Vec::new();
        for command in input::accumulate(&mut self.shared, payload) {
            events.extend(self.flush());
            info!(target: TRANSCRIPT, "User Command: {command}");
            events.push(TerminalEvent::command(command));
        }
        events
    }

    /// Buffers decoded program output unless it looks like echo. Returns the
    /// re-armed flush deadline when the text was kept.
    pub fn on_output(&mut self, text: &str, now: Instant) -> Option<Instant> {
        let cleaned = self.cleaner.clean(text);
        if cleaned.is_empty() {
            return None;
        }
        if self.echo.suppresses(&self.shared, &cleaned) {
            debug!(chars = cleaned.len(), "suppressed terminal echo");
            return None;
        }
        Some(self.debouncer.push(cleaned, now))
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.debouncer.deadline()
    }

    /// Flushes only if the quiet period has elapsed.
    pub fn flush_due(&mut self, now: Instant) -> Option<TerminalEvent> {
        match self.debouncer.deadline() {
            Some(deadline) if deadline <= now => self.flush(),
            _ => None,
        }
    }

    /// Emits whatever output is buffered as a single event.
    pub fn flush(&mut self) -> Option<TerminalEvent> {
        if !self.debouncer.is_pending() {
            return None;
        }
        let content = self.debouncer.take()?;
        info!(target: TRANSCRIPT, "Program Output: {content}");
        Some(TerminalEvent::output(content))
    }
}
