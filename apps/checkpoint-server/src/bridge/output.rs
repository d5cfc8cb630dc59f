use std::time::Duration;

use regex::Regex;
use tokio::time::Instant;

use super::SharedInput;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(200);

/// Strips the escape sequences terminals emit around ordinary text and
/// normalises line endings so output can be matched as plain text.
#[derive(Debug, Clone)]
pub struct OutputCleaner {
    sgr: Regex,
    private_mode: Regex,
}

impl OutputCleaner {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            sgr: Regex::new(r"\x1b\[[0-9;]*[mK]")?,
            private_mode: Regex::new(r"\x1b\[\?[0-9]+[hl]")?,
        })
    }

    pub fn clean(&self, raw: &str) -> String {
        let text = self.sgr.replace_all(raw, "");
        let text = self.private_mode.replace_all(&text, "");
        text.replace("\r\n", "\n").replace('\r', "\n").replace('\x08', "")
    }
}

/// Which echo heuristics are applied to cleaned output.
///
/// These comparisons are approximate. A program that legitimately prints the
/// user's last keystroke is dropped (false negative), and echo that arrives
/// merged with other output slips through (false positive).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EchoPolicy {
    /// Drop output equal to the most recent keystroke payload.
    pub last_keystroke: bool,
    /// Drop output equal to the command line typed so far.
    pub pending_command: bool,
    /// Drop output ending with the most recent keystroke payload.
    pub keystroke_suffix: bool,
}

impl Default for EchoPolicy {
    fn default() -> Self {
        Self {
            last_keystroke: true,
            pending_command: true,
            keystroke_suffix: true,
        }
    }
}

impl EchoPolicy {
    pub fn disabled() -> Self {
        Self {
            last_keystroke: false,
            pending_command: false,
            keystroke_suffix: false,
        }
    }

    /// Whitespace-only output is never treated as echo; it carries line
    /// breaks between chunks of real output.
    pub fn suppresses(&self, shared: &SharedInput, cleaned: &str) -> bool {
        let trimmed = cleaned.trim();
        if trimmed.is_empty() {
            return false;
        }
        let keystroke = shared.last_keystroke();
        (self.last_keystroke && trimmed == keystroke)
            || (self.pending_command && trimmed == shared.pending_command())
            || (self.keystroke_suffix && !keystroke.is_empty() && trimmed.ends_with(keystroke))
    }
}

/// Collects cleaned output until the terminal has been quiet for `window`.
///
/// There is a single deadline; every push re-arms it.
#[derive(Debug)]
pub struct OutputDebouncer {
    window: Duration,
    chunks: Vec<String>,
    deadline: Option<Instant>,
}

impl OutputDebouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            chunks: Vec::new(),
            deadline: None,
        }
    }

    pub fn push(&mut self, chunk: String, now: Instant) -> Instant {
        self.chunks.push(chunk);
        let deadline = now + self.window;
        self.deadline = Some(deadline);
        deadline
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Disarms the timer and returns the buffered text, trimmed. `None` when
    /// nothing but whitespace was buffered.
    pub fn take(&mut self) -> Option<String> {
        self.deadline = None;
        let joined = self.chunks.concat();
        self.chunks.clear();
        let trimmed = joined.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }
}
