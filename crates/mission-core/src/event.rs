use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Which stream a terminal event was reconstructed from.
///
/// Listeners use the same enum for their `target`, so a mission only ever
/// inspects events of the kind it declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Command,
    Output,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Command => "command",
            EventKind::Output => "output",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalEvent {
    pub kind: EventKind,
    pub content: String,
    pub timestamp: OffsetDateTime,
}

impl TerminalEvent {
    pub fn new(kind: EventKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    pub fn command(content: impl Into<String>) -> Self {
        Self::new(EventKind::Command, content)
    }

    pub fn output(content: impl Into<String>) -> Self {
        Self::new(EventKind::Output, content)
    }
}
