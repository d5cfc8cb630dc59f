//! Mission tracking for checkpoint terminal sessions.
//!
//! Missions are an ordered list of tasks, each completed when a listener
//! pattern matches a reconstructed terminal event. This crate holds the
//! synchronous pieces: listener matching, the mission cursor, and durable
//! grade persistence. The network and pty plumbing live in
//! `checkpoint-server`.

pub mod error;
pub mod event;
pub mod grade;
pub mod matcher;
pub mod mission;
pub mod tracker;

pub use error::{ConfigError, GradeError, PatternCompileError, PatternError};
pub use event::{EventKind, TerminalEvent};
pub use grade::{GradePaths, GradeRecord, GradeStore};
pub use matcher::{evaluate, Listener, ListenerKind, MatchResult, Matcher, PartialMatcher};
pub use mission::{Mission, MissionDefinition, MissionSet, MissionSummary, SessionDefinition};
pub use tracker::{Advance, MissionState, MissionTracker, Phase};
