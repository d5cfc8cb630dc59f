//! Browser terminal sessions with mission tracking.
//!
//! One pty-backed program per process. Its byte stream is relayed verbatim to
//! terminal websocket clients while [`bridge`] reconstructs commands and
//! output for the [`session`] loop, which advances missions, persists grades
//! and notifies mission-channel subscribers.

pub mod bridge;
pub mod cli;
pub mod launch;
pub mod protocol;
pub mod pty;
pub mod routes;
pub mod server;
pub mod session;
pub mod telemetry;
pub mod terminal;
pub mod validate;
pub mod workspace;
