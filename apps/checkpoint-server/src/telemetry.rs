//! Logging for the session server.
//!
//! Three outputs: stderr for operators, plus the two artifacts kept next to
//! the grade file. The transcript log only receives events with target
//! [`TRANSCRIPT`]; the server log receives everything else. The artifact
//! files are attached once the grading directory exists, and output logged
//! before that is discarded.

use std::fs::File;
use std::io;
use std::sync::Arc;

use clap::ValueEnum;
use mission_core::{GradeError, GradePaths};
use parking_lot::Mutex;
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    filter::filter_fn, fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

use crate::bridge::TRANSCRIPT;

pub const LOG_FILTER_ENV: &str = "CHECKPOINT_LOG";

#[derive(Clone, Copy, Debug, Default, ValueEnum, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }

    pub fn to_filter(self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum InitError {
    #[error("failed to configure logger: {0}")]
    Configure(String),
    #[error(transparent)]
    Artifact(#[from] GradeError),
}

/// A file that may not exist yet. Writes are dropped until one is attached.
#[derive(Clone, Default)]
struct DeferredFile {
    file: Arc<Mutex<Option<File>>>,
}

impl DeferredFile {
    fn attach(&self, file: File) {
        *self.file.lock() = Some(file);
    }
}

impl io::Write for DeferredFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.file.lock().as_mut() {
            Some(file) => file.write(buf),
            None => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.lock().as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

pub struct Telemetry {
    transcript: DeferredFile,
    server: DeferredFile,
    _guards: [WorkerGuard; 2],
}

impl Telemetry {
    pub fn init(level: LogLevel) -> Result<Self, InitError> {
        let transcript = DeferredFile::default();
        let server = DeferredFile::default();
        let (transcript_writer, transcript_guard) = tracing_appender::non_blocking(transcript.clone());
        let (server_writer, server_guard) = tracing_appender::non_blocking(server.clone());

        let max_level = level.to_filter();
        let stderr_layer = fmt::layer()
            .with_writer(io::stderr)
            .with_target(level >= LogLevel::Debug)
            .with_filter(build_env_filter(level));
        let transcript_layer = fmt::layer()
            .with_ansi(false)
            .with_target(false)
            .with_level(false)
            .with_writer(transcript_writer)
            .with_filter(filter_fn(|meta| meta.target() == TRANSCRIPT));
        let server_layer = fmt::layer()
            .with_ansi(false)
            .with_writer(server_writer)
            .with_filter(filter_fn(move |meta| {
                meta.target() != TRANSCRIPT && max_level >= *meta.level()
            }));

        tracing_subscriber::registry()
            .with(stderr_layer)
            .with(transcript_layer)
            .with(server_layer)
            .try_init()
            .map_err(|err| InitError::Configure(err.to_string()))?;

        Ok(Self {
            transcript,
            server,
            _guards: [transcript_guard, server_guard],
        })
    }

    /// Starts writing the transcript and server logs into the grading
    /// directory. The directory must already exist.
    pub fn attach(&self, paths: &GradePaths) -> Result<(), InitError> {
        self.transcript
            .attach(mission_core::grade::open_private_log(&paths.transcript_log)?);
        self.server
            .attach(mission_core::grade::open_private_log(&paths.server_log)?);
        Ok(())
    }
}

fn build_env_filter(level: LogLevel) -> EnvFilter {
    match std::env::var(LOG_FILTER_ENV) {
        Ok(filter) => EnvFilter::new(filter),
        Err(_) => EnvFilter::new(format!("{},hyper=warn,tower_http=info", level.as_str())),
    }
}
