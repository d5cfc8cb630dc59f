use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// A mission listener whose regex could not be compiled.
#[derive(Debug, Error)]
#[error("mission {index} ({title:?}) has an invalid pattern {pattern:?}: {source}")]
pub struct PatternCompileError {
    /// Zero-based position of the mission in the configured list.
    pub index: usize,
    pub title: String,
    pub pattern: String,
    #[source]
    pub source: regex::Error,
}

#[derive(Debug, Error)]
pub enum PatternError {
    #[error("invalid regex: {0}")]
    Regex(#[from] regex::Error),
    #[error("pattern cannot be used for partial matching: {0}")]
    Automaton(#[from] regex_automata::dfa::dense::BuildError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read mission config {path:?}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to parse mission config {path:?}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("mission config {path:?} has an empty program command")]
    EmptyProgram { path: PathBuf },
    #[error(transparent)]
    Pattern(#[from] PatternCompileError),
}

#[derive(Debug, Error)]
pub enum GradeError {
    #[error("io error on {path:?}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("grade record encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

impl GradeError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        GradeError::Io {
            path: path.into(),
            source,
        }
    }
}
