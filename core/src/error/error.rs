use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Worker(#[from] WorkerError),
    #[error("command failed: {0}")]
    Command(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

#[derive(Error, Debug)]
pub enum WorkerError {
    /// Invalid settings or a missing acknowledgment. Fatal before any task runs.
    #[error("config error: {0}")]
    Config(String),
    #[error("io error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid task pattern: {0}")]
    Pattern(#[from] glob::PatternError),
    #[error("settings file error: {0}")]
    Settings(String),
    #[error("record error: {0}")]
    Record(#[from] RecordError),
    #[error(transparent)]
    Transition(#[from] crate::state::TransitionError),
}

impl WorkerError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Problems decoding the content of a lock or terminal entry.
#[derive(Error, Debug)]
pub enum RecordError {
    #[error("claim record is not valid json: {0}")]
    Claim(#[from] serde_json::Error),
    #[error("exec log header missing field `{0}`")]
    MissingField(&'static str),
    #[error("exec log header field `{field}` is invalid: {value}")]
    InvalidField { field: &'static str, value: String },
    #[error("exec log has no output section")]
    MissingOutput,
    #[error("exec log task section is truncated (expected {expected} bytes)")]
    TruncatedTask { expected: usize },
}

/// Problems driving an agent process once it has been spawned.
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("agent {stream} stream failed: {source}")]
    StreamIo {
        stream: &'static str,
        source: std::io::Error,
    },
    #[error("agent command could not be planned: {0}")]
    Plan(String),
}
