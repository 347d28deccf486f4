use std::fmt;
use std::io;

use thiserror::Error;

/// How a child process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitState {
    /// Exit code, `None` when the process was terminated by a signal.
    pub code: Option<i32>,
}

impl ExitState {
    pub const SUCCESS: ExitState = ExitState { code: Some(0) };

    pub fn with_code(code: i32) -> Self {
        Self { code: Some(code) }
    }

    pub fn signaled() -> Self {
        Self { code: None }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<std::process::ExitStatus> for ExitState {
    fn from(status: std::process::ExitStatus) -> Self {
        Self {
            code: status.code(),
        }
    }
}

impl fmt::Display for ExitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "exit code {}", code),
            None => write!(f, "terminated by signal"),
        }
    }
}

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("expected a composite record at the top level, got {kind}")]
    NotARecord { kind: &'static str },

    #[error("can't start {program} {args:?}: {source}")]
    Spawn {
        program: String,
        args: Vec<String>,
        #[source]
        source: io::Error,
    },

    #[error("{program} {args:?} failed ({status}), output: {output}")]
    Execution {
        program: String,
        args: Vec<String>,
        status: ExitState,
        output: String,
    },

    #[error("{program} {args:?} reported an error: {stderr}")]
    StderrReported {
        program: String,
        args: Vec<String>,
        stderr: String,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("can't parse pgbackrest JSON: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("pgbackrest info returned no stanza entry")]
    EmptyInfo,

    #[error("can't use repository {selected}: {available} repositories configured")]
    InvalidRepository { selected: String, available: usize },

    #[error("process i/o failed: {0}")]
    Io(#[from] io::Error),

    #[error("background task ended without reporting a result")]
    TaskLost,
}

impl BridgeError {
    /// True when the operation was aborted rather than failed.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, BridgeError::Cancelled)
    }
}

pub type Result<T, E = BridgeError> = std::result::Result<T, E>;
