//! Error types surfaced at the library boundary, and the per-test error
//! kind tagged onto `ExecutionResult` rather than raised as an exception
//! (see the propagation policy documented on `ErrorKind`).

use std::fmt;
use std::path::PathBuf;

pub type TestResult<T> = Result<T, TestError>;

/// Errors that can escape the library as a whole. Per-test failures never
/// take this path; they are folded into `TestFileResult` instead.
#[derive(Debug, thiserror::Error)]
pub enum TestError {
    #[error("failed to locate test files: {0}")]
    MissingTests(PathBuf),

    #[error("one or more tests are failing")]
    TestsFailed,

    #[error("error reading configuration: {0}")]
    ConfigError(String),
}

/// Crate-private, per-file errors that abort parsing or starting a single
/// `TestFile` (§7: `ParseError`, `ShellStartFailure`, and unexpected I/O
/// errors). These never escape as exceptions across the runner boundary —
/// `Runner::run_file` catches them and folds them into a synthetic single
/// failure in that file's `TestFileResult`, per §7's propagation policy.
#[derive(Debug, thiserror::Error)]
pub enum InnerTestError {
    #[error("{path}: {message}")]
    Parse { path: PathBuf, kind: ErrorKind, message: String },

    #[error("{path}: shell failed to start: {message}")]
    ShellStart { path: PathBuf, message: String },

    #[error("{path}: {source}")]
    Io { path: PathBuf, #[source] source: std::io::Error },
}

impl InnerTestError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            InnerTestError::Parse { kind, .. } => *kind,
            InnerTestError::ShellStart { .. } => ErrorKind::ShellStartFailure,
            InnerTestError::Io { .. } => ErrorKind::ParseError,
        }
    }

    pub fn path(&self) -> &PathBuf {
        match self {
            InnerTestError::Parse { path, .. } => path,
            InnerTestError::ShellStart { path, .. } => path,
            InnerTestError::Io { path, .. } => path,
        }
    }
}

/// The tag attached to `ExecutionResult.error` and surfaced in rendered
/// diagnostics. Subsystem errors are never raised across the `Runner`
/// boundary as exceptions; they're encoded into `TestFileResult.failures`
/// with this tag plus enough context to render any verbosity tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ParseError,
    ShellStartFailure,
    Timeout,
    ShellDead,
    HookFailure,
    MatchFailure,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::ParseError => "parse error",
            ErrorKind::ShellStartFailure => "shell failed to start",
            ErrorKind::Timeout => "command timed out",
            ErrorKind::ShellDead => "shell is dead",
            ErrorKind::HookFailure => "hook failed",
            ErrorKind::MatchFailure => "output did not match expectations",
        };
        f.write_str(s)
    }
}
