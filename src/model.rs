//! The data model (§3): `Test`, `TestFile`, `ExecutionResult`, and the
//! `TestFileResult` accumulated by the runner. These types are produced by
//! the parser and consumed read-only by the matcher and runner; none of them
//! carry behavior beyond simple accessors.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ErrorKind;
use crate::pattern::Expectation;

/// One `(command, expectation-list)` record parsed out of a test file,
/// tagged with the 1-based source line of its command.
#[derive(Debug, Clone)]
pub struct Test {
    pub command: String,
    pub expectations: Vec<Expectation>,
    pub source_line: usize,
}

impl Test {
    /// A test has a `Skip` expectation anywhere in its list; per §3 this
    /// takes precedence over every other expectation in the same test.
    pub fn skip_reason(&self) -> Option<&str> {
        self.expectations.iter().find_map(|e| match e {
            Expectation::Skip { reason } => Some(reason.as_str()),
            _ => None,
        })
    }
}

/// Which dialect a `TestFile` was parsed with. Purely informational; kept on
/// the value for diagnostics and for the pretty-printer's round-trip tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Indented,
    Fenced,
}

/// A fully parsed test file: its tests in strict source order.
#[derive(Debug, Clone)]
pub struct TestFile {
    pub path: PathBuf,
    pub dialect: Dialect,
    pub tests: Vec<Test>,
}

/// What went wrong executing or matching a single command, tagged with
/// enough context to render any verbosity tier (§7's propagation policy:
/// subsystem errors never escape as exceptions across the runner boundary).
#[derive(Debug, Clone)]
pub struct Failure {
    pub source_line: usize,
    pub command: String,
    pub expectations: Vec<Expectation>,
    pub diagnostic: String,
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
    pub duration: Duration,
    pub kind: ErrorKind,
}

/// A test that passed, kept around so verbose output can list it.
#[derive(Debug, Clone)]
pub struct Pass {
    pub source_line: usize,
    pub command: String,
    pub duration: Duration,
}

/// A test short-circuited by a `Skip` expectation.
#[derive(Debug, Clone)]
pub struct Skip {
    pub source_line: usize,
    pub command: String,
    pub reason: String,
}

/// Captured output, framing metadata, and exit status of one executed
/// command (§3's `ExecutionResult`).
#[derive(Debug, Clone, Default)]
pub struct ExecutionResult {
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
    pub exit_status: i32,
    pub duration: Duration,
    /// True iff the captured stdout ended in a newline; consulted by the
    /// matcher's `NoEol` rule (§4.3 "Absence of newline on last line").
    pub stdout_had_trailing_newline: bool,
    pub error: Option<ErrorKind>,
}

/// Verbatim captured output of a lifecycle hook invocation (§4.4). Hook
/// output is captured but never influences match outcomes (§3 Lifecycle).
#[derive(Debug, Clone, Default)]
pub struct HookResult {
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
    pub exit_status: i32,
    pub failed: bool,
}

/// The four optional lifecycle hooks a setup script may define (§4.4).
#[derive(Debug, Clone, Default)]
pub struct HookResults {
    pub run_first: Option<HookResult>,
    pub before_each_file: Option<HookResult>,
    pub after_each_file: Option<HookResult>,
    pub run_last: Option<HookResult>,
}

/// The accumulated outcome of running one `TestFile` (§3's `TestResult`,
/// named `TestFileResult` here to leave `TestResult` as this crate's
/// `Result` alias, following the teacher's own `TestResult<T>` convention in
/// `error.rs`).
#[derive(Debug, Clone, Default)]
pub struct TestFileResult {
    pub path: PathBuf,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub failures: Vec<Failure>,
    pub passes: Vec<Pass>,
    pub skips: Vec<Skip>,
    pub hook_results: HookResults,
}

impl TestFileResult {
    pub fn new(path: PathBuf) -> Self {
        TestFileResult { path, ..Default::default() }
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    pub fn total(&self) -> usize {
        self.passed + self.failed + self.skipped
    }
}

/// A trace-mode stream event (§6 "Outcome protocol to embeddings"), emitted
/// to both a `tracing` span and, when embedders want raw records instead of
/// formatted log lines, a typed channel.
#[derive(Debug, Clone)]
pub struct TraceEvent {
    /// Milliseconds since the Unix epoch, captured when the event fired.
    pub timestamp_ms: u128,
    pub kind: TraceKind,
    pub payload: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceKind {
    Spawn,
    Stdin,
    Stdout,
    Stderr,
    Exit,
    Error,
}
