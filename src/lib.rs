//! A functional test runner for command-line programs.
//!
//! A test file describes a shell session: a sequence of commands paired
//! with expected output. `cliscore` parses such files, drives a
//! persistent interactive shell, captures per-command standard output and
//! standard error, and decides per command whether the captured output
//! satisfies the declared expectation.
//!
//! Three coupled subsystems do the work:
//!
//! - [`parser`] turns a test file into a [`model::TestFile`] — a sequence of
//!   `(command, expectation-list)` records with stable source line numbers,
//!   in one of three dialects selected by file suffix (`.t` two-space
//!   indented, `.md` fenced code blocks, `.cliscore` either).
//! - [`shell`] owns one persistent child shell process per test file and
//!   frames each command's stdout/stderr/exit-status with a pair of random
//!   sentinels, honoring a per-command timeout and the setup script's
//!   lifecycle hooks.
//! - [`matcher`] walks the captured output against the expectation list —
//!   literal, regex, glob, ellipsis, stream-tagged, and inline-mixed
//!   patterns (see [`pattern`]) — and produces a pass, skip, or diagnostic.
//!
//! [`runner`] ties these together per file and [`config::TestConfig`] is
//! the entry point most callers want:
//!
//! ```no_run
//! use cliscore::TestConfig;
//!
//! #[test]
//! fn run_cliscore_tests() -> cliscore::TestResult<()> {
//!     let config = TestConfig::new("tests/cli")?;
//!     config.run_tests()
//! }
//! ```
//!
//! See `tests/tests.rs` for a concrete, runnable version of this pattern
//! against this crate's own `demos/` fixture tree.

pub mod config;
pub mod config_file;
mod diff_printer;
pub mod error;
pub mod matcher;
pub mod model;
pub mod parser;
pub mod pattern;
pub mod runner;
mod setup;
pub mod shell;

pub use config::TestConfig;
pub use error::TestError;
pub use model::{Dialect, Test, TestFile, TestFileResult};
pub use runner::{run_all, OnFileComplete};

pub type TestResult<T> = Result<T, error::TestError>;
