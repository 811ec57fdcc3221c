//! The runner (component R, §4.5): for each test file, drives the setup
//! script's lifecycle hooks around a `ShellDriver`, routes each `Test`'s
//! captured output to the matcher, and accumulates a `TestFileResult`.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{debug, error, warn};

#[cfg(feature = "parallel")]
use rayon::iter::{IntoParallelIterator, ParallelIterator};
#[cfg(feature = "progress-bar")]
use indicatif::ProgressBar;

use crate::config::TestConfig;
use crate::error::{ErrorKind, InnerTestError, TestError, TestResult};
use crate::matcher::{self, MatchOutcome};
use crate::model::{Failure, HookResults, Pass, Skip, TestFileResult};
use crate::parser;
use crate::setup;
use crate::shell::{self, ShellDriver, TraceSink};

/// The callback an embedder supplies to observe per-file completion (§4.5
/// / §6): `(result, index, total, duration)`.
pub type OnFileComplete<'a> = dyn Fn(&TestFileResult, usize, usize, Duration) + Send + Sync + 'a;

const AFTER_EACH_FILE_TIMEOUT: Duration = Duration::from_secs(5);

/// Runs every `Test` in one `TestFile`, managing the shell driver and
/// lifecycle hooks around it (§4.5, steps 1-6).
pub fn run_file(path: &Path, config: &TestConfig) -> TestFileResult {
    let mut result = TestFileResult::new(path.to_path_buf());

    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            return single_synthetic_failure(path, ErrorKind::ParseError, format!("could not read file: {e}"));
        }
    };

    let test_file = match parser::parse_file(path, &contents, &config.allowed_languages) {
        Ok(file) => file,
        Err(e) => return single_synthetic_failure(path, e.kind(), e.to_string()),
    };

    if test_file.tests.is_empty() {
        debug!(path = %path.display(), "no tests found in file");
        return result;
    }

    let setup_script = setup::discover(path);
    let trace = if config.trace { TraceSink::enabled() } else { TraceSink::disabled() };

    let mut hooks = HookResults::default();
    if let Some(script) = &setup_script {
        let hook_result = shell::run_throwaway_hook(&config.shell, script, "run_first", config.timeout);
        if hook_result.failed {
            warn!(path = %path.display(), "run_first hook reported a failure; continuing (§9 open question)");
        }
        hooks.run_first = Some(hook_result);
    }

    let mut driver = match ShellDriver::start(&config.shell, config.timeout, trace) {
        Ok(driver) => driver,
        Err(message) => {
            error!(path = %path.display(), %message, "shell failed to start");
            let mut failure_result = single_synthetic_failure(path, ErrorKind::ShellStartFailure, message);
            failure_result.hook_results.run_first = hooks.run_first.take();
            run_last_if_any(path, &setup_script, &config.shell, config.timeout, &mut failure_result.hook_results);
            return failure_result;
        }
    };

    if let Some(script) = &setup_script {
        driver.source_setup_script(script);
        hooks.before_each_file = Some(driver.call_hook("before_each_file", config.timeout));
    }

    let mut shell_dead = false;
    for test in &test_file.tests {
        if shell_dead {
            result.failed += 1;
            result.failures.push(Failure {
                source_line: test.source_line,
                command: test.command.clone(),
                expectations: test.expectations.clone(),
                diagnostic: "shell is dead after a prior timeout".to_string(),
                stdout: Vec::new(),
                stderr: Vec::new(),
                duration: Duration::default(),
                kind: ErrorKind::ShellDead,
            });
            continue;
        }

        let started = Instant::now();
        let execution = driver.execute(test);

        if let Some(kind @ (ErrorKind::Timeout | ErrorKind::ShellDead)) = execution.error {
            shell_dead = true;
            result.failed += 1;
            result.failures.push(Failure {
                source_line: test.source_line,
                command: test.command.clone(),
                expectations: test.expectations.clone(),
                diagnostic: kind.to_string(),
                stdout: execution.stdout,
                stderr: execution.stderr,
                duration: execution.duration,
                kind,
            });
            continue;
        }

        match matcher::matches(&execution, &test.expectations) {
            MatchOutcome::Passed => {
                result.passed += 1;
                result.passes.push(Pass { source_line: test.source_line, command: test.command.clone(), duration: started.elapsed() });
            }
            MatchOutcome::Skipped { reason } => {
                result.skipped += 1;
                result.skips.push(Skip { source_line: test.source_line, command: test.command.clone(), reason });
            }
            MatchOutcome::Failed { diagnostic } => {
                result.failed += 1;
                result.failures.push(Failure {
                    source_line: test.source_line,
                    command: test.command.clone(),
                    expectations: test.expectations.clone(),
                    diagnostic,
                    stdout: execution.stdout,
                    stderr: execution.stderr,
                    duration: execution.duration,
                    kind: ErrorKind::MatchFailure,
                });
            }
        }
    }

    if setup_script.is_some() && !shell_dead {
        hooks.after_each_file = Some(driver.call_hook("after_each_file", AFTER_EACH_FILE_TIMEOUT));
    }
    driver.close();

    run_last_if_any(path, &setup_script, &config.shell, config.timeout, &mut hooks);
    result.hook_results = hooks;
    result
}

fn run_last_if_any(path: &Path, setup_script: &Option<PathBuf>, shell: &Path, timeout: Duration, hooks: &mut HookResults) {
    if let Some(script) = setup_script {
        debug!(path = %path.display(), "running run_last hook");
        hooks.run_last = Some(shell::run_throwaway_hook(shell, script, "run_last", timeout));
    }
}

fn single_synthetic_failure(path: &Path, kind: ErrorKind, message: String) -> TestFileResult {
    error!(path = %path.display(), %kind, %message, "aborting file");
    let mut result = TestFileResult::new(path.to_path_buf());
    result.failed = 1;
    result.failures.push(Failure {
        source_line: 0,
        command: String::new(),
        expectations: Vec::new(),
        diagnostic: message,
        stdout: Vec::new(),
        stderr: Vec::new(),
        duration: Duration::default(),
        kind,
    });
    result
}

/// Recursively discovers test files under `directory` by suffix (§6), in
/// source order, depth-first. A thin, dependency-free default used by the
/// library entry point; the `binary` feature's CLI instead discovers files
/// with `walkdir` (see `main.rs`).
fn find_test_files(directory: &Path) -> Result<Vec<PathBuf>, InnerTestError> {
    let mut files = Vec::new();
    if directory.is_file() {
        if parser::is_test_file(directory) {
            files.push(directory.to_path_buf());
        }
        return Ok(files);
    }

    let read_dir = std::fs::read_dir(directory).map_err(|e| InnerTestError::Io { path: directory.to_path_buf(), source: e })?;
    let mut entries: Vec<PathBuf> = Vec::new();
    for entry in read_dir {
        let entry = entry.map_err(|e| InnerTestError::Io { path: directory.to_path_buf(), source: e })?;
        entries.push(entry.path());
    }
    entries.sort();

    for path in entries {
        if path.is_dir() {
            files.extend(find_test_files(&path)?);
        } else if parser::is_test_file(&path) {
            files.push(path);
        }
    }
    Ok(files)
}

/// Runs every discovered test file under `config.test_path`, calling
/// `on_file_complete` after each, and returns `Ok(())` iff no test failed
/// anywhere (§6 "Exit code from the embedding tool").
pub fn run_all(config: &TestConfig, on_file_complete: Option<&OnFileComplete>) -> TestResult<Vec<TestFileResult>> {
    let files = find_test_files(&config.test_path).map_err(|e| TestError::ConfigError(e.to_string()))?;
    Ok(run_many(&files, config, on_file_complete))
}

/// Runs a caller-supplied list of test files (used by the `binary`
/// feature's CLI, which discovers files with `walkdir` instead of the
/// dependency-free default above), calling `on_file_complete` after each.
pub fn run_many(files: &[PathBuf], config: &TestConfig, on_file_complete: Option<&OnFileComplete>) -> Vec<TestFileResult> {
    let total = files.len();
    #[cfg(feature = "progress-bar")]
    let progress = ProgressBar::new(total as u64);

    let run_one = |(index, path): (usize, &PathBuf)| {
        let started = Instant::now();
        let result = run_file(path, config);
        #[cfg(feature = "progress-bar")]
        progress.inc(1);
        if let Some(callback) = on_file_complete {
            callback(&result, index, total, started.elapsed());
        }
        result
    };
    let results = dispatch(files, config.jobs, run_one);

    #[cfg(feature = "progress-bar")]
    progress.finish_and_clear();

    results
}

#[cfg(feature = "parallel")]
fn dispatch<F>(files: &[PathBuf], jobs: usize, run_one: F) -> Vec<TestFileResult>
where
    F: Fn((usize, &PathBuf)) -> TestFileResult + Sync,
{
    if jobs <= 1 {
        return files.iter().enumerate().map(run_one).collect();
    }
    // A dedicated pool per call, per SPEC_FULL.md's concurrency note, so
    // concurrent `Runner`s with different `jobs` settings don't interfere
    // with each other or with the global rayon pool.
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs)
        .build()
        .expect("building a bounded rayon thread pool");
    pool.install(|| files.par_iter().enumerate().map(run_one).collect())
}

#[cfg(not(feature = "parallel"))]
fn dispatch<F>(files: &[PathBuf], _jobs: usize, run_one: F) -> Vec<TestFileResult>
where
    F: Fn((usize, &PathBuf)) -> TestFileResult,
{
    files.iter().enumerate().map(run_one).collect()
}

/// Convenience entry point matching the teacher's `TestConfig::run_tests`:
/// runs every discovered file and maps to the library-boundary `Result`.
pub fn run_tests(config: &TestConfig) -> TestResult<()> {
    let results = run_all(config, None)?;
    let failed: usize = results.iter().map(|r| r.failed).sum();
    if failed != 0 {
        Err(TestError::TestsFailed)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn config_for(dir: &Path) -> TestConfig {
        TestConfig::new(dir).unwrap()
    }

    #[test]
    #[cfg(unix)]
    fn passing_indented_file_reports_zero_failures() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.t"), "  $ echo hello world\n  hello world\n").unwrap();
        let config = config_for(dir.path());
        let result = run_file(&dir.path().join("a.t"), &config);
        assert_eq!(result.passed, 1);
        assert_eq!(result.failed, 0);
    }

    #[test]
    #[cfg(unix)]
    fn mismatched_output_is_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.t"), "  $ echo hello\n  goodbye\n").unwrap();
        let config = config_for(dir.path());
        let result = run_file(&dir.path().join("a.t"), &config);
        assert_eq!(result.failed, 1);
    }

    #[test]
    #[cfg(unix)]
    fn timeout_fails_current_and_remaining_tests_as_shell_dead() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("a.t"),
            "  $ sleep 5\n  nope\n\n  $ echo after\n  after\n",
        )
        .unwrap();
        let mut config = config_for(dir.path());
        config.timeout = Duration::from_millis(200);
        let result = run_file(&dir.path().join("a.t"), &config);
        assert_eq!(result.failed, 2);
        assert_eq!(result.failures[0].kind, ErrorKind::Timeout);
        assert_eq!(result.failures[1].kind, ErrorKind::ShellDead);
    }

    #[test]
    #[cfg(unix)]
    fn skip_expectation_short_circuits_the_test() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.t"), "  $ true\n  [SKIP: not ready]\n").unwrap();
        let config = config_for(dir.path());
        let result = run_file(&dir.path().join("a.t"), &config);
        assert_eq!(result.skipped, 1);
        assert_eq!(result.skips[0].reason, "not ready");
    }

    #[test]
    fn unreadable_file_becomes_a_synthetic_failure() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.t");
        let config = config_for(dir.path());
        let result = run_file(&missing, &config);
        assert_eq!(result.failed, 1);
        assert_eq!(result.failures[0].kind, ErrorKind::ParseError);
    }

    #[test]
    fn empty_file_has_no_tests_and_no_failures() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.t"), "just a comment\n").unwrap();
        let config = config_for(dir.path());
        let result = run_file(&dir.path().join("a.t"), &config);
        assert_eq!(result.total(), 0);
    }

    #[test]
    #[cfg(unix)]
    fn run_first_and_run_last_hooks_execute() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("cliscore.sh"),
            "run_first() { echo first; }\nrun_last() { echo last; }\n",
        )
        .unwrap();
        fs::write(dir.path().join("a.t"), "  $ echo hi\n  hi\n").unwrap();
        let config = config_for(dir.path());
        let result = run_file(&dir.path().join("a.t"), &config);
        assert_eq!(result.passed, 1);
        assert_eq!(result.hook_results.run_first.unwrap().stdout, vec!["first".to_string()]);
        assert_eq!(result.hook_results.run_last.unwrap().stdout, vec!["last".to_string()]);
    }

    #[test]
    #[cfg(unix)]
    fn before_and_after_each_file_hooks_run_in_main_shell() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("cliscore.sh"),
            "before_each_file() { export GREETING=hi; }\nafter_each_file() { echo bye; }\n",
        )
        .unwrap();
        fs::write(dir.path().join("a.t"), "  $ echo $GREETING\n  hi\n").unwrap();
        let config = config_for(dir.path());
        let result = run_file(&dir.path().join("a.t"), &config);
        assert_eq!(result.passed, 1);
        assert!(result.hook_results.before_each_file.is_some());
        assert_eq!(result.hook_results.after_each_file.unwrap().stdout, vec!["bye".to_string()]);
    }
}
