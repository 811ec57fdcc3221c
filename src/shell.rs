//! The shell driver (component X, §4.4): owns one child shell process per
//! test file, multiplexes commands into it, and unambiguously frames each
//! command's stdout, stderr, and exit status using a pair of random
//! sentinels. Draining the two streams concurrently is modeled after
//! `term-transcript`'s shell driver in this corpus: a reader thread per
//! stream forwards byte chunks over a channel, and the driving thread
//! consumes chunks from both until each side's sentinel condition holds.

use std::io::{Read, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::OnceLock;
use std::thread;
use std::time::{Duration, Instant};

use rand::Rng;
use regex::Regex;
use tracing::{debug, trace, warn};

use crate::error::ErrorKind;
use crate::model::{ExecutionResult, HookResult, Test, TraceEvent, TraceKind};

fn exit_word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\bexit\b").expect("static pattern compiles"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamTag {
    Stdout,
    Stderr,
}

type ChunkMsg = (StreamTag, Vec<u8>);

/// A sink for §6's `{timestamp, kind, payload}` trace records. Wraps a
/// `tracing` span emission; embedders who want raw records rather than
/// formatted log lines can additionally supply a channel.
#[derive(Clone, Default)]
pub struct TraceSink {
    enabled: bool,
    forward: Option<mpsc::Sender<TraceEvent>>,
}

impl TraceSink {
    pub fn enabled() -> Self {
        TraceSink { enabled: true, forward: None }
    }

    pub fn disabled() -> Self {
        TraceSink { enabled: false, forward: None }
    }

    pub fn with_forward(forward: mpsc::Sender<TraceEvent>) -> Self {
        TraceSink { enabled: true, forward: Some(forward) }
    }

    fn emit(&self, kind: TraceKind, payload: impl Into<String>) {
        if !self.enabled {
            return;
        }
        let payload = payload.into();
        trace!(kind = ?kind, payload = %payload, "shell trace event");
        if let Some(sender) = &self.forward {
            let timestamp_ms = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_millis())
                .unwrap_or(0);
            let _ = sender.send(TraceEvent { timestamp_ms, kind, payload });
        }
    }
}

/// The driver's lifecycle state (§4.4's state machine). Transitions out of
/// `Dead` or `Closed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Ready,
    Dead,
    Closed,
}

/// Owns one child shell process for the span of one test file.
pub struct ShellDriver {
    child: Child,
    stdin: Option<ChildStdin>,
    rx: mpsc::Receiver<ChunkMsg>,
    timeout: Duration,
    state: State,
    trace: TraceSink,
}

fn random_sentinel(tag: &str) -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 8] = rng.gen();
    let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
    format!("__CLISCORE_{tag}_END_{hex}__")
}

fn spawn_reader(mut reader: impl Read + Send + 'static, tag: StreamTag, tx: mpsc::Sender<ChunkMsg>) {
    thread::spawn(move || {
        let mut buf = [0u8; 4096];
        loop {
            match reader.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if tx.send((tag, buf[..n].to_vec())).is_err() {
                        break;
                    }
                }
            }
        }
    });
}

/// Splits the text preceding a sentinel into lines per §4.4: "a dangling
/// empty tail is dropped; an explicit trailing empty line is preserved."
fn split_captured_lines(before: &str) -> (Vec<String>, bool) {
    if before.is_empty() {
        return (Vec::new(), true);
    }
    let had_trailing_newline = before.ends_with('\n');
    let mut lines: Vec<String> = before.split('\n').map(|s| s.to_string()).collect();
    if had_trailing_newline {
        lines.pop();
    }
    (lines, had_trailing_newline)
}

impl ShellDriver {
    /// Spawns the child shell at `shell_path` (`NEW -> READY`, §4.4).
    pub fn start(shell_path: &Path, timeout: Duration, trace: TraceSink) -> Result<Self, String> {
        let mut command = Command::new(shell_path);
        command.stdin(Stdio::piped()).stdout(Stdio::piped()).stderr(Stdio::piped());

        let mut child = command.spawn().map_err(|e| format!("failed to spawn `{}`: {e}", shell_path.display()))?;
        let stdin = child.stdin.take().expect("piped stdin");
        let stdout = child.stdout.take().expect("piped stdout");
        let stderr = child.stderr.take().expect("piped stderr");

        let (tx, rx) = mpsc::channel();
        spawn_reader(stdout, StreamTag::Stdout, tx.clone());
        spawn_reader(stderr, StreamTag::Stderr, tx);

        trace.emit(TraceKind::Spawn, shell_path.display().to_string());
        debug!(shell = %shell_path.display(), "shell started");

        Ok(ShellDriver { child, stdin: Some(stdin), rx, timeout, state: State::Ready, trace })
    }

    /// Sources a setup script into the main shell. Not a command itself —
    /// the caller discards the returned `ExecutionResult` other than to
    /// check it ran cleanly, since hook output is captured but never
    /// influences match outcomes.
    pub fn source_setup_script(&mut self, path: &Path) -> ExecutionResult {
        self.execute_command(&format!(". '{}'", path.display()), self.timeout)
    }

    /// Executes one `Test`'s command through the sentinel framing protocol
    /// (§4.4 "Framing protocol").
    pub fn execute(&mut self, test: &Test) -> ExecutionResult {
        self.execute_command(&test.command, self.timeout)
    }

    /// Invokes a named hook function (`before-each-file` / `after-each-file`)
    /// via the same framing protocol used for ordinary commands, capped at
    /// `timeout` (5 seconds for `after-each-file` per §4.4).
    pub fn call_hook(&mut self, name: &str, timeout: Duration) -> HookResult {
        let result = self.execute_command(name, timeout);
        HookResult {
            failed: result.exit_status != 0 || result.error.is_some(),
            stdout: result.stdout,
            stderr: result.stderr,
            exit_status: result.exit_status,
        }
    }

    pub fn is_dead(&self) -> bool {
        self.state != State::Ready
    }

    fn execute_command(&mut self, command: &str, timeout: Duration) -> ExecutionResult {
        if self.state != State::Ready {
            return ExecutionResult { error: Some(ErrorKind::ShellDead), ..Default::default() };
        }

        let stdout_sentinel = random_sentinel("STDOUT");
        let stderr_sentinel = random_sentinel("STDERR");

        let wrapped = if exit_word_re().is_match(command) {
            format!("({command})")
        } else {
            command.to_string()
        };

        let script = format!(
            "{wrapped}\n__E=$?\necho \"{stdout_sentinel}:$__E\"\necho \"{stderr_sentinel}\" 1>&2\n"
        );

        self.trace.emit(TraceKind::Stdin, command.to_string());
        let write_result = match self.stdin.as_mut() {
            Some(stdin) => stdin.write_all(script.as_bytes()).and_then(|_| stdin.flush()),
            None => {
                self.mark_dead();
                return ExecutionResult { error: Some(ErrorKind::ShellDead), ..Default::default() };
            }
        };
        if let Err(e) = write_result {
            self.mark_dead();
            return ExecutionResult {
                error: Some(ErrorKind::ShellDead),
                stdout: vec![format!("failed to write to shell stdin: {e}")],
                ..Default::default()
            };
        }

        let start = Instant::now();
        let mut stdout_buf = String::new();
        let mut stderr_buf = String::new();
        let mut stdout_done = false;
        let mut stderr_done = false;
        let mut exit_status = 0i32;
        let mut stdout_lines = Vec::new();
        let mut stdout_had_trailing_newline = true;
        let mut stderr_lines = Vec::new();

        loop {
            if stdout_done && stderr_done {
                break;
            }
            let elapsed = start.elapsed();
            if elapsed >= timeout {
                self.trace.emit(TraceKind::Error, "command timed out");
                warn!(command, "shell command timed out");
                self.kill_and_mark_dead();
                return ExecutionResult {
                    stdout: stdout_lines,
                    stderr: stderr_lines,
                    exit_status: -1,
                    duration: elapsed,
                    stdout_had_trailing_newline,
                    error: Some(ErrorKind::Timeout),
                };
            }
            let remaining = timeout - elapsed;
            match self.rx.recv_timeout(remaining) {
                Ok((StreamTag::Stdout, chunk)) if !stdout_done => {
                    stdout_buf.push_str(&String::from_utf8_lossy(&chunk));
                    if let Some(idx) = stdout_buf.find(&stdout_sentinel) {
                        let before = stdout_buf[..idx].to_string();
                        let after = &stdout_buf[idx + stdout_sentinel.len()..];
                        let digits: String = after.trim_start_matches(':').chars().take_while(|c| c.is_ascii_digit()).collect();
                        exit_status = digits.parse().unwrap_or(0);
                        let (lines, had_nl) = split_captured_lines(&before);
                        stdout_lines = lines;
                        stdout_had_trailing_newline = had_nl;
                        stdout_done = true;
                        for line in &stdout_lines {
                            self.trace.emit(TraceKind::Stdout, line.clone());
                        }
                    }
                }
                Ok((StreamTag::Stderr, chunk)) if !stderr_done => {
                    stderr_buf.push_str(&String::from_utf8_lossy(&chunk));
                    if let Some(idx) = stderr_buf.find(&stderr_sentinel) {
                        let line_start = stderr_buf[..idx].rfind('\n').map(|i| i + 1).unwrap_or(0);
                        let before = stderr_buf[..line_start].to_string();
                        let (lines, _) = split_captured_lines(&before);
                        stderr_lines = lines;
                        stderr_done = true;
                        for line in &stderr_lines {
                            self.trace.emit(TraceKind::Stderr, line.clone());
                        }
                    }
                }
                Ok(_) => {
                    // Chunk for a side that already completed; can happen if
                    // the other stream emits more bytes after its sentinel
                    // (e.g. a background job). Drop it.
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    self.mark_dead();
                    return ExecutionResult {
                        stdout: stdout_lines,
                        stderr: stderr_lines,
                        exit_status: -1,
                        duration: start.elapsed(),
                        stdout_had_trailing_newline,
                        error: Some(ErrorKind::ShellDead),
                    };
                }
            }
        }

        self.trace.emit(TraceKind::Exit, exit_status.to_string());
        ExecutionResult {
            stdout: stdout_lines,
            stderr: stderr_lines,
            exit_status,
            duration: start.elapsed(),
            stdout_had_trailing_newline,
            error: None,
        }
    }

    fn mark_dead(&mut self) {
        self.state = State::Dead;
    }

    /// Timeout escalation (§4.4): detach listeners (the reader threads exit
    /// on their own once the pipes close), send a termination signal, then
    /// escalate to a hard kill after a grace period.
    fn kill_and_mark_dead(&mut self) {
        self.mark_dead();
        let _ = self.child.kill();
        thread::sleep(Duration::from_millis(200));
        let _ = self.child.wait();
    }

    /// `READY -> CLOSED` (§4.4). Always releases the child process, even if
    /// it has already exited.
    pub fn close(mut self) {
        if self.state == State::Ready {
            // Dropping stdin signals EOF, letting the shell exit on its own.
            self.stdin.take();
            let _ = self.child.wait();
        } else {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
        self.state = State::Closed;
    }
}

impl Drop for ShellDriver {
    fn drop(&mut self) {
        if self.state != State::Closed {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

/// Runs `run-first` / `run-last` (§4.4): a whole-script invocation in a
/// throwaway shell that sources `setup_script` then calls `hook_name`.
/// Blocks until the process exits or `timeout` elapses, in which case it is
/// killed and reported as a `HookFailure`.
pub fn run_throwaway_hook(shell_path: &Path, setup_script: &Path, hook_name: &str, timeout: Duration) -> HookResult {
    let script = format!(". '{}' && {hook_name}", setup_script.display());
    let mut command = Command::new(shell_path);
    command.arg("-c").arg(&script).stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            warn!(hook = hook_name, error = %e, "throwaway hook shell failed to start");
            return HookResult { failed: true, stdout: vec![format!("failed to start shell: {e}")], ..Default::default() };
        }
    };

    let (done_tx, done_rx) = mpsc::channel();
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let reader = thread::spawn(move || {
        let mut out = String::new();
        let mut err = String::new();
        if let Some(mut s) = stdout {
            let _ = s.read_to_string(&mut out);
        }
        if let Some(mut s) = stderr {
            let _ = s.read_to_string(&mut err);
        }
        let _ = done_tx.send((out, err));
    });

    match done_rx.recv_timeout(timeout) {
        Ok((out, err)) => {
            let code = child.wait().ok().and_then(|s| s.code()).unwrap_or(-1);
            let _ = reader.join();
            HookResult {
                stdout: out.lines().map(|s| s.to_string()).collect(),
                stderr: err.lines().map(|s| s.to_string()).collect(),
                exit_status: code,
                failed: code != 0,
            }
        }
        Err(_) => {
            warn!(hook = hook_name, "throwaway hook timed out");
            let _ = child.kill();
            let _ = child.wait();
            HookResult { failed: true, stdout: vec!["hook timed out".to_string()], ..Default::default() }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_captured_lines_drops_dangling_tail() {
        let (lines, had_nl) = split_captured_lines("a\nb\n");
        assert_eq!(lines, vec!["a", "b"]);
        assert!(had_nl);
    }

    #[test]
    fn split_captured_lines_preserves_explicit_blank() {
        let (lines, had_nl) = split_captured_lines("a\nb\n\n");
        assert_eq!(lines, vec!["a", "b", ""]);
        assert!(had_nl);
    }

    #[test]
    fn split_captured_lines_keeps_dangling_last_line_without_newline() {
        let (lines, had_nl) = split_captured_lines("a\nb");
        assert_eq!(lines, vec!["a", "b"]);
        assert!(!had_nl);
    }

    #[test]
    fn split_captured_lines_empty_is_zero_lines() {
        let (lines, had_nl) = split_captured_lines("");
        assert!(lines.is_empty());
        assert!(had_nl);
    }

    #[test]
    fn exit_word_boundary_detects_standalone_exit() {
        assert!(exit_word_re().is_match("exit 1"));
        assert!(exit_word_re().is_match("foo && exit"));
        assert!(!exit_word_re().is_match("exitcode=1"));
    }

    #[test]
    #[cfg(unix)]
    fn echoes_hello_world() {
        let mut driver = ShellDriver::start(Path::new("/bin/sh"), Duration::from_secs(5), TraceSink::disabled()).unwrap();
        let test = Test { command: "echo hello world".to_string(), expectations: vec![], source_line: 1 };
        let result = driver.execute(&test);
        assert_eq!(result.stdout, vec!["hello world".to_string()]);
        assert_eq!(result.exit_status, 0);
        driver.close();
    }

    #[test]
    #[cfg(unix)]
    fn captures_exit_status() {
        let mut driver = ShellDriver::start(Path::new("/bin/sh"), Duration::from_secs(5), TraceSink::disabled()).unwrap();
        let test = Test { command: "false".to_string(), expectations: vec![], source_line: 1 };
        let result = driver.execute(&test);
        assert_eq!(result.exit_status, 1);
        driver.close();
    }

    #[test]
    #[cfg(unix)]
    fn state_persists_across_commands() {
        let mut driver = ShellDriver::start(Path::new("/bin/sh"), Duration::from_secs(5), TraceSink::disabled()).unwrap();
        driver.execute(&Test { command: "X=42".to_string(), expectations: vec![], source_line: 1 });
        let result = driver.execute(&Test { command: "echo $X".to_string(), expectations: vec![], source_line: 2 });
        assert_eq!(result.stdout, vec!["42".to_string()]);
        driver.close();
    }

    #[test]
    #[cfg(unix)]
    fn command_containing_exit_does_not_kill_shell() {
        let mut driver = ShellDriver::start(Path::new("/bin/sh"), Duration::from_secs(5), TraceSink::disabled()).unwrap();
        let result = driver.execute(&Test { command: "exit 3".to_string(), expectations: vec![], source_line: 1 });
        assert_eq!(result.exit_status, 3);
        let result2 = driver.execute(&Test { command: "echo still alive".to_string(), expectations: vec![], source_line: 2 });
        assert_eq!(result2.stdout, vec!["still alive".to_string()]);
        driver.close();
    }

    #[test]
    #[cfg(unix)]
    fn timeout_marks_shell_dead() {
        let mut driver = ShellDriver::start(Path::new("/bin/sh"), Duration::from_millis(200), TraceSink::disabled()).unwrap();
        let result = driver.execute(&Test { command: "sleep 5".to_string(), expectations: vec![], source_line: 1 });
        assert_eq!(result.error, Some(ErrorKind::Timeout));
        assert!(driver.is_dead());
        let result2 = driver.execute(&Test { command: "echo x".to_string(), expectations: vec![], source_line: 2 });
        assert_eq!(result2.error, Some(ErrorKind::ShellDead));
    }
}
