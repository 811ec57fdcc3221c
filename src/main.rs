use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use colored::Colorize;
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

use cliscore::config_file;
use cliscore::error::ErrorKind;
use cliscore::model::{Failure, TestFileResult};
use cliscore::parser;
use cliscore::runner;
use cliscore::TestConfig;

mod diff_printer;

use diff_printer::DiffPrinter;

#[derive(Parser, Debug)]
#[command(author, version, about = "A functional test runner for command-line programs", long_about = None)]
struct Args {
    /// Directory to search recursively for test files, or a single file to test.
    test_path: PathBuf,

    /// Shell binary used to drive each test file.
    #[arg(long)]
    shell: Option<PathBuf>,

    /// Per-command timeout, in seconds.
    #[arg(long)]
    timeout_seconds: Option<u64>,

    /// Maximum number of test files to run concurrently.
    #[arg(long)]
    jobs: Option<usize>,

    /// Comma-separated list of fenced-block language tags to treat as tests.
    #[arg(long, value_delimiter = ',')]
    allowed_languages: Option<Vec<String>>,

    /// Emit {timestamp, kind, payload} shell trace records.
    #[arg(long)]
    trace: bool,

    /// Only print pass/fail counts.
    #[arg(short, long)]
    quiet: bool,

    /// Additionally print passing test names and hook output.
    #[arg(short, long)]
    verbose: bool,
}

fn build_config(args: &Args) -> TestConfig {
    let mut config = match config_file::read_config_file(None) {
        Some(file) => file.apply(TestConfig::new(&args.test_path).unwrap_or_default_with_path(&args.test_path)),
        None => TestConfig::new(&args.test_path).unwrap_or_default_with_path(&args.test_path),
    };

    config.test_path = args.test_path.clone();
    if let Some(shell) = &args.shell {
        config.shell = shell.clone();
    }
    if let Some(timeout) = args.timeout_seconds {
        config.timeout = Duration::from_secs(timeout);
    }
    if let Some(jobs) = args.jobs {
        config.jobs = jobs.max(1);
    }
    if let Some(languages) = &args.allowed_languages {
        config.allowed_languages = languages.clone();
    }
    config.trace = config.trace || args.trace;
    config
}

/// Discovers test files under `test_path` with `walkdir`, filtered to the
/// three recognized suffixes (§6), in the binary's own discovery path
/// (the library's `run_all` instead uses a dependency-free `std::fs` walk).
fn discover_files(test_path: &PathBuf) -> Vec<PathBuf> {
    if test_path.is_file() {
        return vec![test_path.clone()];
    }
    WalkDir::new(test_path)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.into_path())
        .filter(|path| path.is_file() && parser::is_test_file(path))
        .collect()
}

enum Verbosity {
    Quiet,
    Normal,
    Verbose,
}

fn print_file_result(result: &TestFileResult, verbosity: &Verbosity) {
    if matches!(verbosity, Verbosity::Quiet) {
        return;
    }

    for failure in &result.failures {
        println!(
            "{} {}:{}\n  {}\n  {}\n",
            "FAIL".red().bold(),
            result.path.display(),
            failure.source_line,
            failure.command,
            failure.diagnostic
        );
        if failure.kind == ErrorKind::MatchFailure {
            print!("{}", diff_for_failure(failure));
        }
    }

    if matches!(verbosity, Verbosity::Verbose) {
        for pass in &result.passes {
            println!("{} {}:{} {}", "ok".green(), result.path.display(), pass.source_line, pass.command);
        }
        for skip in &result.skips {
            println!("{} {}:{} ({})", "skip".yellow(), result.path.display(), skip.source_line, skip.reason);
        }
        if let Some(hook) = &result.hook_results.run_first {
            print_hook("run_first", hook);
        }
        if let Some(hook) = &result.hook_results.run_last {
            print_hook("run_last", hook);
        }
    }
}

/// Renders a line-level diff between the expected output (the
/// expectation list, `Literal`s shown verbatim and everything else by its
/// `describe()` form) and the actually captured stdout, for a failed
/// `MatchFailure`. Purely a display nicety on top of the matcher's own
/// diagnostic text.
fn diff_for_failure(failure: &Failure) -> String {
    let expected: Vec<String> = failure
        .expectations
        .iter()
        .map(|e| match e {
            cliscore::pattern::Expectation::Literal { text } => text.clone(),
            other => other.describe(),
        })
        .collect();
    let printer = DiffPrinter::new(&expected.join("\n"), &failure.stdout.join("\n"));
    format!("{printer}\n")
}

fn print_hook(name: &str, hook: &cliscore::model::HookResult) {
    if hook.failed {
        println!("{} {name} exited {}", "warn".yellow(), hook.exit_status);
    }
    for line in &hook.stdout {
        println!("  [{name}] {line}");
    }
}

fn main() {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let args = Args::parse();
    let config = build_config(&args);
    let files = discover_files(&config.test_path);

    let verbosity = if args.quiet {
        Verbosity::Quiet
    } else if args.verbose {
        Verbosity::Verbose
    } else {
        Verbosity::Normal
    };

    let results = runner::run_many(&files, &config, None);

    let mut total_passed = 0;
    let mut total_failed = 0;
    let mut total_skipped = 0;
    for result in &results {
        print_file_result(result, &verbosity);
        total_passed += result.passed;
        total_failed += result.failed;
        total_skipped += result.skipped;
    }

    println!(
        "\nran {} files: {} {}, {} {}, {} {}",
        results.len(),
        total_passed,
        "passed".green(),
        total_failed,
        "failed".red(),
        total_skipped,
        "skipped".yellow(),
    );

    std::process::exit(if total_failed == 0 { 0 } else { 1 });
}

trait ConfigExt {
    fn unwrap_or_default_with_path(self, path: &PathBuf) -> TestConfig;
}

impl ConfigExt for cliscore::TestResult<TestConfig> {
    fn unwrap_or_default_with_path(self, path: &PathBuf) -> TestConfig {
        self.unwrap_or_else(|_| TestConfig { test_path: path.clone(), ..Default::default() })
    }
}
