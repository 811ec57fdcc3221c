//! The fenced-code-block dialect (§4.2 "Fenced form"), selected for `.md`
//! files and, under the mixed dialect, when a fence sequence is present
//! somewhere in the file body.

use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

use crate::model::{Dialect, Test, TestFile};
use crate::parser::bracket::{normalize, parse_payload_with_suffix};

fn fence_open_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(`{3,}|~{3,})\s*([\w.+-]*)\s*$").expect("static pattern compiles"))
}

fn fence_close_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(`{3,}|~{3,})\s*$").expect("static pattern compiles"))
}

fn command_prompt_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:[\w.-]+(?:@[\w.-]+)?)?[\$#] ").expect("static pattern compiles")
    })
}

fn continuation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*> ").expect("static pattern compiles"))
}

/// True iff `contents` contains a fence sequence anywhere (used by the
/// mixed dialect to decide between fenced and indented parsing).
pub fn contains_fence(contents: &str) -> bool {
    contents.lines().any(|line| fence_open_re().is_match(line.trim_end()))
}

/// Parses the fenced dialect out of `contents`, considering only blocks
/// whose language tag is in `allowed_languages`.
pub fn parse(path: &Path, contents: &str, allowed_languages: &[String]) -> TestFile {
    let mut tests = Vec::new();
    let mut in_block = false;
    let mut fence_marker = String::new();

    let mut command: Option<String> = None;
    let mut command_line = 0usize;
    let mut expectations = Vec::new();

    for (zero_based_line, raw_line) in contents.lines().enumerate() {
        let line_number = zero_based_line + 1;
        let trimmed = raw_line.trim_end();

        if !in_block {
            if let Some(caps) = fence_open_re().captures(trimmed) {
                let marker = caps.get(1).unwrap().as_str().to_string();
                let language = caps.get(2).map(|m| m.as_str()).unwrap_or("");
                if allowed_languages.iter().any(|l| l == language) {
                    in_block = true;
                    fence_marker = marker;
                }
            }
            continue;
        }

        // Inside an allow-listed block.
        if fence_close_re().is_match(trimmed) && trimmed.starts_with(&fence_marker) {
            flush(&mut tests, &mut command, command_line, &mut expectations);
            in_block = false;
            continue;
        }

        if command_prompt_re().is_match(raw_line) {
            flush(&mut tests, &mut command, command_line, &mut expectations);
            let prompt_end = command_prompt_re().find(raw_line).unwrap().end();
            command = Some(raw_line[prompt_end..].to_string());
            command_line = line_number;
            continue;
        }

        if continuation_re().is_match(raw_line) {
            if let Some(existing) = command.as_mut() {
                let body_start = continuation_re().find(raw_line).unwrap().end();
                existing.push('\n');
                existing.push_str(&raw_line[body_start..]);
            }
            continue;
        }

        if command.is_some() {
            expectations.push(parse_payload_with_suffix(raw_line));
        }
    }
    // A file ending mid-block still yields whatever test was open.
    flush(&mut tests, &mut command, command_line, &mut expectations);

    TestFile { path: path.to_path_buf(), dialect: Dialect::Fenced, tests }
}

fn flush(tests: &mut Vec<Test>, command: &mut Option<String>, source_line: usize, expectations: &mut Vec<crate::pattern::Expectation>) {
    if let Some(command) = command.take() {
        tests.push(Test {
            command,
            expectations: normalize(std::mem::take(expectations)),
            source_line,
        });
    } else {
        expectations.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const LANGS: &[&str] = &["cliscore", "console"];

    fn langs() -> Vec<String> {
        LANGS.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_simple_block() {
        let md = "Some prose.\n\n```cliscore\n$ echo hi\nhi\n```\n";
        let file = parse(&PathBuf::from("t.md"), md, &langs());
        assert_eq!(file.tests.len(), 1);
        assert_eq!(file.tests[0].command, "echo hi");
        assert_eq!(file.tests[0].source_line, 4);
    }

    #[test]
    fn ignores_blocks_with_disallowed_language() {
        let md = "```rust\nfn main() {}\n```\n";
        let file = parse(&PathBuf::from("t.md"), md, &langs());
        assert!(file.tests.is_empty());
    }

    #[test]
    fn host_prompt_prefix_is_stripped() {
        let md = "```console\nuser@host$ ls\nREADME.md\n```\n";
        let file = parse(&PathBuf::from("t.md"), md, &langs());
        assert_eq!(file.tests[0].command, "ls");
    }

    #[test]
    fn continuation_line_appends_to_command() {
        let md = "```cliscore\n$ echo a \\\n> && echo b\na\nb\n```\n";
        let file = parse(&PathBuf::from("t.md"), md, &langs());
        assert_eq!(file.tests[0].command, "echo a \\\n&& echo b");
    }

    #[test]
    fn blank_lines_inside_block_become_empty_expectations() {
        let md = "```cliscore\n$ printf 'a\\n\\nb'\na\n\nb\n```\n";
        let file = parse(&PathBuf::from("t.md"), md, &langs());
        assert_eq!(file.tests[0].expectations.len(), 3);
    }

    #[test]
    fn detects_fence_presence() {
        assert!(contains_fence("prose\n```cliscore\n$ x\n```\n"));
        assert!(!contains_fence("  $ x\n  out\n"));
    }
}
