//! The two-space indentation dialect (§4.2 "Indented form"), selected for
//! `.t` files and, under the mixed dialect, for files with no fence
//! sequence in the body.

use crate::model::{Dialect, Test, TestFile};
use crate::parser::bracket::{normalize, parse_payload_with_suffix};
use std::path::Path;

/// Parses the indented dialect out of `contents`, tagging `path` and
/// `Dialect::Indented` onto the resulting `TestFile`.
pub fn parse(path: &Path, contents: &str) -> TestFile {
    let mut tests = Vec::new();

    let mut command: Option<String> = None;
    let mut command_line = 0usize;
    let mut expectations = Vec::new();

    for (zero_based_line, raw_line) in contents.lines().enumerate() {
        let line_number = zero_based_line + 1;

        if let Some(body) = strip_command_prefix(raw_line) {
            flush(&mut tests, &mut command, command_line, &mut expectations);
            command = Some(body.to_string());
            command_line = line_number;
            continue;
        }

        if let Some(body) = raw_line.strip_prefix("  > ") {
            if let Some(existing) = command.as_mut() {
                existing.push('\n');
                existing.push_str(body);
            }
            continue;
        }

        if let Some(payload) = raw_line.strip_prefix("  ") {
            if command.is_some() {
                expectations.push(parse_payload_with_suffix(payload));
            }
            continue;
        }

        // A free comment line. If it shows up while a command is open (no
        // leading indentation at all), the test ends here.
        flush(&mut tests, &mut command, command_line, &mut expectations);
    }
    flush(&mut tests, &mut command, command_line, &mut expectations);

    TestFile { path: path.to_path_buf(), dialect: Dialect::Indented, tests }
}

fn strip_command_prefix(line: &str) -> Option<&str> {
    line.strip_prefix("  $ ").or_else(|| line.strip_prefix("  # "))
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

    #[test]
    fn parses_command_and_literal_output() {
        let file = parse(&PathBuf::from("t.t"), "  $ echo hello\n  hello\n");
        assert_eq!(file.tests.len(), 1);
        assert_eq!(file.tests[0].command, "echo hello");
        assert_eq!(file.tests[0].source_line, 1);
        assert_eq!(file.tests[0].expectations.len(), 1);
    }

    #[test]
    fn continuation_joins_with_newline() {
        let file = parse(&PathBuf::from("t.t"), "  $ echo a \\\n  > && echo b\n  a\n  b\n");
        assert_eq!(file.tests[0].command, "echo a \\\n&& echo b");
    }

    #[test]
    fn blank_indented_line_is_empty_expectation() {
        let file = parse(&PathBuf::from("t.t"), "  $ printf 'a\\n\\nb'\n  a\n  \n  b\n");
        assert_eq!(file.tests[0].expectations.len(), 3);
    }

    #[test]
    fn free_comment_is_ignored() {
        let file = parse(&PathBuf::from("t.t"), "This is a free comment.\n\n  $ true\n");
        assert_eq!(file.tests.len(), 1);
        assert_eq!(file.tests[0].command, "true");
    }

    #[test]
    fn hash_prompt_also_introduces_a_command() {
        let file = parse(&PathBuf::from("t.t"), "  # whoami\n  root\n");
        assert_eq!(file.tests[0].command, "whoami");
    }

    #[test]
    fn suffix_reclassifies_regex() {
        let file = parse(&PathBuf::from("t.t"), "  $ echo 123\n  \\d+ (re)\n");
        assert!(matches!(file.tests[0].expectations[0], crate::pattern::Expectation::Regex(_)));
    }

    #[test]
    fn source_lines_are_stable_across_multiple_tests() {
        let file = parse(&PathBuf::from("t.t"), "  $ one\n  out1\n\n  $ two\n  out2\n");
        assert_eq!(file.tests[0].source_line, 1);
        assert_eq!(file.tests[1].source_line, 4);
    }
}
