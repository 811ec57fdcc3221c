//! The matcher (component M, §4.3): given captured stdout lines, captured
//! stderr lines, and an expectation list, decide whether the output
//! satisfies the expectations, or produce a diagnostic explaining why not.

use crate::model::ExecutionResult;
use crate::pattern::{Expectation, Stream};

/// One captured line tagged with the stream it arrived on.
#[derive(Debug, Clone, Copy)]
struct Event<'a> {
    line: &'a str,
    stream: Stream,
    index: usize,
}

/// The outcome of matching one test's captured output against its
/// expectation list.
#[derive(Debug, Clone)]
pub enum MatchOutcome {
    Passed,
    Skipped { reason: String },
    Failed { diagnostic: String },
}

/// Merges stdout and stderr into one ordered event list per §4.3: "standard
/// output preceding standard error in stable order" — i.e. all stdout
/// events come first, followed by all stderr events, each side preserving
/// its own arrival order.
fn merge_events<'a>(stdout: &'a [String], stderr: &'a [String]) -> Vec<Event<'a>> {
    let mut events = Vec::with_capacity(stdout.len() + stderr.len());
    for (i, line) in stdout.iter().enumerate() {
        events.push(Event { line, stream: Stream::Stdout, index: i });
    }
    for (i, line) in stderr.iter().enumerate() {
        events.push(Event { line, stream: Stream::Stderr, index: i });
    }
    events
}

/// Runs the matcher against one command's `ExecutionResult` and expectation
/// list.
pub fn matches(result: &ExecutionResult, expectations: &[Expectation]) -> MatchOutcome {
    if let Some(reason) = expectations.iter().find_map(|e| match e {
        Expectation::Skip { reason } => Some(reason.clone()),
        _ => None,
    }) {
        return MatchOutcome::Skipped { reason };
    }

    let events = merge_events(&result.stdout, &result.stderr);
    let last_stdout_index = result.stdout.len().checked_sub(1);

    let is_last_stdout_event = |e: &Event| -> bool {
        e.stream == Stream::Stdout && last_stdout_index == Some(e.index)
    };

    let mut cursor = 0usize;
    let mut i = 0usize;
    while i < expectations.len() {
        let expectation = &expectations[i];
        let target_stream = expectation.stream();

        if expectation.unwrap_tagged().is_ellipsis() {
            // Peek at the next expectation, if any, and advance the cursor,
            // skipping lines the ellipsis is allowed to swallow, until one
            // matches `next`. The ellipsis's own stream (`target_stream`)
            // and the next expectation's stream (`next_stream`) may differ
            // — e.g. a `[stderr: ...]` ellipsis followed by a plain stdout
            // line. Only events on `target_stream` are silently skippable;
            // once the cursor reaches an event on `next_stream`, it must
            // match right away, since the ellipsis has no authority to
            // swallow lines outside its own stream.
            match expectations.get(i + 1) {
                None => return MatchOutcome::Passed,
                Some(next) => {
                    let next_stream = next.stream();
                    loop {
                        if cursor >= events.len() {
                            return MatchOutcome::Failed {
                                diagnostic: format!(
                                    "missing output for expectation {} (ellipsis never found a matching line)",
                                    next.describe()
                                ),
                            };
                        }
                        let event = events[cursor];
                        if event.stream == next_stream {
                            if next.matches_line(event.line, is_last_stdout_event(&event), result.stdout_had_trailing_newline) {
                                // Bind `next` to this event and continue the
                                // outer walk from the expectation after it.
                                cursor += 1;
                                i += 2;
                                break;
                            }
                            if target_stream == next_stream {
                                // Same-stream ellipsis: this non-matching
                                // line is part of the gap it covers.
                                cursor += 1;
                                continue;
                            }
                            return MatchOutcome::Failed { diagnostic: diagnose_mismatch(next, &event) };
                        }
                        if event.stream == target_stream {
                            cursor += 1;
                            continue;
                        }
                        // Neither stream of interest; not reachable with
                        // today's two streams, but skip past it rather than
                        // looping forever.
                        cursor += 1;
                    }
                    continue;
                }
            }
        }

        while cursor < events.len() && events[cursor].stream != target_stream {
            cursor += 1;
        }

        if cursor >= events.len() {
            return MatchOutcome::Failed {
                diagnostic: format!("missing output for expectation {}", expectation.describe()),
            };
        }

        let event = events[cursor];
        if !expectation.matches_line(event.line, is_last_stdout_event(&event), result.stdout_had_trailing_newline) {
            return MatchOutcome::Failed { diagnostic: diagnose_mismatch(expectation, &event) };
        }

        cursor += 1;
        i += 1;
    }

    if cursor < events.len() {
        let remaining: Vec<_> = events[cursor..].iter().take(3).collect();
        let mut lines: Vec<String> = remaining
            .iter()
            .map(|e| format!("{}{}", stream_prefix(e.stream), e.line))
            .collect();
        if events.len() - cursor > 3 {
            lines.push("...".to_string());
        }
        return MatchOutcome::Failed {
            diagnostic: format!(
                "unexpected extra output (add these as expectations, e.g.):\n{}",
                lines.join("\n")
            ),
        };
    }

    MatchOutcome::Passed
}

fn stream_prefix(s: Stream) -> &'static str {
    match s {
        Stream::Stdout => "",
        Stream::Stderr => "[stderr: ",
    }
}

/// Builds a diagnostic for a failed single-line match, distinguishing
/// substring overlap, case-only difference, and whitespace-only difference
/// for `Literal` expectations (§4.3 "Diagnostic quality").
fn diagnose_mismatch(expectation: &Expectation, event: &Event) -> String {
    let actual = event.line;
    let base = format!(
        "line {} on {}: expected {}, got {:?}",
        event.index,
        stream_name(event.stream),
        expectation.describe(),
        actual
    );

    if let Expectation::Literal { text } = expectation.unwrap_tagged() {
        if text.eq_ignore_ascii_case(actual) {
            return format!("{base} (differs only in letter case)");
        }
        if text.trim() == actual.trim() {
            return format!("{base} (differs only in surrounding whitespace)");
        }
        if text.contains(actual.as_str()) || actual.contains(text.as_str()) {
            return format!("{base} (one is a substring of the other)");
        }
    }

    base
}

fn stream_name(s: Stream) -> &'static str {
    match s {
        Stream::Stdout => "stdout",
        Stream::Stderr => "stderr",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::{Expectation, GlobPattern, RegexPattern};
    use std::time::Duration;

    fn result(stdout: &[&str], stderr: &[&str]) -> ExecutionResult {
        ExecutionResult {
            stdout: stdout.iter().map(|s| s.to_string()).collect(),
            stderr: stderr.iter().map(|s| s.to_string()).collect(),
            exit_status: 0,
            duration: Duration::from_millis(1),
            stdout_had_trailing_newline: true,
            error: None,
        }
    }

    fn lit(s: &str) -> Expectation {
        Expectation::Literal { text: s.to_string() }
    }

    #[test]
    fn literal_pass() {
        let r = result(&["hello world"], &[]);
        let outcome = matches(&r, &[lit("hello world")]);
        assert!(matches!(outcome, MatchOutcome::Passed));
    }

    #[test]
    fn literal_fail_reports_diagnostic() {
        let r = result(&["goodbye"], &[]);
        let outcome = matches(&r, &[lit("hello")]);
        assert!(matches!(outcome, MatchOutcome::Failed { .. }));
    }

    #[test]
    fn blank_middle_line() {
        let r = result(&["a", "", "b"], &[]);
        let outcome = matches(&r, &[lit("a"), lit(""), lit("b")]);
        assert!(matches!(outcome, MatchOutcome::Passed));
    }

    #[test]
    fn stderr_tag_matches_stderr_stream() {
        let r = result(&["out"], &["err"]);
        let exp = vec![lit("out"), Expectation::StreamTagged(Box::new(lit("err")))];
        assert!(matches!(matches(&r, &exp), MatchOutcome::Passed));
    }

    #[test]
    fn ellipsis_skips_middle_lines() {
        let r = result(&["first", "mid1", "mid2", "last"], &[]);
        let exp = vec![lit("first"), Expectation::Ellipsis, lit("last")];
        assert!(matches!(matches(&r, &exp), MatchOutcome::Passed));
    }

    #[test]
    fn ellipsis_at_tail_matches_empty_suffix() {
        let r = result(&["only"], &[]);
        let exp = vec![lit("only"), Expectation::Ellipsis];
        assert!(matches!(matches(&r, &exp), MatchOutcome::Passed));
    }

    #[test]
    fn ellipsis_at_tail_matches_nonempty_suffix() {
        let r = result(&["only", "extra1", "extra2"], &[]);
        let exp = vec![lit("only"), Expectation::Ellipsis];
        assert!(matches!(matches(&r, &exp), MatchOutcome::Passed));
    }

    #[test]
    fn extra_output_fails() {
        let r = result(&["a", "b"], &[]);
        let outcome = matches(&r, &[lit("a")]);
        assert!(matches!(outcome, MatchOutcome::Failed { .. }));
    }

    #[test]
    fn skip_short_circuits() {
        let r = result(&["anything"], &[]);
        let exp = vec![lit("nope"), Expectation::Skip { reason: "wip".into() }];
        match matches(&r, &exp) {
            MatchOutcome::Skipped { reason } => assert_eq!(reason, "wip"),
            _ => panic!("expected skip"),
        }
    }

    #[test]
    fn no_eol_requires_last_stdout_event_without_newline() {
        let mut r = result(&["line1", "line2"], &[]);
        r.stdout_had_trailing_newline = false;
        let exp = vec![lit("line1"), Expectation::NoEol { text: Some("line2".into()) }];
        assert!(matches!(matches(&r, &exp), MatchOutcome::Passed));
    }

    #[test]
    fn no_eol_fails_when_trailing_newline_present() {
        let r = result(&["line1", "line2"], &[]);
        let exp = vec![lit("line1"), Expectation::NoEol { text: Some("line2".into()) }];
        assert!(matches!(matches(&r, &exp), MatchOutcome::Failed { .. }));
    }

    #[test]
    fn regex_and_glob_match() {
        let r = result(&["abc123", "foobar"], &[]);
        let regex = Expectation::Regex(RegexPattern::compile(r"abc\d+", "").unwrap());
        let glob = Expectation::Glob(GlobPattern::compile("foo*").unwrap());
        assert!(matches!(matches(&r, &[regex, glob]), MatchOutcome::Passed));
    }

    #[test]
    fn diagnostic_notes_case_only_difference() {
        let r = result(&["Hello"], &[]);
        match matches(&r, &[lit("hello")]) {
            MatchOutcome::Failed { diagnostic } => assert!(diagnostic.contains("letter case")),
            _ => panic!("expected failure"),
        }
    }

    #[test]
    fn ellipsis_on_one_stream_can_be_followed_by_a_match_on_another() {
        let r = result(&["noise1", "noise2"], &["err"]);
        let exp = vec![Expectation::Ellipsis, Expectation::StreamTagged(Box::new(lit("err")))];
        assert!(matches!(matches(&r, &exp), MatchOutcome::Passed));
    }

    #[test]
    fn ellipsis_on_one_stream_does_not_swallow_a_mismatch_on_another() {
        let r = result(&["noise1"], &["boom"]);
        let exp = vec![Expectation::Ellipsis, Expectation::StreamTagged(Box::new(lit("err")))];
        match matches(&r, &exp) {
            MatchOutcome::Failed { diagnostic } => assert!(!diagnostic.contains("ellipsis never found")),
            other => panic!("expected failure, got {other:?}"),
        }
    }
}
