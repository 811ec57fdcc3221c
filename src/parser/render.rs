//! Pretty-printer (added per SPEC_FULL.md §4.2): renders a `TestFile` back
//! to its dialect's canonical text form, used only by this crate's own
//! round-trip unit tests (§8 "Parsing any file produced by the
//! pretty-printer in §4 yields the same `TestFile`"). Never wired into the
//! CLI — it does not write back into a user's test file.

use crate::model::{Dialect, TestFile};
use crate::pattern::Expectation;

/// Renders `file` back to text in its own dialect.
pub fn render(file: &TestFile) -> String {
    match file.dialect {
        Dialect::Indented => render_indented(file),
        Dialect::Fenced => render_fenced(file),
    }
}

fn render_indented(file: &TestFile) -> String {
    let mut out = String::new();
    for test in &file.tests {
        for (i, line) in test.command.lines().enumerate() {
            if i == 0 {
                out.push_str("  $ ");
            } else {
                out.push_str("  > ");
            }
            out.push_str(line);
            out.push('\n');
        }
        for expectation in &test.expectations {
            out.push_str("  ");
            out.push_str(&render_payload(expectation));
            out.push('\n');
        }
        out.push('\n');
    }
    out
}

fn render_fenced(file: &TestFile) -> String {
    let mut out = String::from("```cliscore\n");
    for test in &file.tests {
        for (i, line) in test.command.lines().enumerate() {
            if i == 0 {
                out.push_str("$ ");
            } else {
                out.push_str("> ");
            }
            out.push_str(line);
            out.push('\n');
        }
        for expectation in &test.expectations {
            out.push_str(&render_payload(expectation));
            out.push('\n');
        }
    }
    out.push_str("```\n");
    out
}

/// Renders one expectation back to its canonical bracketed/suffix form.
fn render_payload(expectation: &Expectation) -> String {
    match expectation {
        Expectation::Literal { text } => text.clone(),
        Expectation::Regex(r) => format!("[Matching: /{}/{}]", r.source, r.flags),
        Expectation::Glob(g) => format!("[Matching glob: {}]", g.source),
        Expectation::Ellipsis => "...".to_string(),
        Expectation::NoEol { text: None } => "[Output ends without end-of-line]".to_string(),
        Expectation::NoEol { text: Some(t) } => format!("{t} (no-eol)"),
        Expectation::Inline(_) => expectation.describe(),
        Expectation::StreamTagged(inner) => format!("[stderr: {}]", render_payload(inner)),
        Expectation::Skip { reason } => format!("[SKIP: {reason}]"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::indented;
    use std::path::PathBuf;

    #[test]
    fn indented_round_trips() {
        let original = "  $ echo hi\n  hi\n";
        let file = indented::parse(&PathBuf::from("t.t"), original);
        let rendered = render(&file);
        let reparsed = indented::parse(&PathBuf::from("t.t"), &rendered);
        assert_eq!(file.tests.len(), reparsed.tests.len());
        assert_eq!(file.tests[0].command, reparsed.tests[0].command);
    }
}
