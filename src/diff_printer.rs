//! Renders a line-oriented diff between expected and actual output for the
//! CLI's normal/verbose verbosity tiers, using `similar`'s `TextDiff` the
//! way the teacher's own diff renderer used the (now superseded)
//! `difference` crate.

use std::fmt::{self, Display, Formatter};

use colored::Colorize;
use similar::{ChangeTag, TextDiff};

pub struct DiffPrinter<'a> {
    expected: &'a str,
    actual: &'a str,
}

impl<'a> DiffPrinter<'a> {
    pub fn new(expected: &'a str, actual: &'a str) -> Self {
        DiffPrinter { expected, actual }
    }
}

impl Display for DiffPrinter<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let diff = TextDiff::from_lines(self.expected, self.actual);
        let mut line = 1usize;
        for change in diff.iter_all_changes() {
            let prefix = match change.tag() {
                ChangeTag::Delete => "-".red(),
                ChangeTag::Insert => "+".green(),
                ChangeTag::Equal => " ".normal(),
            };
            let text = change.value().trim_end_matches('\n');
            match change.tag() {
                ChangeTag::Equal => {
                    writeln!(f, "{:3}| {} {}", line, prefix, text)?;
                    line += 1;
                }
                ChangeTag::Delete => {
                    writeln!(f, "{:3}| {} {}", line, prefix, text.red())?;
                    line += 1;
                }
                ChangeTag::Insert => {
                    writeln!(f, "   | {} {}", prefix, text.green())?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_additions_and_removals() {
        let printer = DiffPrinter::new("a\nb\n", "a\nc\n");
        let rendered = format!("{printer}");
        assert!(rendered.contains('a'));
        assert!(rendered.contains('b'));
        assert!(rendered.contains('c'));
    }
}
