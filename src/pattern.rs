//! The pattern model (component P): a closed algebra of per-line
//! expectations. A value type with no behavior beyond representation —
//! construction invariants (e.g. that a `Regex` actually compiles) are
//! enforced at parse time, not at use sites, so the matcher never fails to
//! compile a pattern it was handed.

use regex::{Regex, RegexBuilder};

/// Which captured stream an expectation is checked against. Expectations
/// bind to `Stdout` by default; `Expectation::StreamTagged` redirects a
/// single expectation to `Stderr` for exactly one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

/// One fragment of an `Inline` template: either verbatim text or an
/// embedded sub-pattern.
#[derive(Debug, Clone)]
pub enum InlineFragment {
    Literal(String),
    Regex(RegexPattern),
    Glob(GlobPattern),
}

/// A compiled regex expectation, keeping the source text around for
/// diagnostics and round-trip rendering.
#[derive(Debug, Clone)]
pub struct RegexPattern {
    pub source: String,
    pub flags: String,
    pub compiled: Regex,
}

impl RegexPattern {
    /// Compiles `source` anchored to match a whole line, honoring `flags`
    /// (any subset of `i` case-insensitive, `s` dot-matches-newline, `m`
    /// multiline, `u` unicode — unicode is always on for `regex`).
    pub fn compile(source: &str, flags: &str) -> Result<Self, regex::Error> {
        let anchored = format!("^(?:{})$", source);
        let mut builder = RegexBuilder::new(&anchored);
        builder
            .case_insensitive(flags.contains('i'))
            .dot_matches_new_line(flags.contains('s'))
            .multi_line(flags.contains('m'));
        let compiled = builder.build()?;
        Ok(RegexPattern { source: source.to_string(), flags: flags.to_string(), compiled })
    }

    /// Compiles the pattern for embedding unanchored inside a larger
    /// template (used by `Inline`).
    pub fn compile_fragment(source: &str, flags: &str) -> Result<Regex, regex::Error> {
        let mut builder = RegexBuilder::new(source);
        builder
            .case_insensitive(flags.contains('i'))
            .dot_matches_new_line(flags.contains('s'))
            .multi_line(flags.contains('m'));
        builder.build()
    }

    fn is_match(&self, line: &str) -> bool {
        self.compiled.is_match(line)
    }
}

/// A glob expectation: `*` matches a run of characters, `?` matches one
/// character, `\` escapes `*`, `?`, `\`. Compiled to an anchored regex at
/// construction time.
#[derive(Debug, Clone)]
pub struct GlobPattern {
    pub source: String,
    pub compiled: Regex,
}

impl GlobPattern {
    pub fn compile(source: &str) -> Result<Self, regex::Error> {
        let regex_source = glob_to_regex_source(source);
        let anchored = format!("^(?:{})$", regex_source);
        let compiled = Regex::new(&anchored)?;
        Ok(GlobPattern { source: source.to_string(), compiled })
    }

    /// Unanchored regex source, for embedding inside an `Inline` template.
    pub fn to_fragment_source(source: &str) -> String {
        glob_to_regex_source(source)
    }

    fn is_match(&self, line: &str) -> bool {
        self.compiled.is_match(line)
    }
}

/// Translates a glob pattern into regex source: `*` -> `.*`, `?` -> `.`,
/// `\X` -> literal `X` for `X` in `{*, ?, \}`, everything else escaped.
fn glob_to_regex_source(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() * 2);
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '\\' => match chars.peek() {
                Some(&next) if next == '*' || next == '?' || next == '\\' => {
                    out.push_str(&regex::escape(&next.to_string()));
                    chars.next();
                }
                _ => out.push_str(&regex::escape("\\")),
            },
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }
    out
}

/// A parsed `Inline` template: literal fragments interleaved with embedded
/// sub-patterns, the whole of which must match a full line.
#[derive(Debug, Clone)]
pub struct InlineTemplate {
    pub fragments: Vec<InlineFragment>,
    compiled: Regex,
}

impl InlineTemplate {
    pub fn compile(fragments: Vec<InlineFragment>) -> Result<Self, regex::Error> {
        let mut source = String::from("^(?:");
        for fragment in &fragments {
            match fragment {
                InlineFragment::Literal(text) => source.push_str(&regex::escape(text)),
                InlineFragment::Regex(r) => {
                    // Validate the fragment still compiles standalone with
                    // its own flags, then fold those flags into the
                    // composite source via an inline flag group so they
                    // aren't silently dropped when embedded.
                    RegexPattern::compile_fragment(&r.source, &r.flags)?;
                    let group_flags: String = r.flags.chars().filter(|c| matches!(c, 'i' | 's' | 'm')).collect();
                    if group_flags.is_empty() {
                        source.push_str("(?:");
                    } else {
                        source.push_str("(?");
                        source.push_str(&group_flags);
                        source.push(':');
                    }
                    source.push_str(&r.source);
                    source.push(')');
                }
                InlineFragment::Glob(g) => {
                    source.push_str("(?:");
                    source.push_str(&GlobPattern::to_fragment_source(&g.source));
                    source.push(')');
                }
            }
        }
        source.push_str(")$");
        let compiled = Regex::new(&source)?;
        Ok(InlineTemplate { fragments, compiled })
    }

    fn is_match(&self, line: &str) -> bool {
        self.compiled.is_match(line)
    }
}

/// One expectation in a test's expectation list. A closed algebra; the
/// matcher dispatches over these variants by case analysis.
#[derive(Debug, Clone)]
pub enum Expectation {
    /// Matches one line that equals `text` exactly, byte for byte.
    Literal { text: String },
    /// Anchored whole-line regex match.
    Regex(RegexPattern),
    /// Anchored whole-line glob match.
    Glob(GlobPattern),
    /// Matches zero or more consecutive lines on the current stream.
    Ellipsis,
    /// Matches a final line lacking a trailing newline. If `text` is
    /// absent, matches any such line.
    NoEol { text: Option<String> },
    /// A single-line mixed template of literal text and embedded
    /// sub-patterns; the whole template must match the full line.
    Inline(InlineTemplate),
    /// Redirects `inner` to the standard-error stream. Does not persist
    /// across lines — it binds exactly one expectation.
    StreamTagged(Box<Expectation>),
    /// Short-circuits: if present anywhere in a test's expectation list,
    /// the test is reported as skipped with `reason`, taking precedence
    /// over every other expectation in the same test.
    Skip { reason: String },
}

impl Expectation {
    /// The stream this expectation is checked against. `StreamTagged`
    /// expectations target `Stderr`; everything else targets `Stdout`.
    pub fn stream(&self) -> Stream {
        match self {
            Expectation::StreamTagged(_) => Stream::Stderr,
            _ => Stream::Stdout,
        }
    }

    /// The expectation with any `StreamTagged` wrapper stripped, for
    /// single-line matching.
    pub fn unwrap_tagged(&self) -> &Expectation {
        match self {
            Expectation::StreamTagged(inner) => inner.unwrap_tagged(),
            other => other,
        }
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, Expectation::Skip { .. })
    }

    pub fn is_ellipsis(&self) -> bool {
        matches!(self.unwrap_tagged(), Expectation::Ellipsis)
    }

    /// Applies the single-line matching rule for this expectation (after
    /// unwrapping any stream tag). `is_last_stdout` and `had_trailing_newline`
    /// carry the information `NoEol` needs from the executor (§4.4's
    /// last-line-has-newline bit).
    pub fn matches_line(&self, line: &str, is_last_stdout_event: bool, had_trailing_newline: bool) -> bool {
        match self.unwrap_tagged() {
            Expectation::Literal { text } => line == text,
            Expectation::Regex(r) => r.is_match(line),
            Expectation::Glob(g) => g.is_match(line),
            Expectation::Inline(t) => t.is_match(line),
            Expectation::NoEol { text } => {
                is_last_stdout_event
                    && !had_trailing_newline
                    && text.as_deref().map_or(true, |t| t == line)
            }
            Expectation::Ellipsis | Expectation::Skip { .. } | Expectation::StreamTagged(_) => false,
        }
    }

    /// A short, canonical rendering used in diagnostics (not a full
    /// pretty-print — see `crate::parser::render` for the dialect-specific
    /// round-trip form).
    pub fn describe(&self) -> String {
        match self {
            Expectation::Literal { text } => format!("{:?}", text),
            Expectation::Regex(r) => format!("/{}/{}", r.source, r.flags),
            Expectation::Glob(g) => format!("glob {:?}", g.source),
            Expectation::Ellipsis => "...".to_string(),
            Expectation::NoEol { text: Some(t) } => format!("{:?} (no-eol)", t),
            Expectation::NoEol { text: None } => "<any> (no-eol)".to_string(),
            Expectation::Inline(t) => format!("<inline, {} fragments>", t.fragments.len()),
            Expectation::StreamTagged(inner) => format!("stderr: {}", inner.describe()),
            Expectation::Skip { reason } => format!("SKIP: {}", reason),
        }
    }
}
