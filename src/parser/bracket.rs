//! Bracketed and inline expectation forms shared by both dialects
//! (§4.2 "Bracketed forms"), plus the per-line suffix reclassification
//! used by the indented dialect.

use crate::pattern::{Expectation, GlobPattern, InlineFragment, InlineTemplate, RegexPattern};

/// Parses a single expected-output payload (after any dialect-specific
/// prefix has already been stripped) into an `Expectation`. Handles the
/// bracketed forms, the bare `...` ellipsis line, and inline-mixed
/// detection. Falls back to `Literal` for anything else, including
/// malformed bracket payloads (§4.2 "Failure semantics": these degrade to
/// `Literal` rather than raising a parse error).
pub(crate) fn parse_payload(payload: &str) -> Expectation {
    if payload == "..." {
        return Expectation::Ellipsis;
    }

    if let Some(reason) = strip_bracket(payload, "[SKIP:") {
        return Expectation::Skip { reason: reason.trim().to_string() };
    }

    if payload == "[Output ends without end-of-line]" {
        return Expectation::NoEol { text: None };
    }

    if let Some(rest) = strip_bracket(payload, "[stderr:") {
        let inner = parse_non_stream_tagged(rest.trim());
        return Expectation::StreamTagged(Box::new(inner));
    }

    if let Some(rest) = parse_non_bracket_stream_forms(payload) {
        return rest;
    }

    if let Some(inline) = try_parse_inline(payload) {
        return inline;
    }

    Expectation::Literal { text: payload.to_string() }
}

/// Parses the non-`[stderr: ...]` bracket forms (literal/glob/regex),
/// shared between the top-level payload parser and the `[stderr: ...]`
/// wrapper's inner payload.
fn parse_non_bracket_stream_forms(payload: &str) -> Option<Expectation> {
    if let Some(rest) = strip_bracket(payload, "[Literal text:") {
        return Some(Expectation::Literal { text: strip_outer_quotes(rest.trim()) });
    }
    if let Some(rest) = strip_bracket(payload, "[Matching glob:") {
        let pattern = rest.trim();
        return Some(match GlobPattern::compile(pattern) {
            Ok(g) => Expectation::Glob(g),
            Err(_) => Expectation::Literal { text: payload.to_string() },
        });
    }
    if let Some(rest) = strip_bracket(payload, "[Matching:") {
        let (pattern, flags) = split_pattern_flags(rest.trim());
        return Some(match RegexPattern::compile(pattern, flags) {
            Ok(r) => Expectation::Regex(r),
            Err(_) => Expectation::Literal { text: payload.to_string() },
        });
    }
    None
}

/// Same as `parse_payload` but never re-wraps in `StreamTagged` — used for
/// the text following `[stderr: ...]`, since stream tagging binds a single
/// expectation and does not nest.
fn parse_non_stream_tagged(payload: &str) -> Expectation {
    if payload == "..." {
        return Expectation::Ellipsis;
    }
    if let Some(reason) = strip_bracket(payload, "[SKIP:") {
        return Expectation::Skip { reason: reason.trim().to_string() };
    }
    if payload == "[Output ends without end-of-line]" {
        return Expectation::NoEol { text: None };
    }
    if let Some(e) = parse_non_bracket_stream_forms(payload) {
        return e;
    }
    if let Some(inline) = try_parse_inline(payload) {
        return inline;
    }
    Expectation::Literal { text: payload.to_string() }
}

/// Strips a `[prefix ... ]` bracket, returning the inner text if `line`
/// starts with `prefix` and ends with `]`.
fn strip_bracket<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(prefix)?;
    rest.strip_suffix(']')
}

fn strip_outer_quotes(s: &str) -> String {
    if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        s[1..s.len() - 1].to_string()
    } else {
        s.to_string()
    }
}

/// Splits a `[Matching: ...]` payload into `(pattern, flags)`; the payload
/// may be a bare pattern or a `/pattern/flags` pair.
fn split_pattern_flags(payload: &str) -> (&str, &str) {
    if let Some(rest) = payload.strip_prefix('/') {
        if let Some(last_slash) = rest.rfind('/') {
            return (&rest[..last_slash], &rest[last_slash + 1..]);
        }
    }
    (payload, "")
}

const GLOB_MARKER: &str = "[Matching glob: ";
const REGEX_MARKER: &str = "[Matching: ";

/// From `body_start` (just past an already-consumed opening `[`), scans
/// forward tracking bracket depth and returns the index of the `]` that
/// closes it. Unlike a `[^\]]*` regex class, this doesn't stop at the first
/// `]` it sees, so an embedded character class (e.g. `/[0-9]+/`) matches
/// through to its own closing bracket instead of truncating there.
fn find_balanced_close(line: &str, body_start: usize) -> Option<usize> {
    let mut depth = 1i32;
    for (i, c) in line[body_start..].char_indices() {
        match c {
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(body_start + i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Finds the earliest `[Matching glob: ...]` or `[Matching: ...]` fragment
/// at or after byte offset `from`. Returns `(marker_start, body_start,
/// is_glob, close_index)`, where `body_start..close_index` is the inner
/// pattern text. Skips past markers whose bracket never closes and keeps
/// looking, rather than giving up on the whole line.
fn find_next_marker(line: &str, from: usize) -> Option<(usize, usize, bool, usize)> {
    let mut search_from = from;
    loop {
        let glob_at = line[search_from..].find(GLOB_MARKER).map(|i| i + search_from);
        let regex_at = line[search_from..].find(REGEX_MARKER).map(|i| i + search_from);
        let (start, body_start, is_glob) = match (glob_at, regex_at) {
            (Some(g), Some(r)) if r < g => (r, r + REGEX_MARKER.len(), false),
            (Some(g), _) => (g, g + GLOB_MARKER.len(), true),
            (None, Some(r)) => (r, r + REGEX_MARKER.len(), false),
            (None, None) => return None,
        };
        match find_balanced_close(line, body_start) {
            Some(close) => return Some((start, body_start, is_glob, close)),
            None => {
                search_from = start + 1;
            }
        }
    }
}

/// Detects an inline-mixed line: literal text interleaved with `[Matching:
/// ...]` / `[Matching glob: ...]` fragments. Returns `None` if the line
/// contains no such fragment (the caller then falls back to `Literal`).
fn try_parse_inline(line: &str) -> Option<Expectation> {
    let mut fragments = Vec::new();
    let mut last_end = 0;
    let mut found_any = false;
    let mut pos = 0;
    while let Some((start, body_start, is_glob, close)) = find_next_marker(line, pos) {
        found_any = true;
        if start > last_end {
            fragments.push(InlineFragment::Literal(line[last_end..start].to_string()));
        }
        let body = &line[body_start..close];
        if is_glob {
            if let Ok(g) = GlobPattern::compile(body) {
                fragments.push(InlineFragment::Glob(g));
            } else {
                fragments.push(InlineFragment::Literal(line[start..close + 1].to_string()));
            }
        } else {
            let (pattern, flags) = split_pattern_flags(body);
            if let Ok(r) = RegexPattern::compile(pattern, flags) {
                fragments.push(InlineFragment::Regex(r));
            } else {
                fragments.push(InlineFragment::Literal(line[start..close + 1].to_string()));
            }
        }
        last_end = close + 1;
        pos = last_end;
    }
    if !found_any {
        return None;
    }
    if last_end < line.len() {
        fragments.push(InlineFragment::Literal(line[last_end..].to_string()));
    }
    // A single fragment spanning the whole line is just a plain
    // regex/glob expectation, already handled by the caller before
    // inline detection runs; guard here too for direct callers.
    if fragments.len() == 1 {
        if let InlineFragment::Glob(g) = &fragments[0] {
            return Some(Expectation::Glob(g.clone()));
        }
        if let InlineFragment::Regex(r) = &fragments[0] {
            return Some(Expectation::Regex(r.clone()));
        }
    }
    InlineTemplate::compile(fragments).ok().map(Expectation::Inline)
}

/// The indented dialect's per-line suffix reclassification: `(re)`,
/// `(glob)`, `(no-eol)`, `(esc)` on an output line. Falls through to the
/// shared bracket/inline parsing when no suffix is present.
pub(crate) fn parse_payload_with_suffix(payload: &str) -> Expectation {
    if let Some(stripped) = payload.strip_suffix(" (re)") {
        return match RegexPattern::compile(stripped, "") {
            Ok(r) => Expectation::Regex(r),
            Err(_) => Expectation::Literal { text: payload.to_string() },
        };
    }
    if let Some(stripped) = payload.strip_suffix(" (glob)") {
        return match GlobPattern::compile(stripped) {
            Ok(g) => Expectation::Glob(g),
            Err(_) => Expectation::Literal { text: payload.to_string() },
        };
    }
    if let Some(stripped) = payload.strip_suffix(" (no-eol)") {
        return Expectation::NoEol { text: Some(stripped.to_string()) };
    }
    if let Some(stripped) = payload.strip_suffix(" (esc)") {
        return Expectation::Literal { text: unescape_cram(stripped) };
    }
    parse_payload(payload)
}

/// Interprets a small set of backslash escapes (`\n`, `\t`, `\r`, `\\`,
/// `\xHH`) in the cram `(esc)` convention. Unrecognized escapes are left
/// verbatim.
fn unescape_cram(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('n') => {
                out.push('\n');
                chars.next();
            }
            Some('t') => {
                out.push('\t');
                chars.next();
            }
            Some('r') => {
                out.push('\r');
                chars.next();
            }
            Some('\\') => {
                out.push('\\');
                chars.next();
            }
            Some('x') => {
                let rest: String = chars.clone().skip(1).take(2).collect();
                if rest.len() == 2 {
                    if let Ok(byte) = u8::from_str_radix(&rest, 16) {
                        out.push(byte as char);
                        chars.next();
                        chars.next();
                        chars.next();
                        continue;
                    }
                }
                out.push('\\');
            }
            _ => out.push('\\'),
        }
    }
    out
}

/// Collapses consecutive `Ellipsis` expectations (on the same target
/// stream) into one, per §8's "Two successive `Ellipsis` reduce to one"
/// normalization.
pub(crate) fn normalize(expectations: Vec<Expectation>) -> Vec<Expectation> {
    let mut out: Vec<Expectation> = Vec::with_capacity(expectations.len());
    for e in expectations {
        if e.is_ellipsis() {
            if let Some(last) = out.last() {
                if last.is_ellipsis() && last.stream() == e.stream() {
                    continue;
                }
            }
        }
        out.push(e);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_text_bracket() {
        let e = parse_payload(r#"[Literal text: "hello world"]"#);
        matches!(e, Expectation::Literal { .. });
        if let Expectation::Literal { text } = e {
            assert_eq!(text, "hello world");
        } else {
            panic!("expected literal");
        }
    }

    #[test]
    fn matching_glob_bracket() {
        let e = parse_payload("[Matching glob: foo*bar]");
        assert!(matches!(e, Expectation::Glob(_)));
    }

    #[test]
    fn matching_regex_with_flags() {
        let e = parse_payload("[Matching: /^foo$/i]");
        assert!(matches!(e, Expectation::Regex(_)));
    }

    #[test]
    fn stderr_wraps_literal() {
        let e = parse_payload("[stderr: boom]");
        assert!(matches!(e, Expectation::StreamTagged(_)));
    }

    #[test]
    fn bare_ellipsis() {
        assert!(matches!(parse_payload("..."), Expectation::Ellipsis));
    }

    #[test]
    fn output_ends_without_eol() {
        assert!(matches!(
            parse_payload("[Output ends without end-of-line]"),
            Expectation::NoEol { text: None }
        ));
    }

    #[test]
    fn skip_bracket() {
        let e = parse_payload("[SKIP: not implemented yet]");
        if let Expectation::Skip { reason } = e {
            assert_eq!(reason, "not implemented yet");
        } else {
            panic!("expected skip");
        }
    }

    #[test]
    fn malformed_bracket_degrades_to_literal() {
        let e = parse_payload("[Matching: ");
        assert!(matches!(e, Expectation::Literal { .. }));
    }

    #[test]
    fn inline_mixed_line() {
        let e = parse_payload("value=[Matching: /[0-9]+/] ok");
        assert!(matches!(e, Expectation::Inline(_)));
        if let Expectation::Inline(t) = &e {
            assert!(t_matches(t, "value=42 ok"));
            assert!(!t_matches(t, "value=abc ok"));
        }
    }

    fn t_matches(t: &crate::pattern::InlineTemplate, line: &str) -> bool {
        let e = Expectation::Inline(t.clone());
        e.matches_line(line, false, true)
    }

    #[test]
    fn normalize_collapses_consecutive_ellipsis() {
        let input = vec![Expectation::Ellipsis, Expectation::Ellipsis, Expectation::Literal { text: "x".into() }];
        let out = normalize(input);
        assert_eq!(out.len(), 2);
    }
}
