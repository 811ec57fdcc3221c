//! The parser (component S, §4.2): decodes a test file into a `TestFile`,
//! dispatching on the file's suffix to one of three dialects.

pub(crate) mod bracket;
mod fenced;
mod indented;
pub mod render;

use std::path::Path;

use crate::error::{ErrorKind, InnerTestError};
use crate::model::TestFile;

/// Which suffix-selected dialect governs a file (§6 "File dialects").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SuffixDialect {
    Indented,
    Fenced,
    Mixed,
}

fn suffix_dialect(path: &Path) -> Option<SuffixDialect> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("t") => Some(SuffixDialect::Indented),
        Some("md") => Some(SuffixDialect::Fenced),
        Some("cliscore") => Some(SuffixDialect::Mixed),
        _ => None,
    }
}

/// True iff `path`'s suffix is one this parser recognizes, used by file
/// discovery (§6) to decide what to feed the runner.
pub fn is_test_file(path: &Path) -> bool {
    suffix_dialect(path).is_some()
}

/// Parses `contents` (the bytes of the file at `path`) into a `TestFile`,
/// selecting the dialect from `path`'s suffix (§4.2). `allowed_languages`
/// gates which fenced-block language tags are recognized.
pub fn parse_file(path: &Path, contents: &str, allowed_languages: &[String]) -> Result<TestFile, InnerTestError> {
    let dialect = suffix_dialect(path)
        .ok_or_else(|| InnerTestError::Parse { path: path.to_path_buf(), kind: ErrorKind::ParseError, message: "unsupported file suffix".to_string() })?;

    let file = match dialect {
        SuffixDialect::Indented => indented::parse(path, contents),
        SuffixDialect::Fenced => fenced::parse(path, contents, allowed_languages),
        SuffixDialect::Mixed => {
            if fenced::contains_fence(contents) {
                fenced::parse(path, contents, allowed_languages)
            } else {
                indented::parse(path, contents)
            }
        }
    };

    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn langs() -> Vec<String> {
        vec!["cliscore".to_string(), "console".to_string()]
    }

    #[test]
    fn dot_t_uses_indented_dialect() {
        let file = parse_file(&PathBuf::from("a.t"), "  $ echo hi\n  hi\n", &langs()).unwrap();
        assert_eq!(file.tests.len(), 1);
    }

    #[test]
    fn dot_md_uses_fenced_dialect() {
        let file = parse_file(&PathBuf::from("a.md"), "```cliscore\n$ echo hi\nhi\n```\n", &langs()).unwrap();
        assert_eq!(file.tests.len(), 1);
    }

    #[test]
    fn dot_cliscore_mixed_prefers_fenced_when_present() {
        let file = parse_file(&PathBuf::from("a.cliscore"), "```cliscore\n$ echo hi\nhi\n```\n", &langs()).unwrap();
        assert_eq!(file.tests.len(), 1);
        assert!(matches!(file.dialect, crate::model::Dialect::Fenced));
    }

    #[test]
    fn dot_cliscore_mixed_falls_back_to_indented() {
        let file = parse_file(&PathBuf::from("a.cliscore"), "  $ echo hi\n  hi\n", &langs()).unwrap();
        assert!(matches!(file.dialect, crate::model::Dialect::Indented));
    }

    #[test]
    fn unsupported_suffix_is_a_parse_error() {
        assert!(parse_file(&PathBuf::from("a.txt"), "", &langs()).is_err());
    }
}
