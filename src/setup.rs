//! Setup-script discovery (§4.4): starting at the directory containing a
//! test file and walking toward the filesystem root, find the first file
//! named `cliscore.sh` owned by the same user as the test file.

use std::path::{Path, PathBuf};

use tracing::warn;

/// Finds the nearest `cliscore.sh` above `test_file`, skipping (and
/// logging) any candidate whose owner does not match the test file's.
/// Returns `None` if none is found, meaning all hooks are absent.
pub fn discover(test_file: &Path) -> Option<PathBuf> {
    let test_file_owner = owner_of(test_file);
    let mut dir = test_file.parent()?.to_path_buf();

    loop {
        let candidate = dir.join("cliscore.sh");
        if candidate.is_file() {
            if owners_match(test_file_owner, owner_of(&candidate)) {
                return Some(candidate);
            }
            warn!(
                path = %candidate.display(),
                "skipping setup script owned by a different user than the test file"
            );
        }

        match dir.parent() {
            Some(parent) if parent != dir => dir = parent.to_path_buf(),
            _ => return None,
        }
    }
}

fn owners_match(a: Option<u32>, b: Option<u32>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a == b,
        // Without a concept of file ownership (platforms lacking unix
        // metadata), never refuse a candidate on ownership grounds alone.
        _ => true,
    }
}

#[cfg(unix)]
fn owner_of(path: &Path) -> Option<u32> {
    use std::os::unix::fs::MetadataExt;
    std::fs::metadata(path).ok().map(|m| m.uid())
}

#[cfg(not(unix))]
fn owner_of(_path: &Path) -> Option<u32> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn finds_script_in_parent_directory() {
        let root = tempfile::tempdir().unwrap();
        let nested = root.path().join("a/b");
        fs::create_dir_all(&nested).unwrap();
        fs::write(root.path().join("cliscore.sh"), "").unwrap();
        let test_file = nested.join("case.t");
        fs::write(&test_file, "").unwrap();

        let found = discover(&test_file).unwrap();
        assert_eq!(found, root.path().join("cliscore.sh"));
    }

    #[test]
    fn absent_script_yields_none() {
        let root = tempfile::tempdir().unwrap();
        let test_file = root.path().join("case.t");
        fs::write(&test_file, "").unwrap();
        assert!(discover(&test_file).is_none());
    }

    #[test]
    fn nearest_script_wins_over_a_farther_one() {
        let root = tempfile::tempdir().unwrap();
        let nested = root.path().join("a");
        fs::create_dir_all(&nested).unwrap();
        fs::write(root.path().join("cliscore.sh"), "# far").unwrap();
        fs::write(nested.join("cliscore.sh"), "# near").unwrap();
        let test_file = nested.join("case.t");
        fs::write(&test_file, "").unwrap();

        let found = discover(&test_file).unwrap();
        assert_eq!(found, nested.join("cliscore.sh"));
    }
}
