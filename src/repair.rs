//! Line-level repair of generated resource definitions.
//!
//! The validator reports 1-based line numbers against the file as it stood
//! right after import and provider rewrite; removing exactly those lines is
//! a blunt repair that assumes one flagged line is one removable statement.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use tracing::debug;

use crate::error::Result;

/// 1-based line numbers flagged by a single validation pass. Built once per
/// run and consumed by exactly one [`repair_file`] call.
pub type DiagnosticSet = BTreeSet<usize>;

/// Remove every line whose 1-based number is in `flagged`, preserving the
/// order of the remaining lines.
pub fn strip_lines(contents: &str, flagged: &DiagnosticSet) -> String {
    contents
        .split('\n')
        .enumerate()
        .filter(|(index, _)| !flagged.contains(&(index + 1)))
        .map(|(_, line)| line)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Rewrite `path` with the flagged lines removed. The new contents go to a
/// temporary file in the same directory first and are renamed over the
/// original, so a crash mid-write cannot truncate the file.
pub fn repair_file(path: &Path, flagged: DiagnosticSet) -> Result<()> {
    let contents = fs::read_to_string(path)?;
    let repaired = strip_lines(&contents, &flagged);

    let tmp = path.with_extension("tf.tmp");
    fs::write(&tmp, &repaired)?;
    fs::rename(&tmp, path)?;

    debug!(
        path = %path.display(),
        removed = flagged.len(),
        "repaired resource definitions"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn set(lines: &[usize]) -> DiagnosticSet {
        lines.iter().copied().collect()
    }

    #[test]
    fn test_empty_set_is_identity() {
        let contents = "resource \"aws_instance\" \"web\" {\n  ami = \"ami-1\"\n}\n";
        assert_eq!(strip_lines(contents, &set(&[])), contents);
    }

    #[test]
    fn test_removes_flagged_lines_in_order() {
        let contents = "one\ntwo\nthree\nfour\nfive";
        assert_eq!(strip_lines(contents, &set(&[2, 4])), "one\nthree\nfive");
    }

    #[test]
    fn test_out_of_range_lines_are_ignored() {
        let contents = "one\ntwo";
        assert_eq!(strip_lines(contents, &set(&[0, 5, 99])), contents);
    }

    #[test]
    fn test_trailing_newline_is_preserved() {
        let contents = "one\ntwo\n";
        assert_eq!(strip_lines(contents, &set(&[1])), "two\n");
    }

    #[test]
    fn test_multi_line_block_is_not_healed() {
        // Only the flagged line goes; the repair knowingly leaves the rest
        // of a multi-line attribute behind.
        let contents = "metadata_options {\n  http_tokens = \"...\"\n}\nami = \"ami-1\"";
        assert_eq!(
            strip_lines(contents, &set(&[2])),
            "metadata_options {\n}\nami = \"ami-1\""
        );
    }

    #[test]
    fn test_repair_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("resources.tf");
        fs::write(&path, "keep\ndrop\nkeep\ndrop\nkeep\n").unwrap();

        repair_file(&path, set(&[2, 4])).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "keep\nkeep\nkeep\n");
        assert!(!dir.path().join("resources.tf.tmp").exists());
    }

    #[test]
    fn test_repair_file_with_empty_set_is_byte_identical() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("resources.tf");
        let contents = "resource \"aws_instance\" \"web\" {\n  ami = \"ami-1\"\n}\n";
        fs::write(&path, contents).unwrap();

        repair_file(&path, set(&[])).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), contents);
    }
}
