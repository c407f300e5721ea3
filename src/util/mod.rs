//! Shared utilities for `tasksync`.
//!
//! - Date parsing and formatting for due dates
//! - Whitespace normalization for drift comparison
//! - Atomic file writes for the persisted JSON files

pub mod time;

use std::fs;
use std::io::Write;
use std::path::Path;

/// Collapse runs of whitespace to single spaces and trim the ends.
///
/// Line structure is not preserved; two texts that differ only in
/// spacing or line breaks normalize to the same string.
#[must_use]
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Write `contents` to `path` through a sibling temp file and a rename.
///
/// Readers see either the old file or the new one, never a torn write.
/// Parent directories are created when missing.
///
/// # Errors
///
/// Returns an I/O error if the directory, temp file, or rename fails.
pub fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut temp_name = path.file_name().unwrap_or_default().to_os_string();
    temp_name.push(".tmp");
    let temp_path = path.with_file_name(temp_name);

    {
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(contents)?;
        file.sync_all()?;
    }

    fs::rename(&temp_path, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn normalize_collapses_runs_and_newlines() {
        assert_eq!(
            normalize_whitespace("  Pay   rent\n\n on time  "),
            "Pay rent on time"
        );
    }

    #[test]
    fn normalize_empty_is_empty() {
        assert_eq!(normalize_whitespace(" \n\t "), "");
    }

    #[test]
    fn write_atomic_creates_parents_and_replaces() {
        let temp = TempDir::new().expect("temp dir");
        let path = temp.path().join("state").join("store.json");

        write_atomic(&path, b"first").expect("first write");
        write_atomic(&path, b"second").expect("second write");

        assert_eq!(fs::read_to_string(&path).unwrap(), "second");
        assert!(!temp.path().join("state").join("store.json.tmp").exists());
    }
}
