// File discovery for ingest

use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use crate::constants::{SKIP_DIRECTORY, SKIP_HIDDEN};

/// True for dot-files and dot-directories
pub fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false)
}

/// Why a path cannot be scanned as a media source, if it can't
pub fn skip_reason(path: &Path) -> Option<&'static str> {
    if path.is_dir() {
        Some(SKIP_DIRECTORY)
    } else if is_hidden(path) {
        Some(SKIP_HIDDEN)
    } else {
        None
    }
}

/// Result of walking a source tree
#[derive(Debug, Default)]
pub struct Discovered {
    pub files: Vec<PathBuf>,
    /// Entries the walker could not read
    pub errors: Vec<String>,
}

/// Walk a directory in file-name order. Hidden directories are pruned;
/// hidden files are returned so the caller can report them as skipped.
pub fn discover_files(source_path: &Path) -> Discovered {
    let mut found = Discovered::default();

    if source_path.is_file() {
        found.files.push(source_path.to_path_buf());
        return found;
    }

    let walker = WalkDir::new(source_path)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !(e.file_type().is_dir() && is_hidden(e.path())));

    for entry in walker {
        match entry {
            Ok(entry) if entry.file_type().is_file() => found.files.push(entry.into_path()),
            Ok(_) => {}
            Err(e) => found.errors.push(e.to_string()),
        }
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_skip_reason() {
        let tmp = TempDir::new().unwrap();
        let hidden = tmp.path().join(".DS_Store");
        let visible = tmp.path().join("movie.mkv");
        fs::write(&hidden, b"x").unwrap();
        fs::write(&visible, b"x").unwrap();

        assert_eq!(skip_reason(tmp.path()), Some(SKIP_DIRECTORY));
        assert_eq!(skip_reason(&hidden), Some(SKIP_HIDDEN));
        assert_eq!(skip_reason(&visible), None);
    }

    #[test]
    fn test_discover_sorted_and_prunes_hidden_dirs() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("b")).unwrap();
        fs::create_dir_all(root.join(".trash")).unwrap();
        fs::write(root.join("b").join("2.mkv"), b"x").unwrap();
        fs::write(root.join("a.mkv"), b"x").unwrap();
        fs::write(root.join(".hidden.mkv"), b"x").unwrap();
        fs::write(root.join(".trash").join("gone.mkv"), b"x").unwrap();

        let found = discover_files(root);
        let names: Vec<String> = found
            .files
            .iter()
            .map(|p| p.strip_prefix(root).unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec![".hidden.mkv", "a.mkv", "b/2.mkv"]);
        assert!(found.errors.is_empty());
    }

    #[test]
    fn test_discover_single_file() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("one.mp3");
        fs::write(&file, b"x").unwrap();
        assert_eq!(discover_files(&file).files, vec![file]);
    }
}
