//! Input discovery for RAPIC files
//!
//! Each input may be a file, a directory (walked recursively for files with
//! a RAPIC extension) or a glob pattern.

use crate::constants::RAPIC_FILE_EXTENSIONS;
use crate::error::{RapicError, Result};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// File discovery component for RAPIC inputs
#[derive(Debug, Clone)]
pub struct FileDiscovery {
    inputs: Vec<String>,
}

impl FileDiscovery {
    pub fn new(inputs: Vec<String>) -> Self {
        Self { inputs }
    }

    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    /// Resolves every input into a sorted, de-duplicated file list
    pub fn discover(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for input in &self.inputs {
            let path = Path::new(input);
            if path.is_file() {
                files.push(path.to_path_buf());
            } else if path.is_dir() {
                files.extend(discover_directory(path));
            } else {
                files.extend(discover_pattern(input)?);
            }
        }
        files.sort();
        files.dedup();
        debug!("Discovered {} RAPIC files", files.len());
        Ok(files)
    }
}

pub fn has_rapic_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            RAPIC_FILE_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
}

fn discover_directory(dir: &Path) -> Vec<PathBuf> {
    debug!("Searching for RAPIC files in: {}", dir.display());
    WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                debug!("Skipping unreadable entry: {}", err);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file() && has_rapic_extension(entry.path()))
        .map(|entry| entry.into_path())
        .collect()
}

fn discover_pattern(pattern: &str) -> Result<Vec<PathBuf>> {
    let entries = glob::glob(pattern).map_err(|e| RapicError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })?;
    let files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .filter(|path| path.is_file())
        .collect();

    if files.is_empty() {
        return Err(RapicError::InputNotFound {
            path: PathBuf::from(pattern),
        });
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"").unwrap();
    }

    #[test]
    fn test_directory_walk_filters_extensions() {
        let temp_dir = TempDir::new().unwrap();
        touch(&temp_dir.path().join("a.rapic"));
        touch(&temp_dir.path().join("nested/deeper/b.RAP"));
        touch(&temp_dir.path().join("notes.md"));

        let discovery = FileDiscovery::new(vec![temp_dir.path().to_string_lossy().to_string()]);
        let files = discovery.discover().unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| has_rapic_extension(f)));
    }

    #[test]
    fn test_explicit_file_and_glob_are_deduplicated() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("volume.txt");
        touch(&file);
        // Explicit files are taken regardless of extension
        let other = temp_dir.path().join("stream.dat");
        touch(&other);

        let pattern = temp_dir.path().join("*.txt").to_string_lossy().to_string();
        let discovery = FileDiscovery::new(vec![
            file.to_string_lossy().to_string(),
            pattern,
            other.to_string_lossy().to_string(),
        ]);
        let files = discovery.discover().unwrap();
        assert_eq!(files, vec![other, file]);
    }

    #[test]
    fn test_missing_input_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("nothing-*.rapic");
        let discovery = FileDiscovery::new(vec![missing.to_string_lossy().to_string()]);
        assert!(matches!(
            discovery.discover(),
            Err(RapicError::InputNotFound { .. })
        ));

        let bad = FileDiscovery::new(vec!["[".to_string()]);
        assert!(matches!(
            bad.discover(),
            Err(RapicError::InvalidPattern { .. })
        ));
    }
}
