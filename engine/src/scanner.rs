//! Filesystem Scanner (C4): enumerates image files under a directory.

use std::path::{Path, PathBuf};

use crate::error::Result;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.iter().any(|candidate| candidate.eq_ignore_ascii_case(ext)))
}

/// Enumerates image files (`.png`, `.jpg`, `.jpeg`, case-insensitive) under
/// `root`.
///
/// Unreadable entries are logged and skipped rather than aborting the scan;
/// a single bad permission bit on one file should not prevent indexing the
/// rest of the directory. Symlinked subdirectories are only followed when
/// `follow_symlinks` is set, to avoid scan cycles from a self-referential
/// link.
pub fn scan(root: &Path, recursive: bool, follow_symlinks: bool) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    scan_into(root, recursive, follow_symlinks, &mut found);
    Ok(found)
}

fn scan_into(dir: &Path, recursive: bool, follow_symlinks: bool, found: &mut Vec<PathBuf>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(error) => {
            tracing::warn!(path = %dir.display(), %error, "skipping unreadable directory");
            return;
        }
    };

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(error) => {
                tracing::warn!(path = %dir.display(), %error, "skipping unreadable entry");
                continue;
            }
        };

        let path = entry.path();
        let file_type = match entry.file_type() {
            Ok(file_type) => file_type,
            Err(error) => {
                tracing::warn!(path = %path.display(), %error, "skipping entry with unknown type");
                continue;
            }
        };

        if file_type.is_dir() {
            if recursive {
                scan_into(&path, recursive, follow_symlinks, found);
            }
        } else if file_type.is_symlink() {
            if follow_symlinks {
                if let Ok(target_metadata) = std::fs::metadata(&path) {
                    if target_metadata.is_dir() {
                        if recursive {
                            scan_into(&path, recursive, follow_symlinks, found);
                        }
                    } else if has_image_extension(&path) {
                        found.push(path);
                    }
                }
            }
        } else if has_image_extension(&path) {
            found.push(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn finds_images_case_insensitively() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.png"), b"").unwrap();
        fs::write(dir.path().join("b.JPG"), b"").unwrap();
        fs::write(dir.path().join("notes.txt"), b"").unwrap();

        let mut found = scan(dir.path(), false, false).unwrap();
        found.sort();
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn non_recursive_ignores_subdirectories() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("sub");
        fs::create_dir(&sub).unwrap();
        fs::write(sub.join("a.png"), b"").unwrap();

        let found = scan(dir.path(), false, false).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn recursive_descends_into_subdirectories() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("sub");
        fs::create_dir(&sub).unwrap();
        fs::write(sub.join("a.png"), b"").unwrap();

        let found = scan(dir.path(), true, false).unwrap();
        assert_eq!(found.len(), 1);
    }
}
