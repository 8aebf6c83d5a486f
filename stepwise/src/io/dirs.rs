//! Directory helpers shared by preparation, finalization and cleanup.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use anyhow::{Context, Result};

/// Create `path` and its parents. An existing directory is not an error.
pub fn ensure_dir(path: &Path) -> Result<()> {
    match fs::create_dir_all(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::AlreadyExists && path.is_dir() => Ok(()),
        Err(err) => Err(err).with_context(|| format!("create directory {}", path.display())),
    }
}

/// Remove `path` (if present) and recreate it empty.
pub fn reset_dir(path: &Path) -> Result<()> {
    remove_dir_if_exists(path)?;
    ensure_dir(path)
}

pub fn remove_dir_if_exists(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("remove {}", path.display())),
    }
}

/// True if `path` is missing or has no entries.
pub fn is_empty_dir(path: &Path) -> Result<bool> {
    match fs::read_dir(path) {
        Ok(mut entries) => Ok(entries.next().is_none()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(true),
        Err(err) => Err(err).with_context(|| format!("read {}", path.display())),
    }
}

/// Copy regular files directly inside `src` into `dst` (non-recursive).
///
/// Returns the number of files copied.
pub fn copy_files(src: &Path, dst: &Path) -> Result<usize> {
    ensure_dir(dst)?;
    let mut copied = 0;
    for entry in fs::read_dir(src).with_context(|| format!("read {}", src.display()))? {
        let entry = entry.with_context(|| format!("read entry in {}", src.display()))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let target = dst.join(entry.file_name());
        fs::copy(&path, &target)
            .with_context(|| format!("copy {} -> {}", path.display(), target.display()))?;
        copied += 1;
    }
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_dir_is_idempotent() {
        let temp = tempfile::tempdir().expect("tempdir");
        let dir = temp.path().join("a/b");
        ensure_dir(&dir).expect("first");
        ensure_dir(&dir).expect("second");
        assert!(dir.is_dir());
    }

    #[test]
    fn ensure_dir_fails_when_a_file_is_in_the_way() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("taken");
        fs::write(&path, "x").expect("write");
        assert!(ensure_dir(&path).is_err());
    }

    #[test]
    fn missing_and_empty_dirs_count_as_empty() {
        let temp = tempfile::tempdir().expect("tempdir");
        assert!(is_empty_dir(&temp.path().join("missing")).expect("missing"));
        assert!(is_empty_dir(temp.path()).expect("empty"));
        fs::write(temp.path().join("out.csv"), "VALUE\n").expect("write");
        assert!(!is_empty_dir(temp.path()).expect("non-empty"));
    }

    #[test]
    fn copy_files_skips_subdirectories() {
        let temp = tempfile::tempdir().expect("tempdir");
        let src = temp.path().join("src");
        fs::create_dir_all(src.join("nested")).expect("mkdir");
        fs::write(src.join("a.csv"), "VALUE\n1\n").expect("write");
        let dst = temp.path().join("dst");
        assert_eq!(copy_files(&src, &dst).expect("copy"), 1);
        assert!(dst.join("a.csv").is_file());
        assert!(!dst.join("nested").exists());
    }
}
