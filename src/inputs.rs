// src/inputs.rs

//! Collecting and fingerprinting the scans a job is submitted with.

use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::Context;
use blake3::Hasher;
use chrono::{DateTime, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::debug;

use crate::errors::{NiftiBatchError, Result};
use crate::model::FileSpecifier;

/// A local input file and the specifier it is submitted under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFile {
    pub path: PathBuf,
    pub spec: FileSpecifier,
}

/// Resolve `patterns` relative to `root` into a list of input files.
///
/// An entry without glob metacharacters names one file, which must exist.
/// Any other entry is a glob matched against paths relative to `root`;
/// its matches are taken in path order. Files matching `exclude` are
/// dropped. Entry order is preserved and duplicates are removed, so the
/// first entry decides the job's primary input.
pub fn collect_inputs(root: &Path, patterns: &[String], exclude: &[String]) -> Result<Vec<PathBuf>> {
    let exclude_set = if exclude.is_empty() {
        None
    } else {
        Some(build_globset(exclude)?)
    };
    let excluded = |path: &Path| match (&exclude_set, path.strip_prefix(root)) {
        (Some(set), Ok(rel)) => set.is_match(normalize(rel)),
        _ => false,
    };

    let mut files: Vec<PathBuf> = Vec::new();
    for pattern in patterns {
        let matched = if is_glob(pattern) {
            let set = build_globset(std::slice::from_ref(pattern))?;
            let mut found = collect_matching_files(root, &set)?;
            found.sort();
            found
        } else {
            let path = root.join(pattern);
            if !path.is_file() {
                return Err(NiftiBatchError::ConfigError(format!(
                    "input file not found: {}",
                    path.display()
                )));
            }
            vec![path]
        };

        for path in matched {
            if !excluded(&path) && !files.contains(&path) {
                files.push(path);
            }
        }
    }

    if files.is_empty() {
        return Err(NiftiBatchError::ConfigError(format!(
            "no input files matched {patterns:?} under {}",
            root.display()
        )));
    }

    debug!(count = files.len(), "collected input files");
    Ok(files)
}

/// Build the specifier for a local file: name, origin, blake3 digest and
/// modification time.
pub fn describe_input(path: &Path) -> Result<InputFile> {
    let hash = compute_file_hash(path)?;
    let mut spec = FileSpecifier::from_path(path).with_hash(hash);

    if let Ok(modified) = fs::metadata(path).and_then(|m| m.modified()) {
        spec = spec.with_timestamp(DateTime::<Utc>::from(modified));
    }

    Ok(InputFile {
        path: path.to_path_buf(),
        spec,
    })
}

/// Hex blake3 digest of a file's contents.
pub fn compute_file_hash(path: &Path) -> Result<String> {
    let mut hasher = Hasher::new();
    let mut file = File::open(path)
        .with_context(|| format!("opening input for hashing: {}", path.display()))?;
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

fn collect_matching_files(root: &Path, set: &GlobSet) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let entries = fs::read_dir(&dir)
            .with_context(|| format!("reading input directory {}", dir.display()))?;
        for entry in entries {
            let path = entry?.path();
            if path.is_dir() {
                stack.push(path);
            } else if path.is_file() {
                if let Ok(rel) = path.strip_prefix(root) {
                    if set.is_match(normalize(rel)) {
                        files.push(path);
                    }
                }
            }
        }
    }

    Ok(files)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = Glob::new(pat).with_context(|| format!("invalid glob pattern: {pat}"))?;
        builder.add(glob);
    }
    Ok(builder.build().context("building input globset")?)
}

fn is_glob(pattern: &str) -> bool {
    pattern.contains(['*', '?', '[', '{'])
}

fn normalize(rel: &Path) -> String {
    rel.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(root: &Path, rel: &str, contents: &str) -> PathBuf {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn literal_entries_keep_their_order_before_glob_matches() {
        let dir = tempfile::tempdir().unwrap();
        let brain = touch(dir.path(), "scans/brain.nii", "a");
        let other = touch(dir.path(), "scans/other.nii", "b");
        touch(dir.path(), "scans/notes.txt", "c");

        let files = collect_inputs(
            dir.path(),
            &["scans/other.nii".to_string(), "scans/*.nii".to_string()],
            &[],
        )
        .unwrap();

        assert_eq!(files, vec![other, brain]);
    }

    #[test]
    fn exclude_patterns_drop_matches() {
        let dir = tempfile::tempdir().unwrap();
        let keep = touch(dir.path(), "a/brain.nii", "a");
        touch(dir.path(), "a/brain.tmp.nii", "b");

        let files =
            collect_inputs(dir.path(), &["**/*.nii".to_string()], &["**/*.tmp.nii".to_string()])
                .unwrap();

        assert_eq!(files, vec![keep]);
    }

    #[test]
    fn missing_literal_or_empty_match_is_config_error() {
        let dir = tempfile::tempdir().unwrap();

        let err = collect_inputs(dir.path(), &["brain.nii".to_string()], &[]).unwrap_err();
        assert!(matches!(err, NiftiBatchError::ConfigError(_)), "got {err:?}");

        let err = collect_inputs(dir.path(), &["*.nii".to_string()], &[]).unwrap_err();
        assert!(matches!(err, NiftiBatchError::ConfigError(_)), "got {err:?}");
    }

    #[test]
    fn describe_input_fills_hash_and_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let path = touch(dir.path(), "brain.nii", "scan");

        let input = describe_input(&path).unwrap();

        assert_eq!(input.spec.name, "brain.nii");
        assert_eq!(
            input.spec.hash.as_deref(),
            Some(blake3::hash(b"scan").to_hex().as_str())
        );
        assert!(input.spec.timestamp.is_some());
    }
}
