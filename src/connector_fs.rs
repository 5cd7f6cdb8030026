//! Corpus scanner.
//!
//! Walks `corpus.root`, keeps files matching `include_globs` and not
//! matching `exclude_globs` (plus built-in excludes), and returns them in
//! id order. File contents are read later, on the ingest workers.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::CorpusConfig;

/// A corpus file located by the scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Path relative to the corpus root, `/`-separated.
    pub id: String,
    pub path: PathBuf,
}

/// An entry below the root that the walk could not read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnreadableEntry {
    pub id: String,
    pub error: String,
}

#[derive(Debug, Default)]
pub struct CorpusScan {
    pub files: Vec<SourceFile>,
    pub unreadable: Vec<UnreadableEntry>,
}

/// Enumerate corpus files in id order.
///
/// Only an unreadable root is fatal. Entries below it that cannot be
/// walked (permission denied, dangling symlink, symlink loop) are
/// collected in [`CorpusScan::unreadable`].
pub fn scan_corpus(corpus: &CorpusConfig) -> Result<CorpusScan> {
    let root = &corpus.root;
    if !root.exists() {
        bail!("Corpus root does not exist: {}", root.display());
    }

    let include_set = build_globset(&corpus.include_globs)?;

    let mut default_excludes = vec![
        "**/.git/**".to_string(),
        "**/node_modules/**".to_string(),
    ];
    default_excludes.extend(corpus.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut scan = CorpusScan::default();

    let walker = WalkDir::new(root).follow_links(corpus.follow_symlinks);
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if err.depth() == 0 => {
                return Err(err).with_context(|| {
                    format!("Failed to read corpus root {}", root.display())
                });
            }
            Err(err) => {
                let id = err
                    .path()
                    .map(|p| relative_id(root, p))
                    .unwrap_or_default();
                if !exclude_set.is_match(&id) {
                    scan.unreadable.push(UnreadableEntry {
                        id,
                        error: err.to_string(),
                    });
                }
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let id = relative_id(root, path);

        if exclude_set.is_match(&id) {
            continue;
        }
        if !include_set.is_match(&id) {
            continue;
        }

        scan.files.push(SourceFile {
            id,
            path: path.to_path_buf(),
        });
    }

    // Sort for deterministic ordering
    scan.files.sort_by(|a, b| a.id.cmp(&b.id));
    scan.unreadable.sort_by(|a, b| a.id.cmp(&b.id));

    Ok(scan)
}

fn relative_id(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
