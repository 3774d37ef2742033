//! Persisted path sets.
//!
//! The processed and failed lists are plain UTF-8 text files holding one
//! normalized absolute path per line. Operators may edit them by hand (for
//! example to retry a failed file), so every line is re-normalized on load.

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Errors raised while reading or writing a path list.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The list exists but could not be read.
    #[error("Failed to read path list {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    /// The list could not be written.
    #[error("Failed to write path list {path}: {source}")]
    Write { path: PathBuf, source: io::Error },

    /// A relative entry could not be made absolute.
    #[error("Failed to normalize {path}: {source}")]
    Normalize { path: PathBuf, source: io::Error },
}

/// Absolute, lexically cleaned, case-folded form of a path.
///
/// Two spellings of the same file (`./A/../a.MP4` and `a.mp4`) compare equal.
/// Symlinks are not resolved, so entries for files that no longer exist still
/// normalize the same way they did when they were recorded.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NormalizedPath(String);

impl NormalizedPath {
    /// Normalizes `path`, resolving relative paths against the working directory.
    pub fn new(path: &Path) -> io::Result<Self> {
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()?.join(path)
        };
        let cleaned = clean_components(&absolute);
        Ok(Self(cleaned.to_string_lossy().to_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NormalizedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Drops `.` components and folds `..` into its parent without touching the filesystem.
fn clean_components(path: &Path) -> PathBuf {
    let mut cleaned = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // `..` at the root stays at the root
                if !matches!(
                    cleaned.components().next_back(),
                    None | Some(Component::RootDir) | Some(Component::Prefix(_))
                ) {
                    cleaned.pop();
                }
            }
            other => cleaned.push(other.as_os_str()),
        }
    }
    cleaned
}

/// Reads a path list; a missing file is an empty set.
pub fn load_path_set(path: &Path) -> Result<BTreeSet<NormalizedPath>, StoreError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BTreeSet::new()),
        Err(source) => {
            return Err(StoreError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let mut set = BTreeSet::new();
    for line in content.lines() {
        let entry = line.trim();
        if entry.is_empty() {
            continue;
        }
        let normalized =
            NormalizedPath::new(Path::new(entry)).map_err(|source| StoreError::Normalize {
                path: PathBuf::from(entry),
                source,
            })?;
        set.insert(normalized);
    }
    Ok(set)
}

/// Overwrites a path list with one entry per line.
pub fn save_path_set(path: &Path, set: &BTreeSet<NormalizedPath>) -> Result<(), StoreError> {
    let write_err = |source| StoreError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
    }

    let mut content = String::new();
    for entry in set {
        content.push_str(entry.as_str());
        content.push('\n');
    }
    fs::write(path, content).map_err(write_err)
}

/// A path list bound to its backing file.
#[derive(Debug)]
pub struct PathSet {
    file: PathBuf,
    entries: BTreeSet<NormalizedPath>,
}

impl PathSet {
    /// Loads the set stored at `file`.
    pub fn load(file: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let file = file.into();
        let entries = load_path_set(&file)?;
        debug!("Loaded {} entries from {}", entries.len(), file.display());
        Ok(Self { file, entries })
    }

    pub fn contains(&self, path: &NormalizedPath) -> bool {
        self.entries.contains(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Adds `path` and writes the whole set back to disk.
    ///
    /// The entry stays in memory even when the write fails, so the caller
    /// will not retry the file during this run.
    pub fn record(&mut self, path: NormalizedPath) -> Result<(), StoreError> {
        self.entries.insert(path);
        self.save()
    }

    pub fn save(&self) -> Result<(), StoreError> {
        save_path_set(&self.file, &self.entries)
    }
}
