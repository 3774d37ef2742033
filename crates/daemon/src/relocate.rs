//! Moving finished scratch files into place.
//!
//! Scratch directories may live on a different filesystem than the monitored
//! tree, so a failed rename falls back to copy-then-delete. The copy is staged
//! beside the destination and renamed over it, so the destination never holds
//! a half-written file.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Errors that can occur while moving a file.
#[derive(Debug, Error)]
pub enum RelocateError {
    /// Neither rename nor copy could put the file at its destination.
    #[error("Failed to move {from} to {to}: {source}")]
    Move {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },

    /// The destination was written but the source could not be removed.
    #[error("Copied {from} to {to} but failed to remove the source: {source}")]
    RemoveSource {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },
}

/// Moves `from` to `to`, replacing any existing file at `to`.
///
/// # Arguments
///
/// * `from` - File produced in a scratch directory
/// * `to` - Final location, overwritten if present
///
/// # Returns
///
/// * `Ok(())` once `to` holds the content and `from` is gone
/// * `Err(RelocateError::Move)` if neither rename nor copy worked; `to` keeps its old content
/// * `Err(RelocateError::RemoveSource)` if `to` was replaced but `from` is still there
pub fn move_file(from: &Path, to: &Path) -> Result<(), RelocateError> {
    // Try to rename first (same filesystem)
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }

    copy_into_place(from, to).map_err(|source| RelocateError::Move {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    })?;

    fs::remove_file(from).map_err(|source| RelocateError::RemoveSource {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    })
}

/// Sibling of `to` that a copy is staged in before it replaces `to`.
fn partial_path(to: &Path) -> io::Result<PathBuf> {
    let name = to.file_name().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "destination has no file name")
    })?;
    let mut partial = OsString::from(".");
    partial.push(name);
    partial.push(".partial");
    Ok(to.with_file_name(partial))
}

/// Copies `from` next to `to`, then renames it over `to`.
///
/// `to` is only replaced by a complete copy. A copy that fails partway is
/// discarded and `to` is left as it was.
pub(crate) fn copy_into_place(from: &Path, to: &Path) -> io::Result<()> {
    let partial = partial_path(to)?;

    if let Err(e) = fs::copy(from, &partial).and_then(|_| fs::rename(&partial, to)) {
        if partial.exists() {
            if let Err(rm) = fs::remove_file(&partial) {
                warn!("Could not remove partial copy {}: {}", partial.display(), rm);
            }
        }
        return Err(e);
    }
    Ok(())
}
