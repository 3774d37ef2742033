//! Scanner module for discovering video files under the monitored root.
//!
//! This module recursively walks the root, prunes the reserved output folder
//! and any scratch directory the pipeline writes into, and filters files by an
//! extension allow-list. Name and extension comparisons are case-insensitive.

use crate::config::WatchConfig;
use crate::store::NormalizedPath;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;
use walkdir::WalkDir;

/// Error type for a scan pass
#[derive(Debug, Error)]
pub enum ScanError {
    /// The monitored root itself could not be read.
    #[error("Cannot read monitored root {root}: {source}")]
    Root {
        root: PathBuf,
        source: walkdir::Error,
    },
}

/// Which files count as candidates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanFilter {
    /// Lowercased extensions without the leading dot.
    extensions: Vec<String>,
    /// Lowercased name of the directory pruned from the walk.
    excluded_dir_name: String,
    /// Specific directories pruned from the walk wherever they sit.
    excluded_paths: Vec<NormalizedPath>,
}

impl ScanFilter {
    pub fn new<S: AsRef<str>>(extensions: &[S], excluded_dir_name: &str) -> Self {
        let extensions = extensions
            .iter()
            .map(|e| e.as_ref().trim().trim_start_matches('.').to_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        Self {
            extensions,
            excluded_dir_name: excluded_dir_name.trim().to_lowercase(),
            excluded_paths: Vec::new(),
        }
    }

    /// Also prunes the directory at `dir`. Relative paths resolve against the working directory.
    pub fn exclude_path(mut self, dir: &Path) -> Self {
        match NormalizedPath::new(dir) {
            Ok(normalized) => self.excluded_paths.push(normalized),
            Err(e) => warn!("Cannot exclude {} from scans: {}", dir.display(), e),
        }
        self
    }

    pub fn from_config(watch: &WatchConfig) -> Self {
        Self::new(&watch.extensions, &watch.excluded_dir_name)
    }

    /// Checks if a file has an allow-listed extension (case-insensitive).
    pub fn is_video_file(&self, path: &Path) -> bool {
        path.extension()
            .map(|ext| {
                let ext_lower = ext.to_string_lossy().to_lowercase();
                self.extensions.iter().any(|allowed| *allowed == ext_lower)
            })
            .unwrap_or(false)
    }

    /// Checks if a directory name is the reserved output folder (case-insensitive).
    pub fn is_excluded_dir(&self, name: &OsStr) -> bool {
        name.to_string_lossy().to_lowercase() == self.excluded_dir_name
    }

    /// Checks if a directory is one of the explicitly excluded paths.
    pub fn is_excluded_path(&self, dir: &Path) -> bool {
        if self.excluded_paths.is_empty() {
            return false;
        }
        NormalizedPath::new(dir)
            .map(|normalized| self.excluded_paths.contains(&normalized))
            .unwrap_or(false)
    }
}

impl Default for ScanFilter {
    fn default() -> Self {
        Self::from_config(&WatchConfig::default())
    }
}

/// A candidate video file discovered during a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanCandidate {
    /// Path as found on disk.
    pub path: PathBuf,
    /// Key used against the processed and failed sets.
    pub normalized: NormalizedPath,
}

/// Scans the monitored root for candidate files.
///
/// This function:
/// - Recursively walks the root in file-name order
/// - Prunes directories named like the reserved output folder, and the excluded
///   paths (the root itself is kept)
/// - Filters files by the extension allow-list
/// - Logs and skips entries below the root that cannot be read
///
/// Fails only when the root itself cannot be read.
pub fn scan_candidates(root: &Path, filter: &ScanFilter) -> Result<Vec<ScanCandidate>, ScanError> {
    let mut candidates = Vec::new();

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            !(entry.depth() > 0
                && entry.file_type().is_dir()
                && (filter.is_excluded_dir(entry.file_name())
                    || filter.is_excluded_path(entry.path())))
        });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => {
                return Err(ScanError::Root {
                    root: root.to_path_buf(),
                    source: e,
                })
            }
            Err(e) => {
                warn!("Skipping unreadable entry under {}: {}", root.display(), e);
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        if !filter.is_video_file(path) {
            continue;
        }

        match NormalizedPath::new(path) {
            Ok(normalized) => candidates.push(ScanCandidate {
                path: path.to_path_buf(),
                normalized,
            }),
            Err(e) => warn!("Cannot normalize {}: {}", path.display(), e),
        }
    }

    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::fs::{self, File};
    use tempfile::TempDir;

    fn found(candidates: &[ScanCandidate], path: &Path) -> bool {
        candidates.iter().any(|c| c.path == path)
    }

    #[test]
    fn test_default_filter() {
        let filter = ScanFilter::default();
        assert!(filter.is_video_file(Path::new("/rss/ep.mp4")));
        assert!(filter.is_video_file(Path::new("/rss/ep.MKV")));
        assert!(filter.is_video_file(Path::new("/rss/ep.Mp4")));
        assert!(!filter.is_video_file(Path::new("/rss/ep.avi")));
        assert!(!filter.is_video_file(Path::new("/rss/ep.srt")));
        assert!(!filter.is_video_file(Path::new("/rss/ep"))); // no extension
        assert!(filter.is_excluded_dir(OsStr::new("outmp4")));
        assert!(filter.is_excluded_dir(OsStr::new("OutMP4")));
        assert!(!filter.is_excluded_dir(OsStr::new("outmp4s")));
    }

    #[test]
    fn test_filter_normalizes_configured_extensions() {
        let filter = ScanFilter::new(&[".MKV", " ts ", ""], "Done");
        assert!(filter.is_video_file(Path::new("a.mkv")));
        assert!(filter.is_video_file(Path::new("a.TS")));
        assert!(!filter.is_video_file(Path::new("a.mp4")));
        assert!(filter.is_excluded_dir(OsStr::new("DONE")));
    }

    #[test]
    fn test_scan_finds_nested_files_in_order() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("show").join("season1")).unwrap();
        File::create(root.join("b.mkv")).unwrap();
        File::create(root.join("a.mp4")).unwrap();
        File::create(root.join("notes.txt")).unwrap();
        File::create(root.join("show").join("season1").join("ep01.MKV")).unwrap();

        let candidates = scan_candidates(root, &ScanFilter::default()).unwrap();
        let names: Vec<_> = candidates
            .iter()
            .map(|c| c.path.file_name().unwrap().to_string_lossy().to_string())
            .collect();

        assert_eq!(names, vec!["a.mp4", "b.mkv", "ep01.MKV"]);
        assert!(candidates[2].normalized.as_str().ends_with("ep01.mkv"));
    }

    #[test]
    fn test_scan_missing_root_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let result = scan_candidates(&temp_dir.path().join("missing"), &ScanFilter::default());
        assert!(matches!(result, Err(ScanError::Root { .. })));
    }

    #[test]
    fn test_scan_root_named_like_output_folder_is_still_walked() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("OUTMP4");
        fs::create_dir_all(&root).unwrap();
        File::create(root.join("a.mp4")).unwrap();

        let candidates = scan_candidates(&root, &ScanFilter::default()).unwrap();
        assert_eq!(candidates.len(), 1);
    }

    #[test]
    fn test_scan_prunes_excluded_paths() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let scratch = root.join("output_videos");
        fs::create_dir_all(scratch.join("nested")).unwrap();
        fs::create_dir_all(root.join("show")).unwrap();
        File::create(scratch.join("kept.mp4")).unwrap();
        File::create(scratch.join("nested").join("deep.mkv")).unwrap();
        File::create(root.join("show").join("output_videos.mp4")).unwrap();

        let filter = ScanFilter::default().exclude_path(&root.join(".").join("Output_Videos"));
        let candidates = scan_candidates(root, &filter).unwrap();

        assert_eq!(candidates.len(), 1);
        assert!(found(&candidates, &root.join("show").join("output_videos.mp4")));
    }

    #[test]
    fn test_relative_excluded_path_matches_walk_from_cwd() {
        // The default layout: root "." with scratch folders given relative to it
        let filter = ScanFilter::default()
            .exclude_path(Path::new("output_videos"))
            .exclude_path(Path::new("temp_subtitles"));

        assert!(filter.is_excluded_path(Path::new("./output_videos")));
        assert!(filter.is_excluded_path(Path::new("./temp_subtitles")));
        assert!(!filter.is_excluded_path(Path::new("./show/output_videos")));
        assert!(!ScanFilter::default().is_excluded_path(Path::new("./output_videos")));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        // A file is a candidate if and only if its extension is allow-listed, in any case.
        #[test]
        fn prop_video_extension_filtering(
            basename in "[a-zA-Z0-9_-]{1,20}",
            ext in prop_oneof![
                Just("mkv"), Just("MKV"), Just("Mkv"),
                Just("mp4"), Just("MP4"), Just("mP4"),
                Just("avi"), Just("mov"), Just("txt"),
                Just("srt"), Just("ass"), Just("jpg"),
            ],
        ) {
            let filter = ScanFilter::default();
            let path = PathBuf::from(format!("/rss/{}.{}", basename, ext));
            let expected = matches!(ext.to_lowercase().as_str(), "mkv" | "mp4");
            prop_assert_eq!(filter.is_video_file(&path), expected);
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(30))]

        // Files anywhere below the reserved output folder are never returned, whatever its case.
        #[test]
        fn prop_output_folder_exclusion(
            excluded_spelling in prop_oneof![
                Just("outmp4"), Just("OUTMP4"), Just("OutMp4"), Just("outMP4"),
            ],
            visible_dir in "[a-z]{1,8}",
            filename in "[a-zA-Z0-9]{1,10}",
        ) {
            prop_assume!(visible_dir != "outmp4");

            let temp_dir = TempDir::new().unwrap();
            let root = temp_dir.path();

            let visible_path = root.join(&visible_dir);
            fs::create_dir_all(&visible_path).unwrap();
            let visible_video = visible_path.join(format!("{}.mkv", filename));
            File::create(&visible_video).unwrap();

            let excluded_path = root.join(visible_dir.as_str()).join(excluded_spelling);
            fs::create_dir_all(&excluded_path).unwrap();
            let excluded_video = excluded_path.join(format!("{}.mp4", filename));
            File::create(&excluded_video).unwrap();
            let deep_video = excluded_path.join("deeper");
            fs::create_dir_all(&deep_video).unwrap();
            let deep_video = deep_video.join(format!("{}.mkv", filename));
            File::create(&deep_video).unwrap();

            let candidates = scan_candidates(root, &ScanFilter::default()).unwrap();

            prop_assert!(found(&candidates, &visible_video));
            prop_assert!(!found(&candidates, &excluded_video));
            prop_assert!(!found(&candidates, &deep_video));
        }
    }
}
