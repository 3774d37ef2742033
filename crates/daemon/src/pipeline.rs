//! Scan-and-process pipeline.
//!
//! One [`Pipeline::run_pass`] walks the monitored root, drops files already in
//! the processed or failed set, and runs probe -> extract -> compress on every
//! new file, one at a time. Step failures are recorded in the failed set and
//! never abort the pass; the file is still marked processed afterwards, so a
//! path can sit in both sets.

use crate::compress::compress_video;
use crate::config::Config;
use crate::decode::{DecodeError, TextDecoder};
use crate::extract::extract_subtitle;
use crate::probe::Prober;
use crate::scan::{scan_candidates, ScanCandidate, ScanError, ScanFilter};
use crate::store::{NormalizedPath, PathSet, StoreError};
use crate::tool::ToolRunner;
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{error, info, warn};

/// Error type for pipeline setup and passes
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A persisted list could not be loaded.
    #[error("State error: {0}")]
    Store(#[from] StoreError),

    /// The configured encoding chain is unusable.
    #[error("Decoder error: {0}")]
    Decoder(#[from] DecodeError),

    /// The walk could not start.
    #[error("Scan error: {0}")]
    Scan(#[from] ScanError),

    /// A scratch directory could not be created.
    #[error("Failed to create scratch directory {dir}: {source}")]
    Workspace { dir: PathBuf, source: io::Error },
}

/// Pipeline step, used in log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Probe,
    Extract,
    Compress,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Probe => write!(f, "probe"),
            Step::Extract => write!(f, "extract"),
            Step::Compress => write!(f, "compress"),
        }
    }
}

/// Fixed locations and tools the pipeline works with.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub root: PathBuf,
    pub filter: ScanFilter,
    pub ffmpeg: PathBuf,
    pub output_video_dir: PathBuf,
    pub temp_subtitle_dir: PathBuf,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            root: config.watch.root.clone(),
            // The scratch folders may sit inside the root (they do by default)
            filter: ScanFilter::from_config(&config.watch)
                .exclude_path(&config.workspace.output_video_dir)
                .exclude_path(&config.workspace.temp_subtitle_dir),
            ffmpeg: config.tools.ffmpeg.clone(),
            output_video_dir: config.workspace.output_video_dir.clone(),
            temp_subtitle_dir: config.workspace.temp_subtitle_dir.clone(),
        }
    }

    /// Scratch paths for a video: `<output dir>/<stem>.mp4` and `<subtitle dir>/<stem>.srt`.
    ///
    /// The directory structure of the source is not preserved. Returns `None`
    /// for paths without a file name.
    pub fn scratch_paths(&self, video_path: &Path) -> Option<(PathBuf, PathBuf)> {
        let stem = video_path.file_stem()?;

        let mut output_name = OsString::from(stem);
        output_name.push(".mp4");
        let mut subtitle_name = OsString::from(stem);
        subtitle_name.push(".srt");

        Some((
            self.output_video_dir.join(output_name),
            self.temp_subtitle_dir.join(subtitle_name),
        ))
    }
}

/// What happened to one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileOutcome {
    /// Probe result; `false` also when the probe failed.
    pub had_subtitles: bool,
    /// `None` when extraction was not attempted.
    pub subtitle_extracted: Option<bool>,
    pub compressed: bool,
    /// True when any step recorded the file as failed.
    pub failed: bool,
}

/// Totals for one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassSummary {
    /// Candidate files seen by the scan, new or not.
    pub candidates: usize,
    /// Files that ran through the pipeline in this pass.
    pub new_files: usize,
    /// New files that had at least one failed step.
    pub failed_files: usize,
    /// New files whose compressed output replaced the original.
    pub compressed_files: usize,
}

/// The scan-and-process pipeline with its in-memory copies of both sets.
pub struct Pipeline<R> {
    settings: PipelineSettings,
    prober: Prober,
    runner: R,
    processed: PathSet,
    failed: PathSet,
}

impl<R: ToolRunner> Pipeline<R> {
    /// Builds a pipeline from configuration, loading both sets from disk.
    pub fn new(config: &Config, runner: R) -> Result<Self, PipelineError> {
        let decoder = TextDecoder::from_labels(&config.probe.encodings)?;
        let prober = Prober::new(config.tools.ffprobe.clone(), decoder);
        let processed = PathSet::load(config.state.processed_list.clone())?;
        let failed = PathSet::load(config.state.failed_list.clone())?;

        info!(
            "Loaded {} processed and {} failed entries",
            processed.len(),
            failed.len()
        );

        Ok(Self {
            settings: PipelineSettings::from_config(config),
            prober,
            runner,
            processed,
            failed,
        })
    }

    pub fn processed(&self) -> &PathSet {
        &self.processed
    }

    pub fn failed(&self) -> &PathSet {
        &self.failed
    }

    /// True if the file was handled before, successfully or not.
    pub fn is_known(&self, path: &NormalizedPath) -> bool {
        self.processed.contains(path) || self.failed.contains(path)
    }

    /// Runs one full scan pass.
    ///
    /// Errors are limited to conditions that affect the whole pass (an
    /// unreadable root, scratch directories that cannot be created); per-file
    /// failures only land in the failed set.
    pub fn run_pass(&mut self) -> Result<PassSummary, PipelineError> {
        info!(
            "Checking {} for new files...",
            self.settings.root.display()
        );

        let candidates = scan_candidates(&self.settings.root, &self.settings.filter)?;
        let mut summary = PassSummary {
            candidates: candidates.len(),
            ..Default::default()
        };

        for candidate in &candidates {
            if self.is_known(&candidate.normalized) {
                continue;
            }

            let outcome = self.process_file(candidate)?;
            summary.new_files += 1;
            if outcome.failed {
                summary.failed_files += 1;
            }
            if outcome.compressed {
                summary.compressed_files += 1;
            }
        }

        if summary.new_files == 0 {
            info!("No new files found, waiting for next check...");
        }

        Ok(summary)
    }

    /// Runs probe, extract and compress on one new file, then marks it processed.
    pub fn process_file(&mut self, candidate: &ScanCandidate) -> Result<FileOutcome, PipelineError> {
        let video_path = candidate.path.as_path();
        info!("Found new file: {}", video_path.display());

        self.ensure_workspace()?;

        let mut outcome = FileOutcome::default();
        let failed_before = self.failed.contains(&candidate.normalized);

        match self.settings.scratch_paths(video_path) {
            Some((temp_output_path, temp_subtitle_path)) => {
                outcome.had_subtitles = self.has_subtitle_stream(candidate);
                if outcome.had_subtitles {
                    outcome.subtitle_extracted =
                        Some(self.extract(candidate, &temp_subtitle_path));
                }
                outcome.compressed = self.compress(candidate, &temp_output_path);
            }
            None => {
                // Only reachable for paths without a file name, which the walk never yields
                self.mark_failed(candidate, Step::Probe, &"path has no file name");
            }
        }

        outcome.failed = !failed_before && self.failed.contains(&candidate.normalized);

        if let Err(e) = self.processed.record(candidate.normalized.clone()) {
            error!(
                "Could not persist processed entry for {}: {}",
                video_path.display(),
                e
            );
        }

        Ok(outcome)
    }

    /// Probe step. A failed probe is recorded and reported as "no subtitles".
    pub fn has_subtitle_stream(&mut self, candidate: &ScanCandidate) -> bool {
        match self.prober.probe(&self.runner, &candidate.path) {
            Ok(result) => {
                let has_subs = result.has_subtitle_stream();
                if !has_subs {
                    info!(
                        "No subtitle stream detected in {}",
                        candidate.path.display()
                    );
                }
                has_subs
            }
            Err(e) => {
                self.mark_failed(candidate, Step::Probe, &e);
                false
            }
        }
    }

    /// Extract step. True only when the subtitle sits next to the video.
    pub fn extract(&mut self, candidate: &ScanCandidate, temp_subtitle_path: &Path) -> bool {
        match extract_subtitle(
            &self.runner,
            &self.settings.ffmpeg,
            &candidate.path,
            temp_subtitle_path,
        ) {
            Ok(_) => true,
            Err(e) => {
                self.mark_failed(candidate, Step::Extract, &e);
                false
            }
        }
    }

    /// Compress step. True only when the compressed file replaced the original.
    pub fn compress(&mut self, candidate: &ScanCandidate, temp_output_path: &Path) -> bool {
        match compress_video(
            &self.runner,
            &self.settings.ffmpeg,
            &candidate.path,
            temp_output_path,
        ) {
            Ok(()) => true,
            Err(e) => {
                self.mark_failed(candidate, Step::Compress, &e);
                false
            }
        }
    }

    fn mark_failed(&mut self, candidate: &ScanCandidate, step: Step, reason: &dyn fmt::Display) {
        error!(
            "{} step failed for {}: {}",
            step,
            candidate.path.display(),
            reason
        );
        if let Err(e) = self.failed.record(candidate.normalized.clone()) {
            error!(
                "Could not persist failed entry for {}: {}",
                candidate.path.display(),
                e
            );
        }
    }

    fn ensure_workspace(&self) -> Result<(), PipelineError> {
        for dir in [
            &self.settings.output_video_dir,
            &self.settings.temp_subtitle_dir,
        ] {
            if !dir.is_dir() {
                fs::create_dir_all(dir).map_err(|source| PipelineError::Workspace {
                    dir: dir.clone(),
                    source,
                })?;
                warn!("Created missing scratch directory {}", dir.display());
            }
        }
        Ok(())
    }
}
