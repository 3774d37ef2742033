//! Subtitle extraction.
//!
//! Demuxes the first subtitle stream into the scratch directory, then moves
//! the result next to the source video under the same stem.

use crate::relocate::{move_file, RelocateError};
use crate::tool::{ToolError, ToolInvocation, ToolRunner};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Error type for subtitle extraction
#[derive(Debug, Error)]
pub enum ExtractError {
    /// ffmpeg could not be run or exited non-zero.
    #[error("Subtitle extraction failed: {0}")]
    Tool(#[from] ToolError),

    /// The extracted file could not be moved next to the video.
    #[error("Failed to move subtitle into place: {0}")]
    Relocate(#[from] RelocateError),

    /// The scratch path has no file name to reuse.
    #[error("Subtitle path has no file name: {0}")]
    InvalidPath(PathBuf),
}

/// Builds `ffmpeg -y -i <video> -map 0:s:0 <temp_subtitle>`.
pub fn build_extract_command(
    ffmpeg: &Path,
    video_path: &Path,
    temp_subtitle_path: &Path,
) -> ToolInvocation {
    ToolInvocation::new(ffmpeg, "Subtitle extraction")
        .arg("-y")
        .arg("-i")
        .arg(video_path)
        .args(["-map", "0:s:0"])
        .arg(temp_subtitle_path)
}

/// Where the extracted subtitle ends up: the video's directory, the scratch file's name.
///
/// For example: `/rss/ep01.mkv` + `/tmp/subs/ep01.srt` -> `/rss/ep01.srt`
pub fn sidecar_subtitle_path(
    video_path: &Path,
    temp_subtitle_path: &Path,
) -> Result<PathBuf, ExtractError> {
    let file_name = temp_subtitle_path
        .file_name()
        .ok_or_else(|| ExtractError::InvalidPath(temp_subtitle_path.to_path_buf()))?;
    Ok(video_path.with_file_name(file_name))
}

/// Extracts the first subtitle stream of `video_path` and moves it beside the video.
///
/// Returns the final subtitle location.
pub fn extract_subtitle<R: ToolRunner + ?Sized>(
    runner: &R,
    ffmpeg: &Path,
    video_path: &Path,
    temp_subtitle_path: &Path,
) -> Result<PathBuf, ExtractError> {
    let destination = sidecar_subtitle_path(video_path, temp_subtitle_path)?;

    let invocation = build_extract_command(ffmpeg, video_path, temp_subtitle_path);
    runner.run_checked(&invocation)?;
    info!(
        "Subtitle extracted to {}",
        temp_subtitle_path.display()
    );

    move_file(temp_subtitle_path, &destination)?;
    info!("Moved subtitle next to source: {}", destination.display());

    Ok(destination)
}
