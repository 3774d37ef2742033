//! x264 compressor module
//!
//! Re-encodes a video with a fixed H.264/AAC parameter set and replaces the
//! source file with the result. The original is not kept.

use crate::relocate::{move_file, RelocateError};
use crate::store::NormalizedPath;
use crate::tool::{ToolError, ToolInvocation, ToolRunner};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

/// Video encoder
pub const VIDEO_CODEC: &str = "libx264";
/// Encoding speed vs. compression trade-off
pub const PRESET: &str = "medium";
/// Constant rate factor, lower is higher quality
pub const CRF: &str = "23";
/// Audio encoder
pub const AUDIO_CODEC: &str = "aac";
/// Audio bitrate
pub const AUDIO_BITRATE: &str = "128k";

/// Error type for compression
#[derive(Debug, Error)]
pub enum CompressError {
    /// ffmpeg could not be run or exited non-zero.
    #[error("Compression failed: {0}")]
    Tool(#[from] ToolError),

    /// The scratch output path is the source itself.
    #[error("Refusing to compress {0} onto itself")]
    OutputIsInput(PathBuf),

    /// The compressed output could not replace the source.
    #[error("Failed to replace source with compressed output: {0}")]
    Replace(#[from] RelocateError),
}

/// Build the transcode command
///
/// `ffmpeg -y -i <video> -c:v libx264 -preset medium -crf 23 -c:a aac -b:a 128k <output>`
pub fn build_compress_command(
    ffmpeg: &Path,
    video_path: &Path,
    temp_output_path: &Path,
) -> ToolInvocation {
    ToolInvocation::new(ffmpeg, "Video compression")
        .arg("-y")
        .arg("-i")
        .arg(video_path)
        .args(["-c:v", VIDEO_CODEC])
        .args(["-preset", PRESET])
        .args(["-crf", CRF])
        .args(["-c:a", AUDIO_CODEC])
        .args(["-b:a", AUDIO_BITRATE])
        .arg(temp_output_path)
}

/// Compresses `video_path` into `temp_output_path`, then moves the result over the source.
///
/// # Errors
/// Returns an error if:
/// - `temp_output_path` names the source file; nothing is run or removed
/// - ffmpeg fails to start, exits non-zero or is killed; the source is untouched
///   and any partial output is removed
/// - the compressed file cannot be moved over the source
pub fn compress_video<R: ToolRunner + ?Sized>(
    runner: &R,
    ffmpeg: &Path,
    video_path: &Path,
    temp_output_path: &Path,
) -> Result<(), CompressError> {
    if same_location(video_path, temp_output_path) {
        return Err(CompressError::OutputIsInput(video_path.to_path_buf()));
    }

    let invocation = build_compress_command(ffmpeg, video_path, temp_output_path);

    if let Err(e) = runner.run_checked(&invocation) {
        if temp_output_path.exists() {
            if let Err(rm) = fs::remove_file(temp_output_path) {
                warn!(
                    "Could not remove partial output {}: {}",
                    temp_output_path.display(),
                    rm
                );
            }
        }
        return Err(CompressError::Tool(e));
    }
    info!("Video compressed to {}", temp_output_path.display());

    move_file(temp_output_path, video_path)?;
    info!(
        "Replaced original with compressed file: {}",
        video_path.display()
    );
    Ok(())
}

/// True when both paths normalize to the same key, or when either cannot be normalized.
fn same_location(a: &Path, b: &Path) -> bool {
    match (NormalizedPath::new(a), NormalizedPath::new(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => true,
    }
}
