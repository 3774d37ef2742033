//! Startup checks module
//!
//! Provides preflight checks run before the first pass:
//! - ffprobe availability (`ffprobe -version`)
//! - ffmpeg availability (`ffmpeg -version`)

use crate::config::ToolsConfig;
use crate::tool::{ToolInvocation, ToolRunner};
use std::path::Path;
use thiserror::Error;
use tracing::info;

/// Error types for startup checks
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("{tool} not available at {program}: {reason}; is it installed and in PATH?")]
    ToolUnavailable {
        tool: &'static str,
        program: String,
        reason: String,
    },
}

/// Extracts the version token from `<tool> -version` output.
///
/// Handles the usual FFmpeg forms:
/// - Release: "ffmpeg version 6.1.1 Copyright ..."
/// - Git builds: "ffprobe version n6.1-3-gabc123 ..."
/// - Distro builds: "ffmpeg version 4.4.2-0ubuntu0.22.04.1 ..."
pub fn parse_tool_version(version_output: &str, tool: &str) -> Option<String> {
    let marker = format!("{} version", tool.to_lowercase());
    let version_line = version_output
        .lines()
        .find(|line| line.to_lowercase().contains(&marker))?;

    let lower = version_line.to_lowercase();
    let start = lower.find(&marker)? + marker.len();
    version_line
        .get(start..)?
        .split_whitespace()
        .next()
        .map(str::to_string)
}

/// Runs `<program> -version` and returns the reported version.
///
/// Output that does not carry a recognizable version line still passes; the
/// tool started and exited cleanly, which is all the pipeline depends on.
pub fn check_tool_available<R: ToolRunner + ?Sized>(
    runner: &R,
    tool: &'static str,
    program: &Path,
) -> Result<String, StartupError> {
    let unavailable = |reason: String| StartupError::ToolUnavailable {
        tool,
        program: program.display().to_string(),
        reason,
    };

    let invocation = ToolInvocation::new(program, format!("{} version check", tool)).arg("-version");
    let output = runner
        .run_checked(&invocation)
        .map_err(|e| unavailable(e.to_string()))?;

    let text = String::from_utf8_lossy(&output.stdout);
    let version = parse_tool_version(&text, tool).unwrap_or_else(|| "unknown".to_string());
    info!("Found {} version {}", tool, version);
    Ok(version)
}

/// Run all startup checks in order
///
/// 1. ffprobe availability
/// 2. ffmpeg availability
pub fn run_startup_checks<R: ToolRunner + ?Sized>(
    runner: &R,
    tools: &ToolsConfig,
) -> Result<(), StartupError> {
    check_tool_available(runner, "ffprobe", &tools.ffprobe)?;
    check_tool_available(runner, "ffmpeg", &tools.ffmpeg)?;
    Ok(())
}
