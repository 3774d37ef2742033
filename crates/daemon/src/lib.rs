//! subshrink
//!
//! Background service that watches a download folder, pulls the first
//! subtitle stream out of each new video and re-encodes the video in place.

pub mod compress;
pub mod daemon;
pub mod decode;
pub mod extract;
pub mod pipeline;
pub mod probe;
pub mod relocate;
pub mod scan;
pub mod startup;
pub mod store;
pub mod tool;

pub use subshrink_config as config;
pub use subshrink_config::Config;
pub use compress::{build_compress_command, compress_video, CompressError};
pub use daemon::{Daemon, DaemonError, RunSummary};
pub use decode::{DecodeError, TextDecoder};
pub use extract::{build_extract_command, extract_subtitle, ExtractError};
pub use pipeline::{FileOutcome, PassSummary, Pipeline, PipelineError, PipelineSettings};
pub use probe::{build_probe_command, parse_ffprobe_output, ProbeError, ProbeResult, Prober};
pub use relocate::{move_file, RelocateError};
pub use scan::{scan_candidates, ScanCandidate, ScanError, ScanFilter};
pub use startup::{check_tool_available, parse_tool_version, run_startup_checks, StartupError};
pub use store::{NormalizedPath, PathSet, StoreError};
pub use tool::{SystemRunner, ToolError, ToolInvocation, ToolOutput, ToolRunner};
