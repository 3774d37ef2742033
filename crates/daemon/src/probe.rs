//! Probe module for inspecting a video's stream layout.
//!
//! Runs ffprobe, decodes its JSON listing through the configured encoding
//! chain and answers whether the container carries a subtitle stream.

use crate::decode::TextDecoder;
use crate::tool::{ToolError, ToolInvocation, ToolRunner};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error type for probe operations.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// ffprobe could not be run or exited non-zero.
    #[error("ffprobe failed: {0}")]
    Tool(#[from] ToolError),

    /// None of the configured encodings could decode the output.
    #[error("Could not decode ffprobe output with any of: {tried}")]
    Undecodable { tried: String },

    /// Failed to parse ffprobe JSON output.
    #[error("Failed to parse ffprobe output: {0}")]
    ParseError(String),
}

/// A single stream entry from ffprobe.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamInfo {
    /// Stream index within the container.
    pub index: Option<u32>,
    /// Declared type ("video", "audio", "subtitle", ...).
    pub codec_type: String,
    /// Codec name (e.g., "h264", "ass", "subrip").
    pub codec_name: Option<String>,
}

/// Result of probing a video file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProbeResult {
    pub streams: Vec<StreamInfo>,
}

impl ProbeResult {
    /// True if any stream declares itself a subtitle.
    pub fn has_subtitle_stream(&self) -> bool {
        self.streams.iter().any(|s| s.codec_type == "subtitle")
    }
}

/// Raw ffprobe JSON structures for parsing.
mod ffprobe_json {
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    pub struct FfprobeOutput {
        pub streams: Option<Vec<Stream>>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Stream {
        pub index: Option<u32>,
        pub codec_type: Option<String>,
        pub codec_name: Option<String>,
    }
}

/// Builds `ffprobe -v quiet -print_format json -show_streams <path>`.
pub fn build_probe_command(ffprobe: &Path, video_path: &Path) -> ToolInvocation {
    ToolInvocation::new(ffprobe, "Subtitle probe")
        .args(["-v", "quiet", "-print_format", "json", "-show_streams"])
        .arg(video_path)
}

/// Parses ffprobe JSON output into a ProbeResult.
///
/// The `streams` array is required; a listing without it is treated as a
/// failed probe rather than "no subtitles".
pub fn parse_ffprobe_output(json_str: &str) -> Result<ProbeResult, ProbeError> {
    let ffprobe: ffprobe_json::FfprobeOutput =
        serde_json::from_str(json_str).map_err(|e| ProbeError::ParseError(e.to_string()))?;

    let streams = ffprobe.streams.ok_or_else(|| {
        ProbeError::ParseError("Missing streams in ffprobe output".to_string())
    })?;

    Ok(ProbeResult {
        streams: streams
            .into_iter()
            .map(|s| StreamInfo {
                index: s.index,
                codec_type: s.codec_type.unwrap_or_default(),
                codec_name: s.codec_name,
            })
            .collect(),
    })
}

/// Probes files with a configured ffprobe binary and decoding chain.
#[derive(Debug, Clone)]
pub struct Prober {
    ffprobe: PathBuf,
    decoder: TextDecoder,
}

impl Prober {
    pub fn new(ffprobe: impl Into<PathBuf>, decoder: TextDecoder) -> Self {
        Self {
            ffprobe: ffprobe.into(),
            decoder,
        }
    }

    /// Runs ffprobe on `video_path` and parses the stream listing.
    pub fn probe<R: ToolRunner + ?Sized>(
        &self,
        runner: &R,
        video_path: &Path,
    ) -> Result<ProbeResult, ProbeError> {
        let invocation = build_probe_command(&self.ffprobe, video_path);
        let output = runner.run_checked(&invocation)?;

        let (text, _encoding) =
            self.decoder
                .decode(&output.stdout)
                .ok_or_else(|| ProbeError::Undecodable {
                    tried: self.decoder.names().join(", "),
                })?;

        parse_ffprobe_output(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::testing::{FakeRunner, Reply};
    use proptest::prelude::*;

    const LISTING_WITH_SUBS: &str = r#"{
        "streams": [
            { "index": 0, "codec_type": "video", "codec_name": "h264" },
            { "index": 1, "codec_type": "audio", "codec_name": "aac" },
            { "index": 2, "codec_type": "subtitle", "codec_name": "ass" }
        ]
    }"#;

    const LISTING_WITHOUT_SUBS: &str = r#"{
        "streams": [
            { "index": 0, "codec_type": "video", "codec_name": "hevc" },
            { "index": 1, "codec_type": "audio", "codec_name": "flac" }
        ]
    }"#;

    #[test]
    fn test_build_probe_command() {
        let inv = build_probe_command(Path::new("ffprobe"), Path::new("/rss/show.mkv"));
        assert_eq!(inv.program(), Path::new("ffprobe"));
        assert_eq!(
            inv.args_lossy(),
            vec![
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_streams",
                "/rss/show.mkv"
            ]
        );
    }

    #[test]
    fn test_parse_detects_subtitle() {
        let result = parse_ffprobe_output(LISTING_WITH_SUBS).unwrap();
        assert_eq!(result.streams.len(), 3);
        assert!(result.has_subtitle_stream());
        let subs: Vec<_> = result
            .streams
            .iter()
            .filter(|s| s.codec_type == "subtitle")
            .collect();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].index, Some(2));
        assert_eq!(subs[0].codec_name.as_deref(), Some("ass"));
    }

    #[test]
    fn test_parse_without_subtitle() {
        let result = parse_ffprobe_output(LISTING_WITHOUT_SUBS).unwrap();
        assert!(!result.has_subtitle_stream());
    }

    #[test]
    fn test_parse_empty_streams() {
        let result = parse_ffprobe_output(r#"{ "streams": [] }"#).unwrap();
        assert!(result.streams.is_empty());
        assert!(!result.has_subtitle_stream());
    }

    #[test]
    fn test_parse_missing_streams_is_error() {
        let result = parse_ffprobe_output(r#"{ "format": {} }"#);
        assert!(matches!(result, Err(ProbeError::ParseError(_))));
    }

    #[test]
    fn test_parse_invalid_json_is_error() {
        let result = parse_ffprobe_output("not json");
        assert!(matches!(result, Err(ProbeError::ParseError(_))));
    }

    #[test]
    fn test_parse_missing_codec_type_is_not_subtitle() {
        let result = parse_ffprobe_output(r#"{ "streams": [ { "index": 0 } ] }"#).unwrap();
        assert_eq!(result.streams[0].codec_type, "");
        assert!(!result.has_subtitle_stream());
    }

    #[test]
    fn test_prober_reads_gbk_listing() {
        // Tags in a GBK locale are not valid UTF-8
        let json = r#"{ "streams": [ { "index": 0, "codec_type": "subtitle", "codec_name": "ass", "tags": { "title": "简体中文" } } ] }"#;
        let (bytes, _, _) = encoding_rs::GBK.encode(json);
        let bytes = bytes.into_owned();
        let runner = FakeRunner::new(move |_| Reply::Stdout(bytes.clone()));

        let prober = Prober::new("ffprobe", TextDecoder::default());
        let result = prober.probe(&runner, Path::new("/rss/show.mkv")).unwrap();

        assert!(result.has_subtitle_stream());
        assert_eq!(runner.calls().len(), 1);
    }

    #[test]
    fn test_prober_tool_failure() {
        let runner = FakeRunner::new(|_| Reply::Fail(1));
        let prober = Prober::new("ffprobe", TextDecoder::default());

        let result = prober.probe(&runner, Path::new("/rss/broken.mp4"));
        assert!(matches!(
            result,
            Err(ProbeError::Tool(ToolError::Failed { code: 1, .. }))
        ));
    }

    #[test]
    fn test_prober_undecodable_output() {
        let runner = FakeRunner::new(|_| Reply::Stdout(vec![0xFF, 0xFF, 0xFF]));
        let prober = Prober::new("ffprobe", TextDecoder::default());

        match prober.probe(&runner, Path::new("/rss/odd.mkv")) {
            Err(ProbeError::Undecodable { tried }) => {
                assert_eq!(tried, "UTF-8, GBK, Big5");
            }
            other => panic!("Expected Undecodable, got {:?}", other),
        }
    }

    // Any listing reports a subtitle exactly when one of its streams is typed "subtitle".
    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_subtitle_detection_matches_stream_types(
            types in proptest::collection::vec(
                prop_oneof![
                    Just("video"),
                    Just("audio"),
                    Just("subtitle"),
                    Just("data"),
                    Just("attachment"),
                ],
                0..8,
            ),
        ) {
            let streams: Vec<String> = types
                .iter()
                .enumerate()
                .map(|(i, t)| format!(r#"{{ "index": {}, "codec_type": "{}" }}"#, i, t))
                .collect();
            let json = format!(r#"{{ "streams": [{}] }}"#, streams.join(","));

            let result = parse_ffprobe_output(&json).unwrap();
            prop_assert_eq!(result.streams.len(), types.len());
            prop_assert_eq!(result.has_subtitle_stream(), types.contains(&"subtitle"));
        }
    }
}
