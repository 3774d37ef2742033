//! Fallback text decoding for tool output.
//!
//! ffprobe prints file names and tags in whatever encoding the host locale
//! uses, so its stdout is tried against an ordered list of encodings and the
//! first one that decodes without errors wins.

use encoding_rs::Encoding;
use thiserror::Error;

/// Error type for building a decoder
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// The label does not name an encoding known to the WHATWG registry.
    #[error("Unknown text encoding: {0}")]
    UnknownEncoding(String),

    /// No encodings were configured.
    #[error("At least one text encoding is required")]
    Empty,
}

/// Ordered chain of candidate encodings.
#[derive(Debug, Clone)]
pub struct TextDecoder {
    encodings: Vec<&'static Encoding>,
}

impl TextDecoder {
    /// Builds a chain from encoding labels such as `utf-8`, `gbk` or `big5`.
    ///
    /// Labels that resolve to an encoding already in the chain are skipped
    /// (`gb2312` is an alias of `gbk`).
    pub fn from_labels<S: AsRef<str>>(labels: &[S]) -> Result<Self, DecodeError> {
        let mut encodings: Vec<&'static Encoding> = Vec::new();
        for label in labels {
            let label = label.as_ref().trim();
            let encoding = Encoding::for_label(label.as_bytes())
                .ok_or_else(|| DecodeError::UnknownEncoding(label.to_string()))?;
            if !encodings.contains(&encoding) {
                encodings.push(encoding);
            }
        }
        if encodings.is_empty() {
            return Err(DecodeError::Empty);
        }
        Ok(Self { encodings })
    }

    /// Names of the encodings in the order they are tried.
    pub fn names(&self) -> Vec<&'static str> {
        self.encodings.iter().map(|e| e.name()).collect()
    }

    /// Decodes `bytes` with the first encoding that accepts them.
    ///
    /// Returns the text and the name of the encoding used, or `None` when no
    /// encoding in the chain can decode the input cleanly.
    pub fn decode(&self, bytes: &[u8]) -> Option<(String, &'static str)> {
        self.encodings.iter().find_map(|encoding| {
            encoding
                .decode_without_bom_handling_and_without_replacement(bytes)
                .map(|text| (text.into_owned(), encoding.name()))
        })
    }
}

impl Default for TextDecoder {
    fn default() -> Self {
        Self {
            encodings: vec![encoding_rs::UTF_8, encoding_rs::GBK, encoding_rs::BIG5],
        }
    }
}
