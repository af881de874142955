//! Codec error types
//!
//! Every way a wire document can be rejected has its own variant so callers
//! can tell "not this format" apart from "corrupt file".

use thiserror::Error;

/// Errors produced while parsing, inspecting or serializing a document
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Container header truncated: need 12 bytes, got {0}")]
    TruncatedHeader(usize),

    #[error("Bad container magic: {0:#010x}")]
    BadMagic(u32),

    #[error("Unsupported container version: {0} (only version 2 is supported)")]
    UnsupportedVersion(u32),

    #[error("Container length mismatch: header declares {declared} bytes, buffer has {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("Chunk truncated: declared {declared} bytes, only {available} available")]
    TruncatedChunk { declared: usize, available: usize },

    #[error("First chunk is not JSON content (type tag {0:#010x})")]
    NonJsonChunk(u32),

    #[error("Invalid UTF-8 in JSON content: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("Malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Container too large: {0} bytes does not fit a 32-bit length field")]
    TooLarge(usize),

    #[error("Document root is not a JSON object")]
    NotAnObject,

    #[error("Field '{field}' has an unexpected type")]
    InvalidField { field: String },

    #[error("Index {index} out of range for '{array}' (length {len})")]
    IndexOutOfRange {
        array: String,
        index: usize,
        len: usize,
    },
}

impl CodecError {
    /// True for errors raised while validating the binary container framing
    pub fn is_container_error(&self) -> bool {
        matches!(
            self,
            Self::TruncatedHeader(_)
                | Self::BadMagic(_)
                | Self::UnsupportedVersion(_)
                | Self::LengthMismatch { .. }
                | Self::TruncatedChunk { .. }
                | Self::NonJsonChunk(_)
        )
    }

    pub(crate) fn invalid_field(field: impl Into<String>) -> Self {
        Self::InvalidField { field: field.into() }
    }

    pub(crate) fn out_of_range(array: impl Into<String>, index: usize, len: usize) -> Self {
        Self::IndexOutOfRange {
            array: array.into(),
            index,
            len,
        }
    }
}

pub type CodecResult<T> = Result<T, CodecError>;
