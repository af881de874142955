//! Error types for the extension pipeline

use thiserror::Error;
use void_gltf::{CodecError, NodeIndex};

use crate::scene::ObjectId;

/// Invalid registry use (programmer error, reported immediately)
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Extension handler registered with an empty name")]
    EmptyName,
}

/// Failure inside one handler invocation or deferred action
///
/// The orchestrator recovers these per invocation: the offending
/// extension's effect is simply absent from the result.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("Invalid extension payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("Reference out of range: {array}[{index}] (length {len})")]
    Reference {
        array: String,
        index: usize,
        len: usize,
    },

    #[error("Node {0} has no scene object")]
    UnmappedNode(NodeIndex),

    #[error("Scene object {0} not found")]
    MissingObject(ObjectId),

    #[error("Document error: {0}")]
    Codec(CodecError),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Handler panicked: {0}")]
    Panicked(String),

    #[error("{0}")]
    Failed(String),
}

impl HandlerError {
    /// Create a free-form handler failure
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// True for index/reference failures
    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            Self::Reference { .. } | Self::UnmappedNode(_) | Self::MissingObject(_)
        )
    }
}

impl From<CodecError> for HandlerError {
    fn from(e: CodecError) -> Self {
        match e {
            CodecError::IndexOutOfRange { array, index, len } => {
                Self::Reference { array, index, len }
            }
            other => Self::Codec(other),
        }
    }
}

pub type HandlerResult<T> = Result<T, HandlerError>;

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialization failed: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Errors that abort a whole import or export operation
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Document error: {0}")]
    Codec(#[from] CodecError),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Scene instantiation failed: {0}")]
    Instantiation(String),

    #[error("Base export failed: {0}")]
    BaseExport(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_index_error_becomes_reference() {
        let err: HandlerError = CodecError::IndexOutOfRange {
            array: "nodes".into(),
            index: 9,
            len: 3,
        }
        .into();
        assert!(err.is_reference());
        assert_eq!(err.to_string(), "Reference out of range: nodes[9] (length 3)");

        let err: HandlerError = CodecError::NotAnObject.into();
        assert!(matches!(err, HandlerError::Codec(_)));
        assert!(!err.is_reference());
    }

    #[test]
    fn test_pipeline_error_from_codec() {
        let err: PipelineError = CodecError::UnsupportedVersion(3).into();
        assert!(matches!(err, PipelineError::Codec(CodecError::UnsupportedVersion(3))));
    }
}
